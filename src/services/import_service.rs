//! Option Chain Import
//!
//! Sequences fetch → parse → freshness gate → persist.
//!
//! - Web import: the nearby-month page decides whether the site has anything
//!   new. Only then are the next-month and month-after pages fetched, each on
//!   its own; a failure there is logged and the run carries on.
//! - File import: a saved page is stored unconditionally. Saved pages can be
//!   any expiry bucket, which the freshness check cannot tell apart.
//! - Bulk import: replays saved pages listed in groups of three.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::db::snapshot_store::{SaveOutcome, SnapshotStore};
use crate::errors::AppError;
use crate::external::option_chain_source::{load_html_from_file, OptionChainSource};
use crate::models::{ExpiryBucket, LatestFuturePrice, OptionChainSnapshot};
use crate::services::option_chain_parser::parse_option_chain_html;
use crate::services::snapshot_gate::is_new_snapshot;

/// Pages making up one bulk-import group: nearby, next, month after.
const BULK_GROUP_SIZE: usize = ExpiryBucket::ALL.len();

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub snapshots_saved: usize,
    pub snapshots_failed: usize,
    pub options_inserted: u64,
    /// The gate judged the site unchanged and nothing was stored.
    pub skipped: bool,
}

impl ImportReport {
    fn record(&mut self, outcome: &SaveOutcome) {
        self.snapshots_saved += 1;
        self.options_inserted += outcome.options_inserted;
    }

    fn merge(&mut self, other: ImportReport) {
        self.snapshots_saved += other.snapshots_saved;
        self.snapshots_failed += other.snapshots_failed;
        self.options_inserted += other.options_inserted;
    }
}

pub async fn fetch_snapshot(
    source: &dyn OptionChainSource,
    bucket: ExpiryBucket,
) -> Result<OptionChainSnapshot, AppError> {
    let html = source.fetch_html(bucket).await?;
    parse_option_chain_html(&html)
}

pub async fn load_snapshot_from_file(file_path: &Path) -> Result<OptionChainSnapshot, AppError> {
    let html = load_html_from_file(file_path).await?;
    parse_option_chain_html(&html)
}

pub async fn save_snapshot(
    store: &dyn SnapshotStore,
    snapshot: &OptionChainSnapshot,
) -> Result<SaveOutcome, AppError> {
    debug!("saving option chain updated at {}", snapshot.updated_at);

    if let Some(atm) = snapshot.atm_call() {
        debug!("saving call option prices, atm strike {} price {:?}", atm.target_price, atm.price);
    }
    if let Some(atm) = snapshot.atm_put() {
        debug!("saving put option prices, atm strike {} price {:?}", atm.target_price, atm.price);
    }

    let outcome = store.save_snapshot(snapshot).await?;

    debug!(
        "saved option chain updated at {}: price info saved={}, options {}/{}",
        snapshot.updated_at, outcome.price_info_saved, outcome.options_inserted, outcome.options_submitted
    );
    Ok(outcome)
}

async fn load_latest(store: &dyn SnapshotStore) -> Result<Option<LatestFuturePrice>, AppError> {
    let latest = store.latest_future_price().await?;

    debug!("last updated_at on db: {:?}", latest.as_ref().map(|l| l.updated_at));
    debug!("last future price time on db: {:?}", latest.as_ref().and_then(|l| l.price_time));

    Ok(latest)
}

fn is_new(latest: Option<&LatestFuturePrice>, snapshot: &OptionChainSnapshot) -> bool {
    debug!("updated_at on site: {}", snapshot.updated_at);
    debug!("future price time on site: {:?}", snapshot.future_price_info.price_time);

    let is_new = is_new_snapshot(latest, snapshot);
    debug!("is_new: {}", is_new);
    is_new
}

/// Imports the three expiry buckets from the live site.
///
/// The nearby-month page failing aborts the run. Later buckets are best
/// effort: their failures are counted and logged, and the nearby-month save
/// is never rolled back.
pub async fn import_from_web(
    source: &dyn OptionChainSource,
    store: &dyn SnapshotStore,
) -> Result<ImportReport, AppError> {
    let latest = load_latest(store).await?;

    let nearby = fetch_snapshot(source, ExpiryBucket::NearbyMonth).await?;

    let mut report = ImportReport::default();

    if !is_new(latest.as_ref(), &nearby) {
        debug!("skipping, option chain unchanged since {}", nearby.updated_at);
        report.skipped = true;
        return Ok(report);
    }

    let outcome = save_snapshot(store, &nearby).await?;
    report.record(&outcome);

    for bucket in [ExpiryBucket::NextMonth, ExpiryBucket::MonthAfter] {
        let result = match fetch_snapshot(source, bucket).await {
            Ok(snapshot) => save_snapshot(store, &snapshot).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => report.record(&outcome),
            Err(e) => {
                warn!("Unexpected error importing {} option chain: {}", bucket, e);
                report.snapshots_failed += 1;
            }
        }
    }

    info!(
        "imported option chain updated at {}: {} saved, {} failed, {} option rows",
        nearby.updated_at, report.snapshots_saved, report.snapshots_failed, report.options_inserted
    );
    Ok(report)
}

/// Imports one saved page without consulting the freshness gate.
pub async fn import_from_file(
    file_path: &Path,
    store: &dyn SnapshotStore,
) -> Result<ImportReport, AppError> {
    let snapshot = load_snapshot_from_file(file_path).await?;

    debug!("updated_at in {}: {}", file_path.display(), snapshot.updated_at);
    debug!("future price time in {}: {:?}", file_path.display(), snapshot.future_price_info.price_time);

    let outcome = save_snapshot(store, &snapshot).await?;

    let mut report = ImportReport::default();
    report.record(&outcome);
    Ok(report)
}

/// Splits a bulk list into groups of page paths. Paths are separated by any
/// whitespace.
pub fn bulk_groups(list: &str) -> Vec<Vec<PathBuf>> {
    let paths: Vec<PathBuf> = list.split_whitespace().map(PathBuf::from).collect();
    paths.chunks(BULK_GROUP_SIZE).map(<[PathBuf]>::to_vec).collect()
}

/// Replays saved pages for initial loading. `list_path` names one page per
/// line, grouped as nearby, next month, month after, repeating.
///
/// Each group is gated on its nearby-month page; when that page is new all
/// pages of the group are stored through [`import_from_file`].
pub async fn bulk_import(
    list_path: &Path,
    store: &dyn SnapshotStore,
) -> Result<ImportReport, AppError> {
    let list = tokio::fs::read_to_string(list_path).await?;
    let groups = bulk_groups(&list);

    let mut report = ImportReport::default();

    for group in groups {
        let Some(first) = group.first() else {
            continue;
        };
        debug!("processing file: {}", first.display());

        if group.len() < BULK_GROUP_SIZE {
            warn!(
                "bulk list ends with an incomplete group of {} file(s) starting at {}",
                group.len(),
                first.display()
            );
        }

        let latest = load_latest(store).await?;
        let snapshot = load_snapshot_from_file(first).await?;

        if !is_new(latest.as_ref(), &snapshot) {
            debug!("skipping group starting at {}", first.display());
            continue;
        }

        for path in &group {
            report.merge(import_from_file(path, store).await?);
        }
    }

    info!(
        "bulk import from {}: {} saved, {} option rows",
        list_path.display(),
        report.snapshots_saved,
        report.options_inserted
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::option_chain_source::OptionChainSourceError;
    use crate::models::{JstDateTime, OptionType, EXCHANGE_TZ};
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    const FIXTURE: &str = include_str!("../../tests/fixtures/nkopm_20230601.html");

    /// In-memory stand-in for the database, enforcing the same uniqueness
    /// rules as the schema.
    #[derive(Default)]
    struct MemoryStore {
        futures: Mutex<Vec<LatestFuturePrice>>,
        spot_rows: Mutex<usize>,
        option_keys: Mutex<HashSet<(OptionType, i32, NaiveDate, JstDateTime)>>,
    }

    impl MemoryStore {
        fn with_latest(latest: LatestFuturePrice) -> Self {
            let store = Self::default();
            store.futures.lock().unwrap().push(latest);
            store
        }

        fn futures_count(&self) -> usize {
            self.futures.lock().unwrap().len()
        }

        fn option_count(&self) -> usize {
            self.option_keys.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SnapshotStore for MemoryStore {
        async fn latest_future_price(&self) -> Result<Option<LatestFuturePrice>, AppError> {
            Ok(self
                .futures
                .lock()
                .unwrap()
                .iter()
                .max_by_key(|f| f.updated_at)
                .cloned())
        }

        async fn save_snapshot(&self, snapshot: &OptionChainSnapshot) -> Result<SaveOutcome, AppError> {
            let mut futures = self.futures.lock().unwrap();
            let already_saved = futures.iter().any(|f| f.updated_at == snapshot.updated_at);
            if !already_saved {
                futures.push(LatestFuturePrice {
                    updated_at: snapshot.updated_at,
                    price_time: snapshot.future_price_info.price_time,
                });
                *self.spot_rows.lock().unwrap() += 1;
            }

            let mut keys = self.option_keys.lock().unwrap();
            let mut inserted = 0;
            for option in snapshot.call_options.iter().chain(&snapshot.put_options) {
                if keys.insert(option.unique_key()) {
                    inserted += 1;
                }
            }

            Ok(SaveOutcome {
                price_info_saved: !already_saved,
                options_submitted: snapshot.call_options.len() + snapshot.put_options.len(),
                options_inserted: inserted,
            })
        }
    }

    /// Serves canned pages per bucket; a missing page is a network failure.
    struct ScriptedSource {
        pages: HashMap<ExpiryBucket, String>,
        requests: Mutex<Vec<ExpiryBucket>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<(ExpiryBucket, String)>) -> Self {
            Self {
                pages: pages.into_iter().collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn all_buckets() -> Self {
            Self::new(vec![
                (ExpiryBucket::NearbyMonth, FIXTURE.to_string()),
                (ExpiryBucket::NextMonth, next_month_page()),
                (ExpiryBucket::MonthAfter, month_after_page()),
            ])
        }

        fn requested(&self) -> Vec<ExpiryBucket> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OptionChainSource for ScriptedSource {
        async fn fetch_html(&self, bucket: ExpiryBucket) -> Result<String, OptionChainSourceError> {
            self.requests.lock().unwrap().push(bucket);
            self.pages
                .get(&bucket)
                .cloned()
                .ok_or_else(|| OptionChainSourceError::Network(format!("{} unavailable", bucket)))
        }
    }

    fn next_month_page() -> String {
        FIXTURE.replace("2023/06/08", "2023/07/13")
    }

    fn month_after_page() -> String {
        FIXTURE.replace("2023/06/08", "2023/08/10")
    }

    fn jst(d: u32, hh: u32, mm: u32) -> JstDateTime {
        EXCHANGE_TZ.with_ymd_and_hms(2023, 6, d, hh, mm, 0).unwrap()
    }

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("nkopm-importer-{}-{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_new_snapshot_imports_all_three_buckets() {
        let source = ScriptedSource::all_buckets();
        let store = MemoryStore::default();

        let report = import_from_web(&source, &store).await.unwrap();

        assert!(!report.skipped);
        assert_eq!(report.snapshots_saved, 3);
        assert_eq!(report.snapshots_failed, 0);
        assert_eq!(report.options_inserted, 18);
        assert_eq!(source.requested(), ExpiryBucket::ALL.to_vec());
        // All three pages share one refresh time, so spot/futures are written once
        assert_eq!(store.futures_count(), 1);
        assert_eq!(*store.spot_rows.lock().unwrap(), 1);
        assert_eq!(store.option_count(), 18);
    }

    #[tokio::test]
    async fn test_unchanged_site_skips_later_buckets() {
        let source = ScriptedSource::all_buckets();
        let store = MemoryStore::with_latest(LatestFuturePrice {
            updated_at: jst(1, 14, 0),
            price_time: Some(jst(1, 14, 55)),
        });

        let report = import_from_web(&source, &store).await.unwrap();

        assert!(report.skipped);
        assert_eq!(report.snapshots_saved, 0);
        assert_eq!(source.requested(), vec![ExpiryBucket::NearbyMonth]);
        assert_eq!(store.option_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_next_month_does_not_stop_month_after() {
        let source = ScriptedSource::new(vec![
            (ExpiryBucket::NearbyMonth, FIXTURE.to_string()),
            (ExpiryBucket::MonthAfter, month_after_page()),
        ]);
        let store = MemoryStore::default();

        let report = import_from_web(&source, &store).await.unwrap();

        assert_eq!(report.snapshots_saved, 2);
        assert_eq!(report.snapshots_failed, 1);
        assert_eq!(source.requested(), ExpiryBucket::ALL.to_vec());
        assert_eq!(store.option_count(), 12);
    }

    #[tokio::test]
    async fn test_unparseable_later_bucket_is_tolerated() {
        let source = ScriptedSource::new(vec![
            (ExpiryBucket::NearbyMonth, FIXTURE.to_string()),
            (ExpiryBucket::NextMonth, "<html><body>maintenance</body></html>".to_string()),
            (ExpiryBucket::MonthAfter, month_after_page()),
        ]);
        let store = MemoryStore::default();

        let report = import_from_web(&source, &store).await.unwrap();

        assert_eq!(report.snapshots_saved, 2);
        assert_eq!(report.snapshots_failed, 1);
    }

    #[tokio::test]
    async fn test_failed_nearby_month_aborts_run() {
        let source = ScriptedSource::new(vec![(ExpiryBucket::NextMonth, next_month_page())]);
        let store = MemoryStore::default();

        let result = import_from_web(&source, &store).await;

        assert!(matches!(result, Err(AppError::External(_))));
        assert_eq!(source.requested(), vec![ExpiryBucket::NearbyMonth]);
        assert_eq!(store.futures_count(), 0);
    }

    #[tokio::test]
    async fn test_reimporting_same_page_adds_no_option_rows() {
        let store = MemoryStore::default();
        let snapshot = parse_option_chain_html(FIXTURE).unwrap();

        let first = save_snapshot(&store, &snapshot).await.unwrap();
        let second = save_snapshot(&store, &snapshot).await.unwrap();

        assert!(first.price_info_saved);
        assert_eq!(first.options_inserted, 6);
        assert!(!second.price_info_saved);
        assert_eq!(second.options_submitted, 6);
        assert_eq!(second.options_inserted, 0);
        assert_eq!(store.option_count(), 6);
    }

    #[tokio::test]
    async fn test_file_import_ignores_freshness() {
        let path = temp_file("older.html", FIXTURE);
        // Store already holds a later refresh than the file's 15:00
        let store = MemoryStore::with_latest(LatestFuturePrice {
            updated_at: jst(2, 9, 0),
            price_time: Some(jst(2, 8, 59)),
        });

        let report = import_from_file(&path, &store).await.unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(report.snapshots_saved, 1);
        assert_eq!(store.option_count(), 6);
        assert_eq!(store.futures_count(), 2);
    }

    #[tokio::test]
    async fn test_file_import_of_missing_file_fails() {
        let store = MemoryStore::default();
        let result = import_from_file(Path::new("/nonexistent/nkopm.html"), &store).await;
        assert!(matches!(result, Err(AppError::Io(_))));
    }

    #[test]
    fn test_bulk_groups_split_by_three() {
        let groups = bulk_groups("a.html\nb.html\nc.html\nd.html\ne.html\nf.html\ng.html\n");

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], vec![PathBuf::from("a.html"), PathBuf::from("b.html"), PathBuf::from("c.html")]);
        assert_eq!(groups[2], vec![PathBuf::from("g.html")]);
        assert!(bulk_groups("  \n").is_empty());
    }

    #[tokio::test]
    async fn test_bulk_import_skips_groups_that_are_not_new() {
        let nearby = temp_file("bulk-nearby.html", FIXTURE);
        let next = temp_file("bulk-next.html", &next_month_page());
        let after = temp_file("bulk-after.html", &month_after_page());
        // Second group repeats the same refresh time, so the gate rejects it
        let list = format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n",
            nearby.display(), next.display(), after.display(),
            nearby.display(), next.display(), after.display(),
        );
        let list_path = temp_file("bulk-list.txt", &list);
        let store = MemoryStore::default();

        let report = bulk_import(&list_path, &store).await.unwrap();

        for path in [&nearby, &next, &after, &list_path] {
            std::fs::remove_file(path).ok();
        }

        assert_eq!(report.snapshots_saved, 3);
        assert_eq!(store.option_count(), 18);
        assert_eq!(store.futures_count(), 1);
    }
}
