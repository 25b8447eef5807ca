use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::db::snapshot_queries;
use crate::errors::AppError;
use crate::models::{LatestFuturePrice, OptionChainSnapshot};

/// What one save actually wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Spot and futures rows were written (false when a futures row with the
    /// same refresh time was already stored).
    pub price_info_saved: bool,
    pub options_submitted: usize,
    pub options_inserted: u64,
}

/// Append-only sink for parsed snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn latest_future_price(&self) -> Result<Option<LatestFuturePrice>, AppError>;

    async fn save_snapshot(&self, snapshot: &OptionChainSnapshot) -> Result<SaveOutcome, AppError>;
}

pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn latest_future_price(&self) -> Result<Option<LatestFuturePrice>, AppError> {
        Ok(snapshot_queries::fetch_latest_future_price(&self.pool).await?)
    }

    async fn save_snapshot(&self, snapshot: &OptionChainSnapshot) -> Result<SaveOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let already_saved =
            snapshot_queries::future_price_exists(&mut tx, snapshot.updated_at).await?;

        if already_saved {
            debug!("not saving future and spot price, {} already saved", snapshot.updated_at);
        } else {
            debug!("saving future and spot price for {}", snapshot.updated_at);
            snapshot_queries::insert_spot_price(&mut tx, &snapshot.spot_price_info).await?;
            snapshot_queries::insert_future_price(&mut tx, &snapshot.future_price_info).await?;
        }

        let calls = snapshot_queries::insert_option_prices(&mut tx, &snapshot.call_options).await?;
        let puts = snapshot_queries::insert_option_prices(&mut tx, &snapshot.put_options).await?;

        tx.commit().await?;

        Ok(SaveOutcome {
            price_info_saved: !already_saved,
            options_submitted: snapshot.call_options.len() + snapshot.put_options.len(),
            options_inserted: calls + puts,
        })
    }
}
