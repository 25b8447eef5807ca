use clap::Parser;
use std::path::PathBuf;

/// Imports Nikkei 225 option prices into Postgres.
///
/// With no arguments the three expiry pages are fetched from the live site
/// once and stored if the site has refreshed since the last import.
#[derive(Parser, Debug)]
#[command(name = "nkopm-importer", version, about)]
pub struct Cli {
    /// Saved option-chain page to import instead of fetching from the web
    #[arg(conflicts_with_all = ["bulk", "schedule"])]
    pub file: Option<PathBuf>,

    /// File listing saved pages, three per expiry group, to replay in order
    #[arg(long, value_name = "LIST", conflicts_with_all = ["schedule", "dry_run"])]
    pub bulk: Option<PathBuf>,

    /// Keep running and import on this cron schedule (sec min hour day month weekday).
    /// Without a value NKOPM_IMPORT_SCHEDULE is used.
    #[arg(long, value_name = "CRON", num_args = 0..=1, conflicts_with = "dry_run")]
    pub schedule: Option<Option<String>>,

    /// Parse and print the snapshot as JSON without touching the database
    #[arg(long)]
    pub dry_run: bool,
}

/// What the process was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Web,
    File(PathBuf),
    Bulk(PathBuf),
    Schedule(Option<String>),
    DryRun(Option<PathBuf>),
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.dry_run {
            return Mode::DryRun(self.file.clone());
        }
        if let Some(list) = &self.bulk {
            return Mode::Bulk(list.clone());
        }
        if let Some(schedule) = &self.schedule {
            return Mode::Schedule(schedule.clone());
        }
        match &self.file {
            Some(file) => Mode::File(file.clone()),
            None => Mode::Web,
        }
    }
}
