//! Background Jobs Module
//!
//! Jobs run by the scheduler when the importer is started with `--schedule`.
//!
//! - `option_chain_import_job` - imports the three option-chain pages when
//!   the site has refreshed
pub mod option_chain_import_job;
