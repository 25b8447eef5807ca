pub mod snapshot_queries;
pub mod snapshot_store;
