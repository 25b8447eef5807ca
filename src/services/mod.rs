pub mod import_service;
pub mod job_scheduler_service;
pub mod option_chain_parser;
pub mod snapshot_gate;
