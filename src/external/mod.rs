pub mod jpx;
pub mod option_chain_source;
