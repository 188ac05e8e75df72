pub mod domain;
pub mod infrastructure;
pub mod snapshot_store;
