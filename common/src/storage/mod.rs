pub mod graph_store;
pub mod types;
