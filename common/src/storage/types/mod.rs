pub mod graph_record;
