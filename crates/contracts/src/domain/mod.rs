pub mod a001_source_table;
