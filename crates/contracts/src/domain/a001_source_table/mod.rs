pub mod aggregate;

pub use aggregate::{ExtractOptions, SessionState, SourceTable, SourceTableView};
