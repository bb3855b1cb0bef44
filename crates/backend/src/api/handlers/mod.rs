// Aggregate handlers
pub mod a001_source_table;

// UseCase handlers
pub mod usecases;
