//! Общие DTO между backend и HTML-формой: исходная таблица, отчёт синхронизации,
//! метаданные use case.

pub mod domain;
pub mod usecases;
