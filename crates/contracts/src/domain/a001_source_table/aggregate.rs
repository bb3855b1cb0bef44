use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Таблица, извлечённая из загруженной книги Excel
///
/// `columns` хранит порядок колонок (по строке заголовка), `rows` - значения
/// по имени колонки. Пустые и отсутствующие ячейки представлены пустой строкой.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTable {
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
}

impl SourceTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Значение ячейки по имени колонки и смещению строки (с нуля).
    /// За пределами таблицы или для неизвестной колонки возвращает `""`.
    pub fn cell(&self, column: &str, offset: usize) -> &str {
        self.rows
            .get(offset)
            .and_then(|row| row.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Строка в порядке `columns` (для отображения и реконструкции книги)
    pub fn row_values(&self, offset: usize) -> Vec<&str> {
        self.columns
            .iter()
            .map(|column| self.cell(column, offset))
            .collect()
    }
}

/// Параметры извлечения: лист, выбор колонок и число строк данных
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractOptions {
    pub sheet_name: String,
    /// Колонки в нотации Excel: `A:D`, `A,C:D`
    pub usecols: String,
    pub nrows: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            sheet_name: "backup".to_string(),
            usecols: "A:D".to_string(),
            nrows: 28,
        }
    }
}

/// Состояние сессии загрузки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingUpload,
    TableLoaded,
    SyncInProgress,
    SyncComplete,
}

/// Ответ на загрузку файла и на запрос состояния сессии
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTableView {
    pub session_id: String,
    pub file_name: String,
    pub state: SessionState,
    pub options: ExtractOptions,
    pub table: SourceTable,
}
