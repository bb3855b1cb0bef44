use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Отчёт о синхронизации одной загруженной таблицы
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub session_id: String,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Результат дозаписи в ячейку-накопитель (None, если ячейка не настроена)
    pub merge: Option<MergeOutcome>,

    /// Итог по каждой строке окна, в порядке обработки
    pub rows: Vec<RowOutcome>,

    pub total_written: i32,
    pub total_skipped: i32,
    pub total_failed: i32,
    pub total_errors: i32,

    /// Человекочитаемые сообщения для формы, в порядке появления
    pub messages: Vec<String>,
    pub errors: Vec<SyncError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Completed,
    CompletedWithErrors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Адрес ячейки, например `'backups'!B26`
    pub cell: String,
    pub value: String,
    pub updated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Written,
    /// Часть ячеек записана, часть нет (только при покомпонентной записи)
    PartiallyWritten,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowOutcome {
    /// Смещение строки в исходной таблице (с нуля)
    pub source_offset: usize,
    /// Номер строки для сообщений: смещение + 1
    pub row_label: usize,
    pub status: RowStatus,
    pub destination_row: Option<u32>,
    pub written_columns: Vec<String>,
    pub failed_columns: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub message: String,
    pub details: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            status: SyncStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            merge: None,
            rows: Vec::new(),
            total_written: 0,
            total_skipped: 0,
            total_failed: 0,
            total_errors: 0,
            messages: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn add_error(&mut self, message: String, details: Option<String>) {
        self.messages.push(match &details {
            Some(d) => format!("{}: {}", message, d),
            None => message.clone(),
        });
        self.errors.push(SyncError {
            message,
            details,
            occurred_at: Utc::now(),
        });
        self.total_errors += 1;
    }

    pub fn record_row(&mut self, outcome: RowOutcome) {
        match outcome.status {
            RowStatus::Written => self.total_written += 1,
            RowStatus::PartiallyWritten => {
                self.total_written += 1;
                self.total_failed += 1;
            }
            RowStatus::Skipped => self.total_skipped += 1,
            RowStatus::Failed => self.total_failed += 1,
        }
        if !outcome.message.is_empty() {
            self.messages.push(outcome.message.clone());
        }
        self.rows.push(outcome);
    }

    pub fn complete(&mut self) {
        self.status = if self.total_errors > 0 || self.total_failed > 0 {
            SyncStatus::CompletedWithErrors
        } else {
            SyncStatus::Completed
        };
        self.completed_at = Some(Utc::now());
    }
}
