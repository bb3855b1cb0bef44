use super::field_mapping::{destination_cells, join_nonempty, RowFields, SessionConstants};
use super::row_writer::RowWriter;
use contracts::domain::a001_source_table::SourceTable;
use contracts::usecases::common::UseCaseMetadata;
use contracts::usecases::u501_sync_to_sheet::{
    MergeOutcome, RowOutcome, RowStatus, SyncReport, SyncToSheet,
};
use std::sync::Arc;

use crate::shared::config::{get_config, MergeCell, RowAllocation, SyncConfig};
use crate::shared::google_sheets::{self, a1, RemoteTable};

/// Executor для UseCase переноса таблицы в Google Sheet.
///
/// Все обращения к удалённой таблице идут строго последовательно; ошибки
/// отдельных вызовов попадают в отчёт и не прерывают синхронизацию.
pub struct SyncExecutor {
    table: Arc<dyn RemoteTable>,
    spreadsheet_id: String,
    config: SyncConfig,
}

impl SyncExecutor {
    pub fn new(table: Arc<dyn RemoteTable>, spreadsheet_id: String, config: SyncConfig) -> Self {
        Self {
            table,
            spreadsheet_id,
            config,
        }
    }

    /// Executor с глобальным клиентом и конфигурацией процесса
    pub fn from_config() -> anyhow::Result<Self> {
        let config = get_config()?;
        Ok(Self::new(
            google_sheets::get_client()?,
            config.google.spreadsheet_id.clone(),
            config.sync.clone(),
        ))
    }

    pub async fn run(&self, session_id: &str, source: &SourceTable) -> SyncReport {
        let mut report = SyncReport::new(session_id.to_string());
        let fields = &self.config.fields;
        tracing::info!(
            "[{}] Starting sync for session {}: rows {}..={} -> '{}'",
            SyncToSheet::full_name(),
            session_id,
            self.config.window_start,
            self.config.window_end,
            self.config.target_sheet
        );

        let constants = SessionConstants::read(source, fields, &self.config.separator);

        if let Some(merge_cell) = &fields.description.merge_cell {
            let outcome = self
                .merge_into_cell(merge_cell, &constants.description, &mut report)
                .await;
            report.merge = Some(outcome);
        }

        let writer = RowWriter::new(
            self.table.as_ref(),
            &self.spreadsheet_id,
            &self.config.target_sheet,
            self.config.write_mode,
        );
        let mut reserved: Option<u32> = None;

        for offset in self.config.window_start..=self.config.window_end {
            let row_label = offset + 1;
            let row = RowFields::read(source, fields, offset);
            if !row.is_complete() {
                report.record_row(RowOutcome {
                    source_offset: offset,
                    row_label,
                    status: RowStatus::Skipped,
                    destination_row: None,
                    written_columns: Vec::new(),
                    failed_columns: Vec::new(),
                    message: format!("Row {}: incomplete data, skipped.", row_label),
                });
                continue;
            }

            let destination = match (self.config.row_allocation, reserved) {
                (RowAllocation::Reserve, Some(next)) => Ok(next),
                _ => writer.find_insertion_row(&self.config.probe_column).await,
            };
            let destination = match destination {
                Ok(destination) => destination,
                Err(e) => {
                    tracing::error!("Row {}: insertion row lookup failed: {}", row_label, e);
                    report.record_row(RowOutcome {
                        source_offset: offset,
                        row_label,
                        status: RowStatus::Failed,
                        destination_row: None,
                        written_columns: Vec::new(),
                        failed_columns: Vec::new(),
                        message: format!(
                            "Row {}: could not determine the insertion row: {}",
                            row_label, e
                        ),
                    });
                    continue;
                }
            };

            let cells = destination_cells(fields, &row, &constants);
            let ack = writer.write_row(destination, &cells).await;
            if !ack.written.is_empty() {
                reserved = Some(destination + 1);
            }

            let (status, message) = if ack.is_complete() {
                (
                    RowStatus::Written,
                    format!("Row {}: written to row {}.", row_label, destination),
                )
            } else {
                let reasons: Vec<String> = ack
                    .failed
                    .iter()
                    .map(|(column, error)| format!("{}: {}", column, error))
                    .collect();
                let status = if ack.written.is_empty() {
                    RowStatus::Failed
                } else {
                    RowStatus::PartiallyWritten
                };
                (
                    status,
                    format!(
                        "Row {}: write to row {} failed ({})",
                        row_label,
                        destination,
                        reasons.join("; ")
                    ),
                )
            };
            report.record_row(RowOutcome {
                source_offset: offset,
                row_label,
                status,
                destination_row: Some(destination),
                written_columns: ack.written,
                failed_columns: ack.failed.into_iter().map(|(column, _)| column).collect(),
                message,
            });
        }

        report.complete();
        tracing::info!(
            "[{}] Sync for session {} finished: {} written, {} skipped, {} failed, {} errors",
            SyncToSheet::full_name(),
            session_id,
            report.total_written,
            report.total_skipped,
            report.total_failed,
            report.total_errors
        );
        report
    }

    /// Дописывает описание к текущему значению ячейки-накопителя.
    /// Если текущее значение прочитать не удалось, ячейка не перезаписывается.
    async fn merge_into_cell(
        &self,
        merge_cell: &MergeCell,
        description: &str,
        report: &mut SyncReport,
    ) -> MergeOutcome {
        let address = match a1::parse_cell(&merge_cell.cell) {
            Some((column, row)) => a1::cell(&merge_cell.sheet, &column, row),
            None => {
                report.add_error(format!("Invalid merge cell '{}'", merge_cell.cell), None);
                return MergeOutcome {
                    cell: merge_cell.cell.clone(),
                    value: String::new(),
                    updated: false,
                };
            }
        };

        if description.is_empty() {
            report.add_message(format!("Cell {} left unchanged: no description.", address));
            return MergeOutcome {
                cell: address,
                value: String::new(),
                updated: false,
            };
        }

        let current = match self.table.read_range(&self.spreadsheet_id, &address).await {
            Ok(values) => values
                .into_iter()
                .next()
                .and_then(|row| row.into_iter().next())
                .unwrap_or_default(),
            Err(e) => {
                tracing::error!("Failed to read {}: {}", address, e);
                report.add_error(format!("Could not read cell {}", address), Some(e.to_string()));
                return MergeOutcome {
                    cell: address,
                    value: String::new(),
                    updated: false,
                };
            }
        };

        let separator = &self.config.separator;
        let current = current.trim_matches(|c: char| separator.contains(c));
        let value = join_nonempty([current, description], separator);

        match self
            .table
            .update_range(&self.spreadsheet_id, &address, vec![vec![Some(value.clone())]])
            .await
        {
            Ok(_) => {
                report.add_message(format!("Cell {} updated.", address));
                MergeOutcome {
                    cell: address,
                    value,
                    updated: true,
                }
            }
            Err(e) => {
                tracing::error!("Failed to update {}: {}", address, e);
                report.add_error(format!("Could not update cell {}", address), Some(e.to_string()));
                MergeOutcome {
                    cell: address,
                    value,
                    updated: false,
                }
            }
        }
    }
}
