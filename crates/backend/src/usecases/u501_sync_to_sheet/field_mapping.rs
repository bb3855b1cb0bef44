use contracts::domain::a001_source_table::SourceTable;

use super::row_writer::CellValue;
use crate::shared::config::{FieldMappingConfig, SessionField};
use crate::shared::google_sheets::a1;

/// Склеивает части через `separator`, пропуская пустые после trim
pub fn join_nonempty<'a>(parts: impl IntoIterator<Item = &'a str>, separator: &str) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Значения, одинаковые для всех строк одной синхронизации
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConstants {
    pub session_ticket: String,
    pub technician: String,
    pub load_name: String,
    pub description: String,
}

impl SessionConstants {
    pub fn read(table: &SourceTable, fields: &FieldMappingConfig, separator: &str) -> Self {
        let fixed = |field: &SessionField| table.cell(&field.column, field.offset).to_string();
        Self {
            session_ticket: fixed(&fields.session_ticket),
            technician: fixed(&fields.technician),
            load_name: fixed(&fields.load_name),
            description: join_nonempty(
                fields
                    .description
                    .parts
                    .iter()
                    .map(|part| table.cell(&part.column, part.offset)),
                separator,
            ),
        }
    }
}

/// Поля одной строки окна
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFields {
    pub part_number: String,
    pub ticket: String,
    pub quantity: String,
}

impl RowFields {
    pub fn read(table: &SourceTable, fields: &FieldMappingConfig, offset: usize) -> Self {
        Self {
            part_number: table.cell(&fields.part_number.column, offset).to_string(),
            ticket: table.cell(&fields.ticket.column, offset).to_string(),
            quantity: table.cell(&fields.quantity.column, offset).to_string(),
        }
    }

    /// Строка переносится, только если все три поля непустые
    pub fn is_complete(&self) -> bool {
        !self.part_number.is_empty() && !self.ticket.is_empty() && !self.quantity.is_empty()
    }
}

/// Ячейки строки назначения, отсортированные слева направо
pub fn destination_cells(
    fields: &FieldMappingConfig,
    row: &RowFields,
    constants: &SessionConstants,
) -> Vec<CellValue> {
    let mut cells = vec![
        CellValue::new(&fields.part_number.destination, &row.part_number),
        CellValue::new(&fields.ticket.destination, &row.ticket),
        CellValue::new(&fields.quantity.destination, &row.quantity),
        CellValue::new(&fields.session_ticket.destination, &constants.session_ticket),
        CellValue::new(&fields.technician.destination, &constants.technician),
        CellValue::new(&fields.load_name.destination, &constants.load_name),
    ];
    if let Some(column) = &fields.description.destination {
        cells.push(CellValue::new(column, &constants.description));
    }
    cells.sort_by_key(|cell| a1::column_to_index(&cell.column).unwrap_or(u32::MAX));
    cells
}
