use crate::shared::config::WriteMode;
use crate::shared::google_sheets::{a1, RemoteTable, SheetsError};

/// Значение для одной колонки строки назначения
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellValue {
    pub column: String,
    pub value: String,
}

impl CellValue {
    pub fn new(column: &str, value: &str) -> Self {
        Self {
            column: a1::normalize_column(column).unwrap_or_else(|| column.to_string()),
            value: value.to_string(),
        }
    }
}

/// Итог записи строки: какие колонки легли, какие нет и почему
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteAck {
    pub row: u32,
    pub written: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl WriteAck {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Пишет строки в лист удалённой таблицы
pub struct RowWriter<'a> {
    table: &'a dyn RemoteTable,
    spreadsheet_id: &'a str,
    sheet: &'a str,
    mode: WriteMode,
}

impl<'a> RowWriter<'a> {
    pub fn new(
        table: &'a dyn RemoteTable,
        spreadsheet_id: &'a str,
        sheet: &'a str,
        mode: WriteMode,
    ) -> Self {
        Self {
            table,
            spreadsheet_id,
            sheet,
            mode,
        }
    }

    /// Строка сразу после последней занятой ячейки колонки.
    /// Пустоты внутри колонки не заполняются: там могут быть остатки записей.
    /// Без записи между вызовами возвращает одно и то же значение.
    pub async fn find_insertion_row(&self, probe_column: &str) -> Result<u32, SheetsError> {
        let range = a1::column_range(self.sheet, probe_column);
        let values = self.table.read_range(self.spreadsheet_id, &range).await?;
        let last_used = values
            .iter()
            .rposition(|row| row.first().is_some_and(|v| !v.trim().is_empty()));
        Ok(last_used.map_or(1, |index| index as u32 + 2))
    }

    pub async fn write_row(&self, row: u32, cells: &[CellValue]) -> WriteAck {
        match self.mode {
            WriteMode::Batched => self.write_batched(row, cells).await,
            WriteMode::PerCell => self.write_per_cell(row, cells).await,
        }
    }

    /// Одна запись на ячейку; ошибка одной ячейки не останавливает остальные
    async fn write_per_cell(&self, row: u32, cells: &[CellValue]) -> WriteAck {
        let mut ack = WriteAck {
            row,
            ..Default::default()
        };
        for cell in cells {
            let range = a1::cell(self.sheet, &cell.column, row);
            match self
                .table
                .update_range(self.spreadsheet_id, &range, vec![vec![Some(cell.value.clone())]])
                .await
            {
                Ok(_) => ack.written.push(cell.column.clone()),
                Err(e) => {
                    tracing::error!("Failed to write {}: {}", range, e);
                    ack.failed.push((cell.column.clone(), e.to_string()));
                }
            }
        }
        ack
    }

    /// Один диапазон от крайней левой до крайней правой колонки;
    /// промежуточные колонки уходят как null и не затираются
    async fn write_batched(&self, row: u32, cells: &[CellValue]) -> WriteAck {
        let mut ack = WriteAck {
            row,
            ..Default::default()
        };
        let indexed: Vec<(u32, &CellValue)> = cells
            .iter()
            .filter_map(|cell| a1::column_to_index(&cell.column).map(|index| (index, cell)))
            .collect();
        let (Some(first), Some(last)) = (
            indexed.iter().map(|(i, _)| *i).min(),
            indexed.iter().map(|(i, _)| *i).max(),
        ) else {
            return ack;
        };

        let mut values: Vec<Option<String>> = vec![None; (last - first + 1) as usize];
        for (index, cell) in &indexed {
            values[(index - first) as usize] = Some(cell.value.clone());
        }

        let range = a1::row_span(
            self.sheet,
            &a1::index_to_column(first),
            &a1::index_to_column(last),
            row,
        );
        match self
            .table
            .update_range(self.spreadsheet_id, &range, vec![values])
            .await
        {
            Ok(_) => {
                ack.written = indexed.iter().map(|(_, c)| c.column.clone()).collect();
            }
            Err(e) => {
                tracing::error!("Failed to write {}: {}", range, e);
                let message = e.to_string();
                ack.failed = indexed
                    .iter()
                    .map(|(_, c)| (c.column.clone(), message.clone()))
                    .collect();
            }
        }
        ack
    }
}
