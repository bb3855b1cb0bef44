use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use super::a1::{self, RangeRef};
use super::{RemoteTable, SheetsError, UpdateAck};

type Grid = BTreeMap<(u32, u32), String>;

#[derive(Default)]
struct State {
    /// (spreadsheet_id, sheet) -> (row с единицы, колонка с нуля) -> значение
    sheets: BTreeMap<(String, String), Grid>,
    /// Журнал вызовов записи (диапазоны) в порядке поступления
    writes: Vec<String>,
    reads: Vec<String>,
    failing_reads: usize,
    failing_columns: HashSet<u32>,
}

/// Удалённая таблица в памяти процесса.
///
/// Используется как backend `memory` (локальный запуск без Google) и в тестах.
#[derive(Clone, Default)]
pub struct InMemoryTable {
    state: Arc<RwLock<State>>,
}

impl InMemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Текущее значение ячейки (для отладки и тестов)
    pub fn value(&self, spreadsheet_id: &str, sheet: &str, column: &str, row: u32) -> Option<String> {
        let column = a1::column_to_index(column)?;
        let state = self.state.read().ok()?;
        state
            .sheets
            .get(&(spreadsheet_id.to_string(), sheet.to_string()))
            .and_then(|grid| grid.get(&(row, column)))
            .cloned()
    }

    pub fn set_value(&self, spreadsheet_id: &str, sheet: &str, column: &str, row: u32, value: &str) {
        let Some(column) = a1::column_to_index(column) else {
            return;
        };
        if let Ok(mut state) = self.state.write() {
            state
                .sheets
                .entry((spreadsheet_id.to_string(), sheet.to_string()))
                .or_default()
                .insert((row, column), value.to_string());
        }
    }

    pub fn write_log(&self) -> Vec<String> {
        self.state
            .read()
            .map(|s| s.writes.clone())
            .unwrap_or_default()
    }

    pub fn read_log(&self) -> Vec<String> {
        self.state
            .read()
            .map(|s| s.reads.clone())
            .unwrap_or_default()
    }

    /// Следующие `count` чтений завершатся ошибкой
    pub fn fail_next_reads(&self, count: usize) {
        if let Ok(mut state) = self.state.write() {
            state.failing_reads = count;
        }
    }

    /// Любая запись, затрагивающая колонку, завершится ошибкой
    pub fn fail_writes_to_column(&self, column: &str) {
        if let (Some(index), Ok(mut state)) = (a1::column_to_index(column), self.state.write()) {
            state.failing_columns.insert(index);
        }
    }
}

fn parse(range: &str) -> Result<RangeRef, SheetsError> {
    a1::parse_range(range).ok_or_else(|| SheetsError::InvalidRange(range.to_string()))
}

fn poisoned() -> SheetsError {
    SheetsError::Rejected("in-memory table lock poisoned".to_string())
}

#[async_trait]
impl RemoteTable for InMemoryTable {
    async fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError> {
        let target = parse(range)?;
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.reads.push(range.to_string());
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(SheetsError::Rejected(format!("read of {} refused", range)));
        }

        let Some(grid) = state
            .sheets
            .get(&(spreadsheet_id.to_string(), target.sheet.clone()))
        else {
            return Ok(Vec::new());
        };

        let columns = target.first_column..=target.last_column;
        let first_row = target.first_row.unwrap_or(1);
        let last_row = match target.last_row {
            Some(row) => row,
            None => grid
                .iter()
                .filter(|((_, c), v)| columns.contains(c) && !v.is_empty())
                .map(|((r, _), _)| *r)
                .max()
                .unwrap_or(0),
        };

        // Как и Sheets API: хвостовые пустые ячейки и строки не возвращаются
        let mut rows: Vec<Vec<String>> = (first_row..=last_row)
            .map(|row| {
                let mut values: Vec<String> = columns
                    .clone()
                    .map(|col| grid.get(&(row, col)).cloned().unwrap_or_default())
                    .collect();
                while values.last().is_some_and(|v| v.is_empty()) {
                    values.pop();
                }
                values
            })
            .collect();
        while rows.last().is_some_and(|r| r.is_empty()) {
            rows.pop();
        }
        Ok(rows)
    }

    async fn update_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<Option<String>>>,
    ) -> Result<UpdateAck, SheetsError> {
        let target = parse(range)?;
        let first_row = target
            .first_row
            .ok_or_else(|| SheetsError::InvalidRange(range.to_string()))?;
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.writes.push(range.to_string());

        let touched = target.first_column..=target.last_column;
        if state.failing_columns.iter().any(|c| touched.contains(c)) {
            return Err(SheetsError::Rejected(format!("write to {} refused", range)));
        }

        let grid = state
            .sheets
            .entry((spreadsheet_id.to_string(), target.sheet))
            .or_default();
        let mut updated_cells = 0;
        for (dr, row) in values.into_iter().enumerate() {
            for (dc, value) in row.into_iter().enumerate() {
                let Some(value) = value else { continue };
                grid.insert((first_row + dr as u32, target.first_column + dc as u32), value);
                updated_cells += 1;
            }
        }
        Ok(UpdateAck {
            updated_range: range.to_string(),
            updated_cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_column_skips_trailing_blanks() {
        let table = InMemoryTable::new();
        table.set_value("id", "Sheet1", "B", 1, "header");
        table.set_value("id", "Sheet1", "B", 3, "x");
        let rows = table.read_range("id", "'Sheet1'!B:B").await.unwrap();
        assert_eq!(rows, vec![vec!["header".to_string()], vec![], vec!["x".to_string()]]);
    }

    #[tokio::test]
    async fn test_update_leaves_none_cells_untouched() {
        let table = InMemoryTable::new();
        table.set_value("id", "Sheet1", "C", 4, "keep");
        let ack = table
            .update_range(
                "id",
                "'Sheet1'!B4:D4",
                vec![vec![Some("b".to_string()), None, Some("d".to_string())]],
            )
            .await
            .unwrap();
        assert_eq!(ack.updated_cells, 2);
        assert_eq!(table.value("id", "Sheet1", "B", 4).as_deref(), Some("b"));
        assert_eq!(table.value("id", "Sheet1", "C", 4).as_deref(), Some("keep"));
        assert_eq!(table.value("id", "Sheet1", "D", 4).as_deref(), Some("d"));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let table = InMemoryTable::new();
        table.fail_next_reads(1);
        assert!(table.read_range("id", "'S'!B:B").await.is_err());
        assert!(table.read_range("id", "'S'!B:B").await.is_ok());

        table.fail_writes_to_column("H");
        let err = table
            .update_range("id", "'S'!B2:L2", vec![vec![Some("x".to_string())]])
            .await;
        assert!(err.is_err());
        assert_eq!(table.value("id", "S", "B", 2), None);
    }
}
