use calamine::{Data, Range, Reader, Xlsx};
use contracts::domain::a001_source_table::{ExtractOptions, SourceTable};
use std::collections::HashMap;
use std::io::Cursor;

use crate::shared::google_sheets::a1;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("the uploaded file is not a readable .xlsx workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),

    #[error("worksheet '{requested}' not found (available: {available})")]
    SheetNotFound { requested: String, available: String },

    #[error("invalid column selection: {0}")]
    Columns(String),

    #[error("row count must be at least 1")]
    ZeroRows,
}

/// Извлекает прямоугольный диапазон листа в таблицу.
///
/// Первая непустая строка листа считается заголовком; за ней берётся до
/// `nrows` строк данных. Хвостовые строки, пустые во всех выбранных колонках,
/// отбрасываются, поэтому таблица может оказаться короче `nrows`.
pub fn extract_table(bytes: &[u8], options: &ExtractOptions) -> Result<SourceTable, ExtractError> {
    let columns = a1::parse_column_selection(&options.usecols).map_err(ExtractError::Columns)?;
    if options.nrows == 0 {
        return Err(ExtractError::ZeroRows);
    }

    let mut workbook = Xlsx::new(Cursor::new(bytes))?;
    let sheet_names = workbook.sheet_names();
    if !sheet_names.iter().any(|name| name == &options.sheet_name) {
        return Err(ExtractError::SheetNotFound {
            requested: options.sheet_name.clone(),
            available: sheet_names.join(", "),
        });
    }
    let range = workbook.worksheet_range(&options.sheet_name)?;

    let header_row = range.start().map(|(row, _)| row).unwrap_or(0);
    let names = header_names(&range, header_row, &columns);

    // Дальше конца листа строк нет, как бы велико ни было nrows
    let requested = u32::try_from(options.nrows).unwrap_or(u32::MAX);
    let sheet_end = range.end().map(|(row, _)| row).unwrap_or(header_row);
    let limit = header_row.saturating_add(requested).min(sheet_end);
    let last_row = ((header_row + 1)..=limit).rev().find(|&row| {
        columns
            .iter()
            .any(|&col| !cell_at(&range, row, col).is_empty())
    });

    let mut table = SourceTable::new(names.clone());
    if let Some(last_row) = last_row {
        for row in (header_row + 1)..=last_row {
            let values: HashMap<String, String> = names
                .iter()
                .zip(&columns)
                .map(|(name, &col)| (name.clone(), cell_at(&range, row, col)))
                .collect();
            table.rows.push(values);
        }
    }

    tracing::debug!(
        "Extracted {} rows x {} columns from sheet '{}'",
        table.len(),
        table.columns.len(),
        options.sheet_name
    );
    Ok(table)
}

/// Имена колонок из строки заголовка: пустые -> `Unnamed: n`, повторы -> `.1`, `.2`
fn header_names(range: &Range<Data>, header_row: u32, columns: &[u32]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    columns
        .iter()
        .enumerate()
        .map(|(position, &col)| {
            let raw = cell_at(range, header_row, col);
            let base = if raw.is_empty() {
                format!("Unnamed: {}", position)
            } else {
                raw
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

fn cell_at(range: &Range<Data>, row: u32, col: u32) -> String {
    range
        .get_value((row, col))
        .map(cell_text)
        .unwrap_or_default()
}

/// Текстовое представление значения ячейки
pub fn cell_text(value: &Data) -> String {
    match value {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_float(*f),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => format_float(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    /// Книга с одним листом; строки, похожие на числа, пишутся числами
    pub(crate) fn workbook(sheet: &str, rows: &[Vec<&str>]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                match value.parse::<f64>() {
                    Ok(number) => worksheet.write_number(r as u32, c as u16, number).unwrap(),
                    Err(_) => worksheet.write_string(r as u32, c as u16, *value).unwrap(),
                };
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    fn options(nrows: usize) -> ExtractOptions {
        ExtractOptions {
            sheet_name: "backup".to_string(),
            usecols: "A:D".to_string(),
            nrows,
        }
    }

    #[test]
    fn test_extracts_header_and_rows_with_empty_defaults() {
        let bytes = workbook(
            "backup",
            &[
                vec!["NUMERO DE PARTE", "DESCRIPCION", "CANT.", "TICKET"],
                vec!["P1", "", "5", "T1"],
                vec!["", "cable", "2.5", ""],
            ],
        );
        let table = extract_table(&bytes, &options(28)).unwrap();
        assert_eq!(
            table.columns,
            vec!["NUMERO DE PARTE", "DESCRIPCION", "CANT.", "TICKET"]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell("NUMERO DE PARTE", 0), "P1");
        assert_eq!(table.cell("CANT.", 0), "5");
        assert_eq!(table.cell("DESCRIPCION", 0), "");
        assert_eq!(table.cell("CANT.", 1), "2.5");
        assert_eq!(table.cell("TICKET", 1), "");
    }

    #[test]
    fn test_nrows_limits_table_and_columns_outside_selection_are_ignored() {
        let bytes = workbook(
            "backup",
            &[
                vec!["A", "B", "C", "D", "E"],
                vec!["1", "2", "3", "4", "ignored"],
                vec!["5", "6", "7", "8", "ignored"],
                vec!["9", "10", "11", "12", "ignored"],
            ],
        );
        let table = extract_table(&bytes, &options(2)).unwrap();
        assert_eq!(table.len(), 2);
        assert!(!table.columns.contains(&"E".to_string()));
        assert_eq!(table.cell("D", 1), "8");
    }

    #[test]
    fn test_huge_nrows_is_bounded_by_sheet() {
        let bytes = workbook(
            "backup",
            &[
                vec!["A", "B", "C", "D"],
                vec!["1", "2", "3", "4"],
                vec!["5", "6", "7", "8"],
            ],
        );
        for nrows in [u32::MAX as usize, usize::MAX] {
            let table = extract_table(&bytes, &options(nrows)).unwrap();
            assert_eq!(table.len(), 2);
            assert_eq!(table.cell("D", 1), "8");
        }
    }

    #[test]
    fn test_blank_and_duplicate_headers_are_named() {
        let bytes = workbook(
            "backup",
            &[vec!["TICKET", "", "TICKET", "X"], vec!["a", "b", "c", "d"]],
        );
        let table = extract_table(&bytes, &options(5)).unwrap();
        assert_eq!(table.columns, vec!["TICKET", "Unnamed: 1", "TICKET.1", "X"]);
        assert_eq!(table.cell("TICKET.1", 0), "c");
    }

    #[test]
    fn test_interior_blank_rows_are_kept() {
        let bytes = workbook(
            "backup",
            &[vec!["A", "B"], vec!["1", ""], vec!["", ""], vec!["3", ""]],
        );
        let mut opts = options(10);
        opts.usecols = "A:B".to_string();
        let table = extract_table(&bytes, &opts).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.cell("A", 1), "");
        assert_eq!(table.cell("A", 2), "3");
    }

    #[test]
    fn test_missing_sheet_and_bad_input() {
        let bytes = workbook("other", &[vec!["A"]]);
        assert!(matches!(
            extract_table(&bytes, &options(1)),
            Err(ExtractError::SheetNotFound { .. })
        ));
        assert!(matches!(
            extract_table(b"not a zip", &options(1)),
            Err(ExtractError::Workbook(_))
        ));
        assert!(matches!(
            extract_table(&bytes, &options(0)),
            Err(ExtractError::ZeroRows)
        ));
        let mut opts = options(1);
        opts.usecols = "D:A".to_string();
        assert!(matches!(
            extract_table(&bytes, &opts),
            Err(ExtractError::Columns(_))
        ));
    }

    #[test]
    fn test_cell_text_formats() {
        assert_eq!(cell_text(&Data::Float(5.0)), "5");
        assert_eq!(cell_text(&Data::Float(2.25)), "2.25");
        assert_eq!(cell_text(&Data::Int(-3)), "-3");
        assert_eq!(cell_text(&Data::Bool(true)), "TRUE");
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String(" x ".to_string())), " x ");
    }
}
