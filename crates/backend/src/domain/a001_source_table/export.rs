use contracts::domain::a001_source_table::SourceTable;
use rust_xlsxwriter::{Workbook, XlsxError};

use crate::shared::config::OutputMode;

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const OUTPUT_FILE_NAME: &str = "archivo_modificado.xlsx";

/// Книга для скачивания: исходные байты или новая книга из таблицы
pub fn build_output(
    mode: OutputMode,
    original: &[u8],
    sheet_name: &str,
    table: &SourceTable,
) -> Result<Vec<u8>, XlsxError> {
    match mode {
        OutputMode::Verbatim => Ok(original.to_vec()),
        OutputMode::Reconstructed => reconstruct(sheet_name, table),
    }
}

/// Заголовок в первой строке, данные ниже; числа пишутся числами
fn reconstruct(sheet_name: &str, table: &SourceTable) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    for (col, name) in table.columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, name.as_str())?;
    }
    for offset in 0..table.len() {
        let row = offset as u32 + 1;
        for (col, value) in table.row_values(offset).into_iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            match value.parse::<f64>() {
                Ok(number) if number.is_finite() => {
                    worksheet.write_number(row, col as u16, number)?;
                }
                _ => {
                    worksheet.write_string(row, col as u16, value)?;
                }
            }
        }
    }
    workbook.save_to_buffer()
}
