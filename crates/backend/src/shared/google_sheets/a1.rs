//! Адресация ячеек в нотации A1: буквы колонок, диапазоны, экранирование имён листов.

/// Буквенное имя колонки -> индекс с нуля (`A` -> 0, `AA` -> 26)
pub fn column_to_index(column: &str) -> Option<u32> {
    let column = column.trim();
    if column.is_empty() || column.len() > 3 {
        return None;
    }
    let mut index: u32 = 0;
    for ch in column.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
        index = index * 26 + digit;
    }
    Some(index - 1)
}

/// Индекс с нуля -> буквенное имя колонки
pub fn index_to_column(index: u32) -> String {
    let mut name = String::new();
    let mut n = index + 1;
    while n > 0 {
        n -= 1;
        name.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    name
}

/// Нормализует букву колонки (`b` -> `B`); None, если это не колонка
pub fn normalize_column(column: &str) -> Option<String> {
    column_to_index(column).map(index_to_column)
}

/// Имя листа в кавычках: `Sheet1` -> `'Sheet1'`, `it's` -> `'it''s'`
pub fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// Вся колонка листа: `'Sheet1'!B:B`
pub fn column_range(sheet: &str, column: &str) -> String {
    format!("{}!{}:{}", quote_sheet(sheet), column, column)
}

/// Одна ячейка: `'backups'!B26`
pub fn cell(sheet: &str, column: &str, row: u32) -> String {
    format!("{}!{}{}", quote_sheet(sheet), column, row)
}

/// Отрезок строки: `'Sheet1'!B7:L7`
pub fn row_span(sheet: &str, first_column: &str, last_column: &str, row: u32) -> String {
    format!(
        "{}!{}{}:{}{}",
        quote_sheet(sheet),
        first_column,
        row,
        last_column,
        row
    )
}

/// Разбирает адрес ячейки без листа: `B26` -> (`B`, 26)
pub fn parse_cell(reference: &str) -> Option<(String, u32)> {
    let reference = reference.trim();
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    let column = normalize_column(letters)?;
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((column, row))
}

/// Разбирает выбор колонок в стиле `usecols`: `A:D`, `A,C:D`, `b`.
/// Возвращает индексы с нуля в порядке возрастания, без повторов.
pub fn parse_column_selection(selection: &str) -> Result<Vec<u32>, String> {
    let mut indices = Vec::new();
    for part in selection.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(format!("empty item in column selection '{}'", selection));
        }
        let (first, last) = match part.split_once(':') {
            Some((a, b)) => (a, b),
            None => (part, part),
        };
        let first = column_to_index(first)
            .ok_or_else(|| format!("invalid column '{}' in '{}'", first, selection))?;
        let last = column_to_index(last)
            .ok_or_else(|| format!("invalid column '{}' in '{}'", last, selection))?;
        if first > last {
            return Err(format!("reversed column range '{}'", part));
        }
        indices.extend(first..=last);
    }
    indices.sort_unstable();
    indices.dedup();
    Ok(indices)
}

/// Разобранный диапазон `'Лист'!B7:L7`; у открытых диапазонов (`B:B`) строки не указаны
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRef {
    pub sheet: String,
    pub first_column: u32,
    pub first_row: Option<u32>,
    pub last_column: u32,
    pub last_row: Option<u32>,
}

pub fn parse_range(range: &str) -> Option<RangeRef> {
    let (sheet_part, cells) = range.rsplit_once('!')?;
    let sheet = match sheet_part.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(quoted) => quoted.replace("''", "'"),
        None => sheet_part.to_string(),
    };
    let (first, last) = cells.split_once(':').unwrap_or((cells, cells));
    let (first_column, first_row) = split_reference(first)?;
    let (last_column, last_row) = split_reference(last)?;
    Some(RangeRef {
        sheet,
        first_column,
        first_row,
        last_column,
        last_row,
    })
}

fn split_reference(reference: &str) -> Option<(u32, Option<u32>)> {
    match reference.find(|c: char| c.is_ascii_digit()) {
        Some(split) => {
            let (letters, digits) = reference.split_at(split);
            Some((column_to_index(letters)?, Some(digits.parse().ok()?)))
        }
        None => Some((column_to_index(reference)?, None)),
    }
}
