use crate::survey::*;

/// A cell as read from a file: blank cells are missing.
pub fn text_cell(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Renders numbers the way they appear in a spreadsheet (3 and not 3.0).
pub fn format_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Reads a spreadsheet cell. Error cells (#DIV/0!, #N/A, ...) are rejected.
pub fn excel_cell(cell: &calamine::DataType, lineno: usize) -> SurveyResult<Option<String>> {
    match cell {
        calamine::DataType::String(s) => Ok(text_cell(s)),
        calamine::DataType::Float(f) => Ok(Some(format_number(*f))),
        calamine::DataType::Int(i) => Ok(Some(i.to_string())),
        calamine::DataType::Bool(b) => Ok(Some(b.to_string())),
        calamine::DataType::DateTime(f) => Ok(Some(format_number(*f))),
        calamine::DataType::Empty => Ok(None),
        calamine::DataType::Error(e) => Err(SurveyError::ExcelWrongCellType {
            lineno: lineno as u64,
            content: format!("{:?}", e),
        }),
        #[allow(unreachable_patterns)]
        other => Ok(Some(format!("{:?}", other))),
    }
}

/// The names of the columns. Unnamed columns get a placeholder name based on
/// their position, so that they can still be dropped.
pub fn header_names(cells: Vec<Option<String>>) -> Vec<String> {
    cells
        .into_iter()
        .enumerate()
        .map(|(idx, c)| match c {
            Some(s) if !s.trim().is_empty() => s,
            _ => format!("Unnamed: {}", idx),
        })
        .collect()
}
