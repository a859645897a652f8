// Primitives for reading spreadsheets (xlsx, xls, xlsb, ods).

use calamine::{open_workbook_auto, DataType, Range, Reader};

use crate::survey::{io_common::*, *};

/// Reads the survey from a worksheet: the first row holds the questions, each
/// following row the answers of one respondent.
pub fn read_excel_survey(path: &str, worksheet_name: Option<&str>) -> BSurveyResult<WideTable> {
    let wrange = get_range(path, worksheet_name)?;
    range_to_table(path, &wrange)
}

fn range_to_table(path: &str, wrange: &Range<DataType>) -> BSurveyResult<WideTable> {
    let mut iter = wrange.rows();
    let header_row = iter.next().context(EmptyExcelSnafu { path })?;
    let mut header_cells: Vec<Option<String>> = Vec::new();
    for cell in header_row {
        header_cells.push(excel_cell(cell, 1)?);
    }
    let header = header_names(header_cells);
    debug!("read_excel_survey: header: {:?}", header);

    let mut table = WideTable::new(header);
    for (idx, row) in iter.enumerate() {
        // Line numbers as displayed by the spreadsheet, after the header.
        let lineno = idx + 2;
        let mut cells: Vec<Option<String>> = Vec::with_capacity(row.len());
        for cell in row {
            cells.push(excel_cell(cell, lineno)?);
        }
        debug!("read_excel_survey: line {}: {:?}", lineno, cells);
        table.push_row(cells);
    }
    Ok(table)
}

fn get_range(path: &str, worksheet_name_o: Option<&str>) -> BSurveyResult<Range<DataType>> {
    debug!(
        "read_excel_survey: path: {:?} worksheet: {:?}",
        path, worksheet_name_o
    );
    let mut workbook = open_workbook_auto(path).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = worksheet_name_o {
        let wrange = workbook
            .worksheet_range(worksheet_name)
            .context(ExcelWorksheetNotFoundSnafu {
                path,
                name: worksheet_name,
            })?
            .context(OpeningExcelSnafu { path })?;
        return Ok(wrange);
    }

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    match sheet_names.as_slice() {
        [] => Err(Box::new(SurveyError::EmptyExcel {
            path: path.to_string(),
        })),
        [worksheet_name, rest @ ..] => {
            if !rest.is_empty() {
                warn!(
                    "read_excel_survey: {} worksheets in {:?}, using the first one {:?} (set excelWorksheetName to pick another)",
                    sheet_names.len(),
                    path,
                    worksheet_name
                );
            }
            let wrange = workbook
                .worksheet_range_at(0)
                .context(EmptyExcelSnafu { path })?
                .context(OpeningExcelSnafu { path })?;
            Ok(wrange)
        }
    }
}
