// Primitives for reading CSV files.

use crate::survey::{io_common::text_cell, *};

/// Reads a CSV survey: the first line holds the questions, each following line
/// the answers of one respondent.
pub fn read_csv_survey(path: &str) -> BSurveyResult<WideTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        // Trailing empty answers are sometimes cut by the exports.
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;

    let header_cells: Vec<Option<String>> = rdr
        .headers()
        .context(CsvLineParseSnafu { path })?
        .iter()
        .map(text_cell)
        .collect();
    let header = io_common::header_names(header_cells);
    debug!("read_csv_survey: header: {:?}", header);

    let mut table = WideTable::new(header);
    for (idx, line_r) in rdr.records().enumerate() {
        let line = line_r.context(CsvLineParseSnafu { path })?;
        if line.len() > table.header.len() {
            warn!(
                "read_csv_survey: line {}: {} cells for {} columns, ignoring the extra cells",
                idx + 2,
                line.len(),
                table.header.len()
            );
        }
        let row: Vec<Option<String>> = line
            .iter()
            .take(table.header.len())
            .map(text_cell)
            .collect();
        debug!("read_csv_survey: line {}: {:?}", idx + 2, row);
        table.push_row(row);
    }
    Ok(table)
}
