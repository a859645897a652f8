// Writers for the output tables.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::survey::*;

/// A table written next to its destination, not yet in place.
pub struct StagedTable {
    file: NamedTempFile,
    path: PathBuf,
}

fn write_all(
    path: &Path,
    header: Vec<String>,
    lines: Vec<Vec<String>>,
) -> BSurveyResult<StagedTable> {
    let p = path.display().to_string();
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    // Same directory as the destination, so that committing is a rename.
    let file = tempfile::Builder::new()
        .prefix(".survsent")
        .suffix(".csv.tmp")
        .tempfile_in(dir)
        .context(StagingOutputSnafu { path: p.clone() })?;
    {
        let mut w = csv::Writer::from_writer(file.as_file());
        w.write_record(&header)
            .context(WritingOutputSnafu { path: p.clone() })?;
        for line in lines.iter() {
            w.write_record(line)
                .context(WritingOutputSnafu { path: p.clone() })?;
        }
        w.flush().context(FlushingOutputSnafu { path: p.clone() })?;
    }
    debug!("write_all: staged {} lines for {:?}", lines.len(), p);
    Ok(StagedTable {
        file,
        path: path.to_path_buf(),
    })
}

/// Moves the staged tables to their destinations, replacing the previous
/// files. The destinations are all checked before the first one is replaced.
pub fn commit(tables: Vec<StagedTable>) -> BSurveyResult<()> {
    for t in tables.iter() {
        ensure!(
            !t.path.is_dir(),
            OutputIsDirectorySnafu {
                path: t.path.display().to_string()
            }
        );
    }
    for t in tables {
        let p = t.path.display().to_string();
        t.file
            .persist(&t.path)
            .map_err(|e| e.error)
            .context(CommittingOutputSnafu { path: p.clone() })?;
        info!("Wrote {:?}", p);
    }
    Ok(())
}

fn record_header(id_column: &str, key_columns: &[String]) -> Vec<String> {
    let mut header = vec![id_column.to_string()];
    header.extend(key_columns.iter().cloned());
    header.push("Question".to_string());
    header.push("Response".to_string());
    header
}

fn record_cells(record: &LongRecord) -> Vec<String> {
    let mut cells = vec![record.unique_id.clone()];
    cells.extend(record.slicer_values.iter().map(|(_, v)| v.clone()));
    cells.push(record.question.clone());
    cells.push(record.response.clone());
    cells
}

/// The response-level table: one line per scored answer.
pub fn write_response_table(
    path: &Path,
    id_column: &str,
    key_columns: &[String],
    rows: &[ResponseSentimentRow],
) -> BSurveyResult<StagedTable> {
    let mut header = record_header(id_column, key_columns);
    header.extend(
        ["Sentiment", "Magnitude", "Sentiment Buckets"]
            .iter()
            .map(|s| s.to_string()),
    );
    let lines = rows
        .iter()
        .map(|r| {
            let mut cells = record_cells(&r.record);
            cells.push(r.sentiment.score.to_string());
            cells.push(r.sentiment.magnitude.to_string());
            cells.push(r.bucket.label().to_string());
            cells
        })
        .collect();
    write_all(path, header, lines)
}

/// The entity-level table: one line per entity found in an answer.
pub fn write_entity_table(
    path: &Path,
    id_column: &str,
    key_columns: &[String],
    rows: &[EntitySentimentRow],
) -> BSurveyResult<StagedTable> {
    let mut header = record_header(id_column, key_columns);
    header.extend(
        [
            "Entity",
            "Type",
            "Salience",
            "Sentiment",
            "Magnitude",
            "Sentiment Buckets",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    let lines = rows
        .iter()
        .map(|r| {
            let mut cells = record_cells(&r.record);
            cells.push(r.entity.name.clone());
            cells.push(r.entity.entity_type.api_name().to_string());
            cells.push(r.entity.salience.to_string());
            cells.push(r.entity.sentiment_score.to_string());
            cells.push(r.entity.sentiment_magnitude.to_string());
            cells.push(r.bucket.label().to_string());
            cells
        })
        .collect();
    write_all(path, header, lines)
}

/// The long table, before any scoring.
pub fn write_pivoted_table(
    path: &Path,
    id_column: &str,
    key_columns: &[String],
    records: &[LongRecord],
) -> BSurveyResult<StagedTable> {
    let header = record_header(id_column, key_columns);
    let lines = records.iter().map(record_cells).collect();
    write_all(path, header, lines)
}
