use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};
use survey_sentiment::*;

use std::fs;
use std::path::Path;

use text_diff::print_diff;

use crate::args::Args;
use crate::survey::config_reader::*;
use crate::survey::google_nl::GoogleLanguageClient;

mod config_reader;
mod google_nl;
mod io_common;
mod io_csv;
mod io_excel;
mod io_output;

#[derive(Debug, Snafu)]
pub enum SurveyError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::Error,
        path: String,
    },
    #[snafu(display("The spreadsheet {path} has no header row"))]
    EmptyExcel { path: String },
    #[snafu(display("The spreadsheet {path} has no worksheet named {name:?}"))]
    ExcelWorksheetNotFound { path: String, name: String },
    #[snafu(display("Line {lineno}: cannot read cell {content}"))]
    ExcelWrongCellType { lineno: u64, content: String },
    #[snafu(display("Error opening file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading file {path}"))]
    CsvLineParse { source: csv::Error, path: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON content of {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("The config file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("No survey file provided (sourcePath or --input)"))]
    MissingSource {},
    #[snafu(display("Cannot determine the type of input {input_type:?}: use csv or excel"))]
    UnknownInputType { input_type: String },
    #[snafu(display("timeoutSeconds must be positive"))]
    InvalidTimeout {},
    #[snafu(display("maxRetries is {max_retries}, at most {limit} retries are allowed"))]
    InvalidRetries { max_retries: u32, limit: u32 },
    #[snafu(display("retryMaxDelayMs is {max_delay:?}, at most {limit:?} is allowed"))]
    InvalidRetryDelay {
        max_delay: std::time::Duration,
        limit: std::time::Duration,
    },
    #[snafu(display(
        "No credential for the scoring service: set {api_key_env} or {access_token_env}"
    ))]
    MissingCredential {
        api_key_env: String,
        access_token_env: String,
    },
    #[snafu(display("Invalid configuration"))]
    InvalidConfig { source: SentimentError },
    #[snafu(display("The sentiment analysis failed"))]
    Analysis { source: SentimentError },
    #[snafu(display("Cannot build the HTTP client"))]
    HttpClient { source: reqwest::Error },
    #[snafu(display("Cannot create the output directory {path}"))]
    CreatingOutputDir {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingOutput { source: csv::Error, path: String },
    #[snafu(display("Cannot create a temporary file next to {path}"))]
    StagingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Cannot replace {path}"))]
    CommittingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("The output path {path} is a directory"))]
    OutputIsDirectory { path: String },
    #[snafu(display("Error writing file {path}"))]
    FlushingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error reading the reference file {path}"))]
    ReadingReference {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Difference detected between the response table and the reference {path}"))]
    ReferenceMismatch { path: String },
}

pub type SurveyResult<T> = Result<T, SurveyError>;
pub type BSurveyResult<T> = Result<T, Box<SurveyError>>;

/// Reads the configuration, checks it, and runs the whole analysis against
/// the Google Cloud Natural Language API.
pub fn run(args: &Args) -> BSurveyResult<()> {
    let file_config = match &args.config {
        Some(path) => read_config(path)?,
        None => SurveyConfig::default(),
    };
    let config = merge_args(file_config, args);
    info!("config: {:?}", config);
    let run_config = validate_config(&config)?;

    let credential = run_config.service.credential()?;
    let client = GoogleLanguageClient::new(&run_config.service, credential)?;
    let scorer = Retrying::new(client, run_config.service.retry);

    run_survey(&run_config, &scorer, args.reference.as_deref())
}

/// Runs the analysis with the given scorer.
///
/// The output tables are staged next to their destinations and only moved in
/// place once every requested table has been written: a failed run leaves
/// the previous files untouched.
pub fn run_survey(
    config: &RunConfig,
    scorer: &dyn SentimentScorer,
    reference: Option<&str>,
) -> BSurveyResult<()> {
    let table = read_survey(config)?;
    info!(
        "run_survey: {} rows, {} columns",
        table.rows.len(),
        table.header.len()
    );

    // Fail on the columns before making any call.
    let reshape_plan = plan(&config.reshape, &table.header).context(InvalidConfigSnafu {})?;
    let key_columns: Vec<String> = reshape_plan
        .key_columns
        .iter()
        .map(|(k, _)| k.clone())
        .collect();
    let mut records = reshape(&table, &config.reshape).context(InvalidConfigSnafu {})?;

    if let Some(limit) = config.limit {
        if records.len() > limit {
            info!(
                "run_survey: only scoring the first {} of {} records",
                limit,
                records.len()
            );
            records.truncate(limit);
        }
    }

    let out = aggregate(&records, &config.aggregate, scorer).context(AnalysisSnafu {})?;
    for s in out.skipped.iter() {
        warn!(
            "run_survey: record {} ({:?}, {:?}) was not scored: {}",
            s.index, s.unique_id, s.question, s.reason
        );
    }

    let id_column = config.reshape.id_column_name();

    let outputs = [
        Some(&config.output.response_path),
        Some(&config.output.entity_path),
        config.output.pivoted_path.as_ref(),
    ];
    for p in outputs.iter().flatten() {
        if let Some(dir) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).context(CreatingOutputDirSnafu {
                path: dir.display().to_string(),
            })?;
        }
    }

    let mut staged: Vec<io_output::StagedTable> = Vec::new();
    if config.aggregate.compute_overall {
        staged.push(io_output::write_response_table(
            &config.output.response_path,
            id_column,
            &key_columns,
            &out.responses,
        )?);
    }
    if config.aggregate.compute_entity {
        staged.push(io_output::write_entity_table(
            &config.output.entity_path,
            id_column,
            &key_columns,
            &out.entities,
        )?);
    }
    if let Some(p) = &config.output.pivoted_path {
        staged.push(io_output::write_pivoted_table(
            p,
            id_column,
            &key_columns,
            &records,
        )?);
    }
    io_output::commit(staged)?;

    if let Some(reference_path) = reference {
        check_reference(&config.output.response_path, reference_path)?;
    }
    Ok(())
}

fn read_survey(config: &RunConfig) -> BSurveyResult<WideTable> {
    let path = config.source_path.display().to_string();
    info!("Attempting to read survey file {:?}", path);
    match config.input_type {
        InputType::Csv => io_csv::read_csv_survey(&path),
        InputType::Excel => {
            io_excel::read_excel_survey(&path, config.excel_worksheet_name.as_deref())
        }
    }
}

fn check_reference(computed: &Path, reference_path: &str) -> BSurveyResult<()> {
    let computed_s = fs::read_to_string(computed).context(ReadingReferenceSnafu {
        path: computed.display().to_string(),
    })?;
    let reference_s = fs::read_to_string(reference_path).context(ReadingReferenceSnafu {
        path: reference_path,
    })?;
    if reference_s != computed_s {
        warn!("Found differences with the reference file");
        print_diff(reference_s.as_str(), computed_s.as_str(), "\n");
        return Err(Box::new(SurveyError::ReferenceMismatch {
            path: reference_path.to_string(),
        }));
    }
    debug!("check_reference: identical to {:?}", reference_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores the texts from a fixed table and fails on the listed ones.
    #[derive(Default)]
    struct FixedScorer {
        documents: HashMap<String, f64>,
        entities: HashMap<String, Vec<(String, f64)>>,
        failing: Vec<String>,
        calls: AtomicUsize,
    }

    impl SentimentScorer for FixedScorer {
        fn score_document(&self, text: &str) -> Result<SentimentResult, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.iter().any(|f| f == text) {
                return Err(ServiceError::Rejected {
                    status: 403,
                    message: "quota exceeded".to_string(),
                });
            }
            let score = self.documents.get(text).cloned().unwrap_or(0.0);
            Ok(SentimentResult {
                score,
                magnitude: score.abs() * 2.0,
            })
        }

        fn score_entities(&self, text: &str) -> Result<Vec<EntityResult>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .entities
                .get(text)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|(name, score)| EntityResult {
                    name,
                    entity_type: EntityType::Organization,
                    salience: 0.25,
                    sentiment_score: score,
                    sentiment_magnitude: 0.5,
                })
                .collect())
        }
    }

    fn scorer() -> FixedScorer {
        let mut s = FixedScorer::default();
        s.documents.insert("I love this!".to_string(), 0.9);
        s.documents.insert("Acme support is slow".to_string(), -0.4);
        s.entities.insert(
            "Acme support is slow".to_string(),
            vec![("Acme".to_string(), -0.7)],
        );
        s
    }

    fn write_survey(dir: &Path) -> PathBuf {
        let p = dir.join("survey.csv");
        let mut f = fs::File::create(&p).unwrap();
        writeln!(f, "Timestamp,Team,Q1,Q2").unwrap();
        writeln!(f, "2023-03-01,Red,I love this!,").unwrap();
        writeln!(f, "2023-03-02,Blue,,Acme support is slow").unwrap();
        writeln!(f, "2023-03-03,Red,meh,ok").unwrap();
        p
    }

    fn run_config(dir: &Path, source: PathBuf) -> RunConfig {
        let config = SurveyConfig {
            source_path: Some(source.display().to_string()),
            key_columns: vec!["Team".to_string()],
            drop_columns: vec!["Timestamp".to_string()],
            output_directory: Some(dir.join("out").display().to_string()),
            pivoted_output: Some("pivoted_data.csv".to_string()),
            ..SurveyConfig::default()
        };
        validate_config(&config).unwrap()
    }

    #[test]
    fn end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path(), write_survey(dir.path()));
        run_survey(&config, &scorer(), None).unwrap();

        let responses = fs::read_to_string(&config.output.response_path).unwrap();
        let lines: Vec<&str> = responses.lines().collect();
        assert_eq!(
            lines,
            vec![
                "uID,Team,Question,Response,Sentiment,Magnitude,Sentiment Buckets",
                "0,Red,Q1,I love this!,0.9,1.8,Very Positive",
                "1,Blue,Q2,Acme support is slow,-0.4,0.8,Negative",
                "2,Red,Q1,meh,0,0,Neutral",
                "2,Red,Q2,ok,0,0,Neutral",
            ]
        );

        let entities = fs::read_to_string(&config.output.entity_path).unwrap();
        let lines: Vec<&str> = entities.lines().collect();
        assert_eq!(
            lines,
            vec![
                "uID,Team,Question,Response,Entity,Type,Salience,Sentiment,Magnitude,Sentiment Buckets",
                "1,Blue,Q2,Acme support is slow,Acme,ORGANIZATION,0.25,-0.7,0.5,Very Negative",
            ]
        );

        let pivoted = fs::read_to_string(config.output.pivoted_path.unwrap()).unwrap();
        assert_eq!(pivoted.lines().count(), 5);
    }

    #[test]
    fn reruns_overwrite_identically() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path(), write_survey(dir.path()));
        run_survey(&config, &scorer(), None).unwrap();
        let first = fs::read(&config.output.response_path).unwrap();
        run_survey(&config, &scorer(), None).unwrap();
        let second = fs::read(&config.output.response_path).unwrap();
        assert_eq!(first, second);

        // The first output is a valid reference for the second run.
        let reference = dir.path().join("reference.csv");
        fs::write(&reference, &first).unwrap();
        run_survey(&config, &scorer(), reference.to_str()).unwrap();
    }

    #[test]
    fn reference_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path(), write_survey(dir.path()));
        let reference = dir.path().join("reference.csv");
        fs::write(&reference, "uID,Team\n").unwrap();
        let err = run_survey(&config, &scorer(), reference.to_str()).unwrap_err();
        assert!(matches!(*err, SurveyError::ReferenceMismatch { .. }));
    }

    #[test]
    fn service_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path(), write_survey(dir.path()));
        let s = FixedScorer {
            failing: vec!["Acme support is slow".to_string()],
            ..scorer()
        };
        let err = run_survey(&config, &s, None).unwrap_err();
        match *err {
            SurveyError::Analysis { source } => {
                assert_eq!(source.kind(), ErrorKind::Service);
                assert!(source.to_string().contains("\"1\""));
            }
            e => panic!("unexpected error {:?}", e),
        }
        assert!(!config.output.response_path.exists());
        assert!(!config.output.entity_path.exists());
    }

    #[test]
    fn failed_write_keeps_previous_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path(), write_survey(dir.path()));
        run_survey(&config, &scorer(), None).unwrap();
        let first = fs::read(&config.output.response_path).unwrap();

        fs::remove_file(&config.output.entity_path).unwrap();
        fs::create_dir(&config.output.entity_path).unwrap();
        let mut s = scorer();
        s.documents.insert("I love this!".to_string(), 0.1);
        let err = run_survey(&config, &s, None).unwrap_err();
        assert!(matches!(*err, SurveyError::OutputIsDirectory { .. }));
        assert_eq!(fs::read(&config.output.response_path).unwrap(), first);
    }

    #[test]
    fn service_failure_skipped_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = run_config(dir.path(), write_survey(dir.path()));
        config.aggregate.failure_mode = FailureMode::SkipAndLog;
        let s = FixedScorer {
            failing: vec!["Acme support is slow".to_string()],
            ..scorer()
        };
        run_survey(&config, &s, None).unwrap();
        let responses = fs::read_to_string(&config.output.response_path).unwrap();
        assert_eq!(responses.lines().count(), 4);
        assert!(!responses.contains("Acme"));
    }

    #[test]
    fn missing_column_fails_before_scoring() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = run_config(dir.path(), write_survey(dir.path()));
        config.reshape.key_columns = vec!["Department".to_string()];
        let s = scorer();
        let err = run_survey(&config, &s, None).unwrap_err();
        assert!(matches!(*err, SurveyError::InvalidConfig { .. }));
        assert_eq!(s.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn limit_samples_the_first_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = run_config(dir.path(), write_survey(dir.path()));
        config.limit = Some(2);
        config.aggregate.compute_entity = false;
        let s = scorer();
        run_survey(&config, &s, None).unwrap();
        assert_eq!(s.calls.load(Ordering::SeqCst), 2);
        assert!(!config.output.entity_path.exists());
        let responses = fs::read_to_string(&config.output.response_path).unwrap();
        assert_eq!(responses.lines().count(), 3);
    }
}
