use crate::args::Args;
use crate::survey::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://language.googleapis.com/v1";

/// Upper bound accepted for `retryMaxDelayMs`.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct SurveyConfig {
    #[serde(rename = "sourcePath")]
    pub source_path: Option<String>,
    #[serde(rename = "inputType")]
    pub input_type: Option<String>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
    #[serde(rename = "uniqueIdColumn")]
    pub unique_id_column: Option<String>,
    #[serde(rename = "keyColumns", default)]
    pub key_columns: Vec<String>,
    #[serde(rename = "dropColumns", default)]
    pub drop_columns: Vec<String>,
    #[serde(rename = "computeOverall")]
    pub compute_overall: Option<bool>,
    #[serde(rename = "computeEntity")]
    pub compute_entity: Option<bool>,
    #[serde(rename = "bucketScheme")]
    pub bucket_scheme: Option<String>,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "responseOutput")]
    pub response_output: Option<String>,
    #[serde(rename = "entityOutput")]
    pub entity_output: Option<String>,
    #[serde(rename = "pivotedOutput")]
    pub pivoted_output: Option<String>,
    pub limit: Option<usize>,
    pub language: Option<String>,
    pub workers: Option<usize>,
    #[serde(rename = "timeoutSeconds")]
    pub timeout_seconds: Option<u64>,
    #[serde(rename = "maxRetries")]
    pub max_retries: Option<u32>,
    #[serde(rename = "retryBaseDelayMs")]
    pub retry_base_delay_ms: Option<u64>,
    #[serde(rename = "retryMaxDelayMs")]
    pub retry_max_delay_ms: Option<u64>,
    #[serde(rename = "skipFailures")]
    pub skip_failures: Option<bool>,
    pub endpoint: Option<String>,
    #[serde(rename = "apiKeyEnv")]
    pub api_key_env: Option<String>,
    #[serde(rename = "accessTokenEnv")]
    pub access_token_env: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum InputType {
    Csv,
    Excel,
}

/// Where the scoring client finds its credentials.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Credential {
    ApiKey(String),
    AccessToken(String),
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ServiceSettings {
    pub endpoint: String,
    pub language: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub api_key_env: String,
    pub access_token_env: String,
}

impl ServiceSettings {
    /// Reads the credential from the environment.
    pub fn credential(&self) -> BSurveyResult<Credential> {
        let lookup = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        if let Some(key) = lookup(&self.api_key_env) {
            Ok(Credential::ApiKey(key))
        } else if let Some(token) = lookup(&self.access_token_env) {
            Ok(Credential::AccessToken(token))
        } else {
            Err(Box::new(SurveyError::MissingCredential {
                api_key_env: self.api_key_env.clone(),
                access_token_env: self.access_token_env.clone(),
            }))
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct OutputSettings {
    pub response_path: PathBuf,
    pub entity_path: PathBuf,
    pub pivoted_path: Option<PathBuf>,
}

/// The configuration of a run, validated once before any row gets scored.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RunConfig {
    pub source_path: PathBuf,
    pub input_type: InputType,
    pub excel_worksheet_name: Option<String>,
    pub reshape: ReshapeConfig,
    pub aggregate: AggregateOptions,
    pub limit: Option<usize>,
    pub service: ServiceSettings,
    pub output: OutputSettings,
}

/// Reads a config file. Its relative paths are resolved against its directory.
pub fn read_config(path: &str) -> BSurveyResult<SurveyConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read_config: {:?}", contents);
    let config: SurveyConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    let root = Path::new(path).parent().context(MissingParentDirSnafu {})?;
    Ok(resolve_paths(config, root))
}

pub fn resolve_paths(config: SurveyConfig, root: &Path) -> SurveyConfig {
    let resolve = |p: &str| -> String {
        if Path::new(p).is_relative() {
            root.join(p).display().to_string()
        } else {
            p.to_string()
        }
    };
    SurveyConfig {
        source_path: config.source_path.as_deref().map(resolve),
        output_directory: Some(resolve(config.output_directory.as_deref().unwrap_or("."))),
        ..config
    }
}

/// The values given on the command line override the ones of the file.
pub fn merge_args(config: SurveyConfig, args: &Args) -> SurveyConfig {
    let mut res = config;
    if args.input.is_some() {
        res.source_path = args.input.clone();
    }
    if args.input_type.is_some() {
        res.input_type = args.input_type.clone();
    }
    if args.excel_worksheet_name.is_some() {
        res.excel_worksheet_name = args.excel_worksheet_name.clone();
    }
    if args.id_column.is_some() {
        res.unique_id_column = args.id_column.clone();
    }
    if !args.key_column.is_empty() {
        res.key_columns = args.key_column.clone();
    }
    if !args.drop_column.is_empty() {
        res.drop_columns = args.drop_column.clone();
    }
    if args.bucket_scheme.is_some() {
        res.bucket_scheme = args.bucket_scheme.clone();
    }
    if args.no_overall {
        res.compute_overall = Some(false);
    }
    if args.no_entity {
        res.compute_entity = Some(false);
    }
    if args.limit.is_some() {
        res.limit = args.limit;
    }
    if args.workers.is_some() {
        res.workers = args.workers;
    }
    if args.skip_failures {
        res.skip_failures = Some(true);
    }
    if args.out.is_some() {
        res.output_directory = args.out.clone();
    }
    res
}

fn infer_input_type(declared: &Option<String>, path: &Path) -> BSurveyResult<InputType> {
    if let Some(t) = declared {
        return match t.to_ascii_lowercase().as_str() {
            "csv" => Ok(InputType::Csv),
            "excel" | "xlsx" | "xls" | "ods" => Ok(InputType::Excel),
            _ => Err(Box::new(SurveyError::UnknownInputType {
                input_type: t.clone(),
            })),
        };
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("csv") | Some("txt") => Ok(InputType::Csv),
        Some("xlsx") | Some("xlsm") | Some("xlsb") | Some("xls") | Some("ods") => {
            Ok(InputType::Excel)
        }
        _ => Err(Box::new(SurveyError::UnknownInputType {
            input_type: path.display().to_string(),
        })),
    }
}

/// Checks all the options and fills in the defaults.
pub fn validate_config(config: &SurveyConfig) -> BSurveyResult<RunConfig> {
    let source = config
        .source_path
        .as_deref()
        .context(MissingSourceSnafu {})?;
    let source_path = PathBuf::from(source);
    let input_type = infer_input_type(&config.input_type, &source_path)?;

    let bucket_scheme = match &config.bucket_scheme {
        Some(s) => s.parse::<BucketScheme>().context(InvalidConfigSnafu {})?,
        None => BucketScheme::Five,
    };

    let failure_mode = if config.skip_failures.unwrap_or(false) {
        FailureMode::SkipAndLog
    } else {
        FailureMode::Abort
    };

    let aggregate = AggregateOptions {
        compute_overall: config.compute_overall.unwrap_or(true),
        compute_entity: config.compute_entity.unwrap_or(true),
        bucket_scheme,
        failure_mode,
        workers: config
            .workers
            .unwrap_or(AggregateOptions::DEFAULT_OPTIONS.workers),
    };
    aggregate.validate().context(InvalidConfigSnafu {})?;

    let reshape = ReshapeConfig {
        unique_id_column: config.unique_id_column.clone(),
        key_columns: config.key_columns.clone(),
        drop_columns: config.drop_columns.clone(),
    };

    let service = ServiceSettings {
        endpoint: config
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        language: config.language.clone().unwrap_or_else(|| "en".to_string()),
        timeout: Duration::from_secs(config.timeout_seconds.unwrap_or(30)),
        retry: RetryPolicy {
            max_retries: config.max_retries.unwrap_or(3),
            base_delay: Duration::from_millis(config.retry_base_delay_ms.unwrap_or(500)),
            max_delay: config
                .retry_max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(RetryPolicy::DEFAULT_MAX_DELAY),
        },
        api_key_env: config
            .api_key_env
            .clone()
            .unwrap_or_else(|| "GOOGLE_API_KEY".to_string()),
        access_token_env: config
            .access_token_env
            .clone()
            .unwrap_or_else(|| "GOOGLE_ACCESS_TOKEN".to_string()),
    };
    ensure!(!service.timeout.is_zero(), InvalidTimeoutSnafu {});
    ensure!(
        service.retry.max_retries <= RetryPolicy::MAX_RETRIES,
        InvalidRetriesSnafu {
            max_retries: service.retry.max_retries,
            limit: RetryPolicy::MAX_RETRIES,
        }
    );
    ensure!(
        service.retry.max_delay <= MAX_RETRY_DELAY,
        InvalidRetryDelaySnafu {
            max_delay: service.retry.max_delay,
            limit: MAX_RETRY_DELAY,
        }
    );

    let out_dir = PathBuf::from(config.output_directory.as_deref().unwrap_or("."));
    let output = OutputSettings {
        response_path: out_dir.join(
            config
                .response_output
                .as_deref()
                .unwrap_or("sentiment_by_response.csv"),
        ),
        entity_path: out_dir.join(
            config
                .entity_output
                .as_deref()
                .unwrap_or("sentiment_by_entity.csv"),
        ),
        pivoted_path: config.pivoted_output.as_ref().map(|p| out_dir.join(p)),
    };

    Ok(RunConfig {
        source_path,
        input_type,
        excel_worksheet_name: config.excel_worksheet_name.clone(),
        reshape,
        aggregate,
        limit: config.limit,
        service,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SurveyConfig {
        SurveyConfig {
            source_path: Some("input_data/survey.xlsx".to_string()),
            ..SurveyConfig::default()
        }
    }

    #[test]
    fn parses_camel_case_keys() {
        let js = r#"{
            "sourcePath": "input.csv",
            "uniqueIdColumn": "Email",
            "keyColumns": ["Team", "Grade"],
            "bucketScheme": "three",
            "computeEntity": false,
            "workers": 2
        }"#;
        let config: SurveyConfig = serde_json::from_str(js).unwrap();
        assert_eq!(config.unique_id_column.as_deref(), Some("Email"));
        assert_eq!(config.key_columns, vec!["Team", "Grade"]);
        assert!(config.drop_columns.is_empty());

        let rc = validate_config(&resolve_paths(config, Path::new("/data/survey"))).unwrap();
        assert_eq!(rc.source_path, PathBuf::from("/data/survey/input.csv"));
        assert_eq!(rc.input_type, InputType::Csv);
        assert_eq!(rc.aggregate.bucket_scheme, BucketScheme::Three);
        assert!(rc.aggregate.compute_overall);
        assert!(!rc.aggregate.compute_entity);
        assert_eq!(rc.aggregate.workers, 2);
        assert_eq!(
            rc.output.response_path,
            PathBuf::from("/data/survey/sentiment_by_response.csv")
        );
    }

    #[test]
    fn defaults() {
        let rc = validate_config(&base()).unwrap();
        assert_eq!(rc.input_type, InputType::Excel);
        assert_eq!(rc.aggregate, AggregateOptions::DEFAULT_OPTIONS);
        assert_eq!(rc.reshape, ReshapeConfig::default());
        assert_eq!(rc.service.language, "en");
        assert_eq!(rc.service.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(rc.service.retry.max_retries, 3);
        assert_eq!(rc.limit, None);
        assert_eq!(rc.output.pivoted_path, None);
    }

    #[test]
    fn unknown_bucket_scheme_is_rejected() {
        let config = SurveyConfig {
            bucket_scheme: Some("seven".to_string()),
            ..base()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(*err, SurveyError::InvalidConfig { .. }));
    }

    #[test]
    fn nothing_to_compute_is_rejected() {
        let config = SurveyConfig {
            compute_overall: Some(false),
            compute_entity: Some(false),
            ..base()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn retries_are_bounded() {
        let rc = validate_config(&SurveyConfig {
            max_retries: Some(RetryPolicy::MAX_RETRIES),
            retry_base_delay_ms: Some(60_000),
            ..base()
        })
        .unwrap();
        assert_eq!(rc.service.retry.max_delay, RetryPolicy::DEFAULT_MAX_DELAY);
        assert!(rc.service.retry.max_total_delay() <= std::time::Duration::from_secs(300));

        let err = validate_config(&SurveyConfig {
            max_retries: Some(40),
            ..base()
        })
        .unwrap_err();
        assert!(matches!(*err, SurveyError::InvalidRetries { max_retries: 40, .. }));
        let err = validate_config(&SurveyConfig {
            retry_max_delay_ms: Some(u64::MAX),
            ..base()
        })
        .unwrap_err();
        assert!(matches!(*err, SurveyError::InvalidRetryDelay { .. }));
    }

    #[test]
    fn missing_source_is_rejected() {
        let err = validate_config(&SurveyConfig::default()).unwrap_err();
        assert!(matches!(*err, SurveyError::MissingSource {}));
    }

    #[test]
    fn unknown_input_type_is_rejected() {
        let config = SurveyConfig {
            source_path: Some("survey.json".to_string()),
            ..SurveyConfig::default()
        };
        assert!(validate_config(&config).is_err());
        let config = SurveyConfig {
            source_path: Some("survey.json".to_string()),
            input_type: Some("CSV".to_string()),
            ..SurveyConfig::default()
        };
        assert_eq!(
            validate_config(&config).unwrap().input_type,
            InputType::Csv
        );
    }

    #[test]
    fn arguments_override_the_file() {
        let args = Args {
            input: Some("other.csv".to_string()),
            key_column: vec!["Team".to_string()],
            no_entity: true,
            skip_failures: true,
            workers: Some(8),
            ..Args::default()
        };
        let config = SurveyConfig {
            key_columns: vec!["Grade".to_string()],
            ..base()
        };
        let rc = validate_config(&merge_args(config, &args)).unwrap();
        assert_eq!(rc.source_path, PathBuf::from("other.csv"));
        assert_eq!(rc.reshape.key_columns, vec!["Team"]);
        assert!(!rc.aggregate.compute_entity);
        assert_eq!(rc.aggregate.failure_mode, FailureMode::SkipAndLog);
        assert_eq!(rc.aggregate.workers, 8);
    }
}
