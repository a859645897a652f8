// ********* Input data structures ***********

use snafu::Snafu;
use std::fmt::Display;
use std::str::FromStr;

/// A survey as it was collected: one row per respondent, one column per question.
///
/// Cells are `None` when the respondent left them blank.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct WideTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl WideTable {
    pub fn new(header: Vec<String>) -> WideTable {
        WideTable {
            header,
            rows: Vec::new(),
        }
    }

    /// Appends a row. Short rows are padded with blank cells.
    pub fn push_row(&mut self, mut row: Vec<Option<String>>) {
        if row.len() < self.header.len() {
            row.resize(self.header.len(), None);
        }
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }
}

/// One answer to one question, with the identity of its respondent.
#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub struct LongRecord {
    pub unique_id: String,
    /// The values of the key columns, in the order of the configuration.
    pub slicer_values: Vec<(String, String)>,
    pub question: String,
    pub response: String,
}

/// How the wide table gets melted.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct ReshapeConfig {
    /// The column identifying a respondent. Synthetic sequential ids are
    /// assigned when missing.
    pub unique_id_column: Option<String>,
    pub key_columns: Vec<String>,
    pub drop_columns: Vec<String>,
}

impl ReshapeConfig {
    /// The name of the identifier when no column provides it.
    pub const SYNTHETIC_ID_COLUMN: &'static str = "uID";

    /// Names of the generated output columns. The identifier and the key
    /// columns cannot use them.
    pub const RESERVED_COLUMNS: [&'static str; 8] = [
        "Question",
        "Response",
        "Sentiment",
        "Magnitude",
        "Sentiment Buckets",
        "Entity",
        "Type",
        "Salience",
    ];

    pub fn id_column_name(&self) -> &str {
        self.unique_id_column
            .as_deref()
            .unwrap_or(ReshapeConfig::SYNTHETIC_ID_COLUMN)
    }
}

// ******** Scoring results *********

/// Document-level sentiment.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct SentimentResult {
    /// In [-1, 1]
    pub score: f64,
    /// Non-negative, unbounded
    pub magnitude: f64,
}

/// The categories of named entities reported by the scoring service.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum EntityType {
    Unknown,
    Person,
    Location,
    Organization,
    Event,
    WorkOfArt,
    ConsumerGood,
    Other,
    PhoneNumber,
    Address,
    Date,
    Number,
    Price,
}

impl EntityType {
    /// Parses the upper case names used by the service. Anything else is `Unknown`.
    pub fn from_api_name(name: &str) -> EntityType {
        match name {
            "PERSON" => EntityType::Person,
            "LOCATION" => EntityType::Location,
            "ORGANIZATION" => EntityType::Organization,
            "EVENT" => EntityType::Event,
            "WORK_OF_ART" => EntityType::WorkOfArt,
            "CONSUMER_GOOD" => EntityType::ConsumerGood,
            "OTHER" => EntityType::Other,
            "PHONE_NUMBER" => EntityType::PhoneNumber,
            "ADDRESS" => EntityType::Address,
            "DATE" => EntityType::Date,
            "NUMBER" => EntityType::Number,
            "PRICE" => EntityType::Price,
            _ => EntityType::Unknown,
        }
    }

    pub fn api_name(&self) -> &'static str {
        match self {
            EntityType::Unknown => "UNKNOWN",
            EntityType::Person => "PERSON",
            EntityType::Location => "LOCATION",
            EntityType::Organization => "ORGANIZATION",
            EntityType::Event => "EVENT",
            EntityType::WorkOfArt => "WORK_OF_ART",
            EntityType::ConsumerGood => "CONSUMER_GOOD",
            EntityType::Other => "OTHER",
            EntityType::PhoneNumber => "PHONE_NUMBER",
            EntityType::Address => "ADDRESS",
            EntityType::Date => "DATE",
            EntityType::Number => "NUMBER",
            EntityType::Price => "PRICE",
        }
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.api_name())
    }
}

/// Sentiment expressed towards one named entity of a response.
#[derive(PartialEq, Debug, Clone)]
pub struct EntityResult {
    pub name: String,
    pub entity_type: EntityType,
    /// In [0, 1]
    pub salience: f64,
    pub sentiment_score: f64,
    pub sentiment_magnitude: f64,
}

// ******** Output data structures *********

/// The categorical label attached to a sentiment score.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum SentimentBucket {
    VeryNegative,
    Negative,
    Neutral,
    Positive,
    VeryPositive,
}

impl SentimentBucket {
    pub fn label(&self) -> &'static str {
        match self {
            SentimentBucket::VeryNegative => "Very Negative",
            SentimentBucket::Negative => "Negative",
            SentimentBucket::Neutral => "Neutral",
            SentimentBucket::Positive => "Positive",
            SentimentBucket::VeryPositive => "Very Positive",
        }
    }
}

impl Display for SentimentBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct ResponseSentimentRow {
    pub record: LongRecord,
    pub sentiment: SentimentResult,
    pub bucket: SentimentBucket,
}

#[derive(PartialEq, Debug, Clone)]
pub struct EntitySentimentRow {
    pub record: LongRecord,
    pub entity: EntityResult,
    pub bucket: SentimentBucket,
}

/// A record left out of the tables because its scoring failed in skip mode.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct SkippedRecord {
    pub index: usize,
    pub unique_id: String,
    pub question: String,
    pub reason: String,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct AggregateOutput {
    pub responses: Vec<ResponseSentimentRow>,
    pub entities: Vec<EntitySentimentRow>,
    pub skipped: Vec<SkippedRecord>,
}

// ********* Configuration **********

/// The partition of [-1, 1] used to label the scores.
///
/// - Five: [-1,-0.6) [-0.6,-0.2) [-0.2,0.2) [0.2,0.6) [0.6,1]
/// - Three: [-1,-0.25) [-0.25,0.25) [0.25,1]
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum BucketScheme {
    Three,
    Five,
}

impl FromStr for BucketScheme {
    type Err = SentimentError;

    fn from_str(s: &str) -> Result<BucketScheme, SentimentError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "three" | "3" => Ok(BucketScheme::Three),
            "five" | "5" => Ok(BucketScheme::Five),
            _ => UnknownBucketSchemeSnafu { scheme: s }.fail(),
        }
    }
}

/// What happens to the run when scoring one record fails.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum FailureMode {
    /// The whole aggregation fails with the first error.
    Abort,
    /// The record is logged, reported in `AggregateOutput::skipped` and left out.
    SkipAndLog,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AggregateOptions {
    pub compute_overall: bool,
    pub compute_entity: bool,
    pub bucket_scheme: BucketScheme,
    pub failure_mode: FailureMode,
    /// Maximum number of scoring calls in flight.
    pub workers: usize,
}

impl AggregateOptions {
    pub const DEFAULT_OPTIONS: AggregateOptions = AggregateOptions {
        compute_overall: true,
        compute_entity: true,
        bucket_scheme: BucketScheme::Five,
        failure_mode: FailureMode::Abort,
        workers: 4,
    };
}

// ********* Errors **********

/// Failure of a call to the scoring service.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum ServiceError {
    #[snafu(display("transport failure: {message}"))]
    Transport { message: String },
    #[snafu(display("request timed out"))]
    Timeout {},
    #[snafu(display("request rejected with status {status}: {message}"))]
    Rejected { status: u16, message: String },
    #[snafu(display("malformed response: {message}"))]
    Malformed { message: String },
}

impl ServiceError {
    /// Whether trying again later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Transport { .. } | ServiceError::Timeout {} => true,
            ServiceError::Rejected { status, .. } => *status == 429 || *status >= 500,
            ServiceError::Malformed { .. } => false,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ErrorKind {
    Config,
    Service,
    Data,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SentimentError {
    #[snafu(display("Column {column:?} not found in the header"))]
    MissingColumn { column: String },
    #[snafu(display("Column {column:?} appears more than once in the header"))]
    DuplicateColumn { column: String },
    #[snafu(display("Column {column:?} cannot be both kept and dropped"))]
    ConflictingColumns { column: String },
    #[snafu(display("Column {column:?} clashes with a generated column: rename it or drop it"))]
    ReservedColumn { column: String },
    #[snafu(display("Unknown bucket scheme {scheme:?}, expected 'three' or 'five'"))]
    UnknownBucketScheme { scheme: String },
    #[snafu(display("The number of workers must be positive"))]
    InvalidWorkers {},
    #[snafu(display("Neither the overall nor the entity sentiment was requested"))]
    NothingToCompute {},
    #[snafu(display("Could not start the worker pool"))]
    WorkerPool { source: rayon::ThreadPoolBuildError },
    #[snafu(display("Scoring failed for respondent {unique_id:?}, question {question:?}"))]
    Scoring {
        unique_id: String,
        question: String,
        source: ServiceError,
    },
    #[snafu(display("Empty response for respondent {unique_id:?}, question {question:?}"))]
    EmptyResponse { unique_id: String, question: String },
}

impl SentimentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SentimentError::Scoring { .. } => ErrorKind::Service,
            SentimentError::EmptyResponse { .. } => ErrorKind::Data,
            _ => ErrorKind::Config,
        }
    }
}

pub type SResult<T> = Result<T, SentimentError>;
