use clap::Parser;

/// This program scores the sentiment of the free-text answers of a survey.
#[derive(Parser, Debug, Clone, Default)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file describing the survey and the analysis. The other options
    /// override the values of this file.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, optional) A reference file for the response table in CSV format. If provided, survsent
    /// will check that the computed table matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (directory path) The directory in which the output tables are written.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) The survey data, with one row per respondent and one column per question.
    /// Setting this option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (csv or excel, default inferred from the file extension) The type of the input.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// When using a spreadsheet, indicates the name of the worksheet to use.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    /// (column name) The column identifying each respondent. If not provided, the respondents are
    /// numbered from 0 in the order of the rows.
    #[clap(long, value_parser)]
    pub id_column: Option<String>,

    /// (column name, repeated) Columns attached to every answer of a respondent, so that the output
    /// can be filtered by them (for instance a team or a grade).
    #[clap(long, value_parser)]
    pub key_column: Vec<String>,

    /// (column name, repeated) Columns ignored by the analysis.
    #[clap(long, value_parser)]
    pub drop_column: Vec<String>,

    /// (three or five, default five) The number of sentiment buckets.
    #[clap(long, value_parser)]
    pub bucket_scheme: Option<String>,

    /// If passed as an argument, the sentiment of each answer is not computed.
    #[clap(long, takes_value = false)]
    pub no_overall: bool,

    /// If passed as an argument, the sentiment of the named entities is not computed.
    #[clap(long, takes_value = false)]
    pub no_entity: bool,

    /// (number) Only scores the first answers. Useful to check a setup without paying for all the calls.
    #[clap(long, value_parser)]
    pub limit: Option<usize>,

    /// (number, default 4) The maximum number of concurrent calls to the scoring service.
    #[clap(long, value_parser)]
    pub workers: Option<usize>,

    /// If passed as an argument, answers that cannot be scored are logged and left out instead of
    /// stopping the program.
    #[clap(long, takes_value = false)]
    pub skip_failures: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
