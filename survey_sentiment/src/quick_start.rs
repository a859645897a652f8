/*!

# Quick start with Google Forms

This example runs the whole pipeline on the answers of a Google Forms survey.

**Getting the answers** In the `Responses` tab of the form, use the `Create spreadsheet` option, then download
the spreadsheet in the **Excel format** (xlsx) or as a CSV file. The first row holds the questions, and every
following row holds the answers of one respondent:

| Timestamp        | Team  | What did you like?        | What should we improve? |
|------------------|-------|---------------------------|-------------------------|
| 2023/03/01 10:02 | Red   | I love the new dashboard! | Nothing                 |
| 2023/03/01 10:05 | Blue  |                           | The VPN is too slow     |

**Credentials** The scoring calls go to the Google Cloud Natural Language API. Export either an API key or an
OAuth access token for a project that has the API enabled:

```bash
export GOOGLE_API_KEY=...
# or
export GOOGLE_ACCESS_TOKEN=$(gcloud auth print-access-token)
```

**Running** Drop the columns that are not free text and keep the ones you want to filter by:

```bash
survsent -i 'survey.xlsx' --drop-column Timestamp --key-column Team --out output_data
```

Since there is no identifier column, each respondent receives a sequential id (`0`, `1`, ...) in a `uID` column.
Two files are written in `output_data`:

- `sentiment_by_response.csv`: one row per answer, with its sentiment score, magnitude and bucket
- `sentiment_by_entity.csv`: one row per named entity (person, organization, ...) found in an answer

Blank answers are left out. An answer without any named entity has no row in the entity table.

**Using the library** The same steps are available from Rust. Any backend implementing
[`SentimentScorer`](crate::SentimentScorer) can do the scoring:

```
use survey_sentiment::*;

struct Constant;

impl SentimentScorer for Constant {
    fn score_document(&self, _text: &str) -> Result<SentimentResult, ServiceError> {
        Ok(SentimentResult { score: 0.9, magnitude: 0.8 })
    }

    fn score_entities(&self, _text: &str) -> Result<Vec<EntityResult>, ServiceError> {
        Ok(vec![])
    }
}

let mut table = WideTable::new(vec!["Team".to_string(), "Q1".to_string()]);
table.push_row(vec![Some("Red".to_string()), Some("I love this!".to_string())]);

let config = ReshapeConfig {
    key_columns: vec!["Team".to_string()],
    ..ReshapeConfig::default()
};
let records = reshape(&table, &config)?;
let out = aggregate(&records, &AggregateOptions::DEFAULT_OPTIONS, &Constant)?;
assert_eq!(out.responses[0].bucket.label(), "Very Positive");
# Ok::<(), SentimentError>(())
```

*/
