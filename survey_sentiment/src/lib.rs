mod config;
pub mod quick_start;
pub mod reshape;
pub mod scoring;

use log::{debug, info, warn};
use rayon::prelude::*;
use snafu::prelude::*;

pub use crate::config::*;
pub use crate::reshape::{plan, reshape, ReshapePlan};
pub use crate::scoring::{RetryPolicy, Retrying, SentimentScorer};

impl BucketScheme {
    /// Maps a score to its bucket.
    ///
    /// The intervals are closed on the left and open on the right, except for
    /// the last one which includes 1. Scores outside of [-1, 1] go to the
    /// closest extreme bucket.
    pub fn bucket(&self, score: f64) -> SentimentBucket {
        match self {
            BucketScheme::Five => {
                if score < -0.6 {
                    SentimentBucket::VeryNegative
                } else if score < -0.2 {
                    SentimentBucket::Negative
                } else if score < 0.2 {
                    SentimentBucket::Neutral
                } else if score < 0.6 {
                    SentimentBucket::Positive
                } else {
                    SentimentBucket::VeryPositive
                }
            }
            BucketScheme::Three => {
                if score < -0.25 {
                    SentimentBucket::Negative
                } else if score < 0.25 {
                    SentimentBucket::Neutral
                } else {
                    SentimentBucket::Positive
                }
            }
        }
    }
}

impl AggregateOptions {
    /// Rejects the options that cannot produce any output.
    pub fn validate(&self) -> SResult<()> {
        ensure!(self.workers > 0, InvalidWorkersSnafu {});
        ensure!(
            self.compute_overall || self.compute_entity,
            NothingToComputeSnafu {}
        );
        Ok(())
    }
}

// The scoring outcome of one record.
struct RecordScores {
    document: Option<SentimentResult>,
    entities: Vec<EntityResult>,
}

fn score_record(
    record: &LongRecord,
    options: &AggregateOptions,
    scorer: &dyn SentimentScorer,
) -> SResult<RecordScores> {
    let context = || ScoringSnafu {
        unique_id: record.unique_id.clone(),
        question: record.question.clone(),
    };

    let document = if options.compute_overall {
        let res = scorer
            .score_document(&record.response)
            .and_then(|res| scoring::check_sentiment(&res).map(|_| res))
            .context(context())?;
        Some(res)
    } else {
        None
    };

    let entities = if options.compute_entity {
        scorer
            .score_entities(&record.response)
            .and_then(|res| {
                for entity in res.iter() {
                    scoring::check_entity(entity)?;
                }
                Ok(res)
            })
            .context(context())?
    } else {
        Vec::new()
    };

    debug!(
        "score_record: {:?} {:?}: document: {:?} entities: {}",
        record.unique_id,
        record.question,
        document,
        entities.len()
    );
    Ok(RecordScores { document, entities })
}

/// Scores all the records and assembles the response and the entity tables.
///
/// The scoring calls run on a pool of `options.workers` threads. The rows of
/// both tables follow the order of the records, whatever the completion
/// order of the calls. A record without entities adds no row to the entity
/// table.
///
/// All the records are checked before the first call: a blank response is a
/// data error. Scoring failures end the aggregation unless the failure mode
/// is `SkipAndLog`.
pub fn aggregate(
    records: &[LongRecord],
    options: &AggregateOptions,
    scorer: &dyn SentimentScorer,
) -> SResult<AggregateOutput> {
    options.validate()?;
    for record in records.iter() {
        ensure!(
            !record.response.trim().is_empty(),
            EmptyResponseSnafu {
                unique_id: record.unique_id.clone(),
                question: record.question.clone(),
            }
        );
    }

    info!(
        "aggregate: scoring {} records with {} workers (overall: {}, entity: {})",
        records.len(),
        options.workers,
        options.compute_overall,
        options.compute_entity
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers)
        .build()
        .context(WorkerPoolSnafu {})?;

    // Indexed collection: the results are in the order of the records.
    let scored: Vec<(usize, RecordScores)> = match options.failure_mode {
        FailureMode::Abort => pool.install(|| {
            records
                .par_iter()
                .enumerate()
                .map(|(idx, record)| score_record(record, options, scorer).map(|s| (idx, s)))
                .collect::<SResult<Vec<_>>>()
        })?,
        FailureMode::SkipAndLog => {
            let attempts: Vec<SResult<RecordScores>> = pool.install(|| {
                records
                    .par_iter()
                    .map(|record| score_record(record, options, scorer))
                    .collect()
            });
            let mut res = Vec::new();
            let mut skipped = Vec::new();
            for (idx, attempt) in attempts.into_iter().enumerate() {
                match attempt {
                    Ok(s) => res.push((idx, s)),
                    Err(e) => {
                        warn!("aggregate: skipping record {}: {}", idx, error_chain(&e));
                        skipped.push(SkippedRecord {
                            index: idx,
                            unique_id: records[idx].unique_id.clone(),
                            question: records[idx].question.clone(),
                            reason: error_chain(&e),
                        });
                    }
                }
            }
            return Ok(assemble(records, options, res, skipped));
        }
    };

    Ok(assemble(records, options, scored, Vec::new()))
}

fn assemble(
    records: &[LongRecord],
    options: &AggregateOptions,
    scored: Vec<(usize, RecordScores)>,
    skipped: Vec<SkippedRecord>,
) -> AggregateOutput {
    let mut responses: Vec<ResponseSentimentRow> = Vec::new();
    let mut entities: Vec<EntitySentimentRow> = Vec::new();
    for (idx, scores) in scored {
        let record = &records[idx];
        if let Some(sentiment) = scores.document {
            responses.push(ResponseSentimentRow {
                record: record.clone(),
                sentiment,
                bucket: options.bucket_scheme.bucket(sentiment.score),
            });
        }
        for entity in scores.entities {
            let bucket = options.bucket_scheme.bucket(entity.sentiment_score);
            entities.push(EntitySentimentRow {
                record: record.clone(),
                entity,
                bucket,
            });
        }
    }
    info!(
        "aggregate: {} response rows, {} entity rows, {} skipped records",
        responses.len(),
        entities.len(),
        skipped.len()
    );
    AggregateOutput {
        responses,
        entities,
        skipped,
    }
}

/// The error message followed by the messages of its sources.
pub fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        msg.push_str(": ");
        msg.push_str(&s.to_string());
        source = s.source();
    }
    msg
}
