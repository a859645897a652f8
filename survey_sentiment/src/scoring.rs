use log::{debug, warn};
use std::time::Duration;

use crate::config::*;

/// A backend able to score a piece of text.
///
/// Both calls must behave as pure functions of the text. Retries are not
/// expected from implementations: wrap them in [`Retrying`] instead.
pub trait SentimentScorer: Sync {
    /// The sentiment of the whole text.
    fn score_document(&self, text: &str) -> Result<SentimentResult, ServiceError>;

    /// The sentiment towards each named entity of the text. Texts without
    /// entities give an empty list.
    fn score_entities(&self, text: &str) -> Result<Vec<EntityResult>, ServiceError>;
}

impl<S: SentimentScorer + ?Sized> SentimentScorer for &S {
    fn score_document(&self, text: &str) -> Result<SentimentResult, ServiceError> {
        (**self).score_document(text)
    }

    fn score_entities(&self, text: &str) -> Result<Vec<EntityResult>, ServiceError> {
        (**self).score_entities(text)
    }
}

impl<S: SentimentScorer + ?Sized> SentimentScorer for Box<S> {
    fn score_document(&self, text: &str) -> Result<SentimentResult, ServiceError> {
        (**self).score_document(text)
    }

    fn score_entities(&self, text: &str) -> Result<Vec<EntityResult>, ServiceError> {
        (**self).score_entities(text)
    }
}

/// Checks the ranges promised by the service.
pub fn check_sentiment(res: &SentimentResult) -> Result<(), ServiceError> {
    if !(-1.0..=1.0).contains(&res.score) {
        return MalformedSnafu {
            message: format!("score {} outside of [-1, 1]", res.score),
        }
        .fail();
    }
    if res.magnitude.is_nan() || res.magnitude < 0.0 {
        return MalformedSnafu {
            message: format!("negative magnitude {}", res.magnitude),
        }
        .fail();
    }
    Ok(())
}

pub fn check_entity(entity: &EntityResult) -> Result<(), ServiceError> {
    check_sentiment(&SentimentResult {
        score: entity.sentiment_score,
        magnitude: entity.sentiment_magnitude,
    })?;
    if !(0.0..=1.0).contains(&entity.salience) {
        return MalformedSnafu {
            message: format!(
                "salience {} of entity {:?} outside of [0, 1]",
                entity.salience, entity.name
            ),
        }
        .fail();
    }
    Ok(())
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Wait before the first retry, doubled for every following one.
    pub base_delay: Duration,
    /// Upper bound of a single wait.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const NO_RETRY: RetryPolicy = RetryPolicy {
        max_retries: 0,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    };

    pub const MAX_RETRIES: u32 = 10;
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

    fn delay(&self, retry: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        1u32.checked_shl(retry)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// The longest total wait of one call, over all its retries.
    pub fn max_total_delay(&self) -> Duration {
        (0..self.max_retries).fold(Duration::ZERO, |acc, retry| {
            acc.saturating_add(self.delay(retry))
        })
    }
}

/// Retries the transient failures of another scorer with exponential backoff.
///
/// The last error is returned once the retries are exhausted. Other errors
/// are returned immediately.
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: SentimentScorer> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Retrying<S> {
        Retrying { inner, policy }
    }

    fn call<T>(
        &self,
        what: &str,
        f: impl Fn() -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut retry: u32 = 0;
        loop {
            match f() {
                Ok(x) => return Ok(x),
                Err(e) if e.is_transient() && retry < self.policy.max_retries => {
                    let delay = self.policy.delay(retry);
                    retry += 1;
                    warn!(
                        "{}: attempt {} failed ({}), retrying in {:?}",
                        what, retry, e, delay
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    debug!("{}: giving up after {} retries: {}", what, retry, e);
                    return Err(e);
                }
            }
        }
    }
}

impl<S: SentimentScorer> SentimentScorer for Retrying<S> {
    fn score_document(&self, text: &str) -> Result<SentimentResult, ServiceError> {
        self.call("score_document", || self.inner.score_document(text))
    }

    fn score_entities(&self, text: &str) -> Result<Vec<EntityResult>, ServiceError> {
        self.call("score_entities", || self.inner.score_entities(text))
    }
}
