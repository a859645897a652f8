//! Client for the Google Cloud Natural Language API.
//!
//! Only the two calls used for the survey are covered: `analyzeSentiment` and
//! `analyzeEntitySentiment`, with plain text documents encoded in UTF-8.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::survey::{config_reader::*, *};

#[derive(Serialize, Debug)]
struct Document<'a> {
    #[serde(rename = "type")]
    type_: &'a str,
    content: &'a str,
    language: &'a str,
}

#[derive(Serialize, Debug)]
struct AnalyzeRequest<'a> {
    document: Document<'a>,
    #[serde(rename = "encodingType")]
    encoding_type: &'a str,
}

// Fields holding default values are omitted from the JSON responses.
#[derive(Deserialize, Debug, Default, Clone, Copy)]
struct ApiSentiment {
    #[serde(default)]
    magnitude: f64,
    #[serde(default)]
    score: f64,
}

#[derive(Deserialize, Debug)]
struct AnalyzeSentimentResponse {
    #[serde(rename = "documentSentiment")]
    document_sentiment: Option<ApiSentiment>,
}

#[derive(Deserialize, Debug)]
struct ApiEntity {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    type_: String,
    #[serde(default)]
    salience: f64,
    #[serde(default)]
    sentiment: Option<ApiSentiment>,
}

#[derive(Deserialize, Debug)]
struct AnalyzeEntitySentimentResponse {
    #[serde(default)]
    entities: Vec<ApiEntity>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    error: ApiErrorDetails,
}

#[derive(Deserialize, Debug)]
struct ApiErrorDetails {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

pub struct GoogleLanguageClient {
    client: Client,
    endpoint: String,
    language: String,
    credential: Credential,
}

impl GoogleLanguageClient {
    pub fn new(
        settings: &ServiceSettings,
        credential: Credential,
    ) -> BSurveyResult<GoogleLanguageClient> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context(HttpClientSnafu {})?;
        Ok(GoogleLanguageClient {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            language: settings.language.clone(),
            credential,
        })
    }

    fn call(&self, method: &str, text: &str) -> Result<String, ServiceError> {
        let url = format!("{}/documents:{}", self.endpoint, method);
        let body = request_body(text, &self.language);
        let req = self.client.post(&url).json(&body);
        let req = match &self.credential {
            Credential::ApiKey(key) => req.query(&[("key", key)]),
            Credential::AccessToken(token) => req.bearer_auth(token),
        };

        let response = req.send().map_err(transport_error)?;
        let status = response.status();
        let content = response.text().map_err(transport_error)?;
        debug!("{}: status: {} content: {:?}", method, status, content);
        if !status.is_success() {
            return Err(ServiceError::Rejected {
                status: status.as_u16(),
                message: error_message(&content),
            });
        }
        Ok(content)
    }
}

impl SentimentScorer for GoogleLanguageClient {
    fn score_document(&self, text: &str) -> Result<SentimentResult, ServiceError> {
        let content = self.call("analyzeSentiment", text)?;
        parse_sentiment_response(&content)
    }

    fn score_entities(&self, text: &str) -> Result<Vec<EntityResult>, ServiceError> {
        let content = self.call("analyzeEntitySentiment", text)?;
        parse_entity_response(&content)
    }
}

fn request_body<'a>(text: &'a str, language: &'a str) -> AnalyzeRequest<'a> {
    AnalyzeRequest {
        document: Document {
            type_: "PLAIN_TEXT",
            content: text,
            language,
        },
        encoding_type: "UTF8",
    }
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout {}
    } else {
        ServiceError::Transport {
            message: e.to_string(),
        }
    }
}

fn malformed(e: serde_json::Error) -> ServiceError {
    ServiceError::Malformed {
        message: e.to_string(),
    }
}

// The API reports failures as {"error": {"code", "message", "status"}}.
fn error_message(content: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(content) {
        Ok(body) => format!("{} {}", body.error.status, body.error.message)
            .trim()
            .to_string(),
        Err(_) => content.chars().take(200).collect(),
    }
}

fn parse_sentiment_response(content: &str) -> Result<SentimentResult, ServiceError> {
    let res: AnalyzeSentimentResponse = serde_json::from_str(content).map_err(malformed)?;
    let s = res
        .document_sentiment
        .ok_or_else(|| ServiceError::Malformed {
            message: "missing documentSentiment".to_string(),
        })?;
    Ok(SentimentResult {
        score: s.score,
        magnitude: s.magnitude,
    })
}

fn parse_entity_response(content: &str) -> Result<Vec<EntityResult>, ServiceError> {
    let res: AnalyzeEntitySentimentResponse =
        serde_json::from_str(content).map_err(malformed)?;
    Ok(res
        .entities
        .into_iter()
        .map(|e| {
            let sentiment = e.sentiment.unwrap_or_default();
            EntityResult {
                name: e.name,
                entity_type: EntityType::from_api_name(&e.type_),
                salience: e.salience,
                sentiment_score: sentiment.score,
                sentiment_magnitude: sentiment.magnitude,
            }
        })
        .collect())
}
