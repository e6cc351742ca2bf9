use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{
    parser::parse_nutrition_response, ExtractionError, NutritionExtractor, NutritionInfo,
    NUTRITION_PROMPT,
};
use crate::config::GeminiConfig;

/// Longest provider error text passed on to API clients.
const MAX_ERROR_MESSAGE_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Gemini `generateContent` client for meal photos.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(cfg: &GeminiConfig) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Network(e.to_string()))?;
        Ok(Self {
            client,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    /// Sends prompt + image and returns the concatenated text of the first candidate.
    async fn generate(&self, image: &[u8], mime_type: &str) -> Result<String, ExtractionError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: NUTRITION_PROMPT,
                    },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type,
                            data: Base64::encode_string(image),
                        },
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;

        if !status.is_success() {
            warn!(%status, body = %body, "gemini request failed");
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => ExtractionError::RateLimited,
                StatusCode::SERVICE_UNAVAILABLE => ExtractionError::Overloaded,
                _ => ExtractionError::Api {
                    status: status.as_u16(),
                    message: client_message(&body),
                },
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|_| ExtractionError::InvalidFormat)?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ExtractionError::InvalidFormat);
        }
        Ok(text)
    }
}

/// Provider error message, or a shortened body when it is not Gemini's error JSON.
fn client_message(body: &str) -> String {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    if message.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        return message;
    }
    let mut short: String = message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
    short.push_str("...");
    short
}

fn request_error(e: reqwest::Error) -> ExtractionError {
    if e.is_timeout() {
        ExtractionError::Timeout
    } else {
        ExtractionError::Network(e.to_string())
    }
}

#[async_trait]
impl NutritionExtractor for GeminiClient {
    #[instrument(skip(self, image), fields(bytes = image.len()))]
    async fn extract(
        &self,
        image: Bytes,
        mime_type: &str,
    ) -> Result<NutritionInfo, ExtractionError> {
        let text = self.generate(&image, mime_type).await?;
        debug!(response = %text, "gemini response");
        parse_nutrition_response(&text)
    }
}
