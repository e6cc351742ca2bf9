use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use thiserror::Error;

pub mod gemini;
pub mod model;
pub mod parser;

pub use model::{MacroSummary, MacroTargets, NutritionInfo};

/// Instruction sent alongside every meal photo.
pub const NUTRITION_PROMPT: &str = "You are a nutritionist analyzing this food image. \
Provide ONLY a valid JSON object with these exact numeric keys: calories, protein, carbs, fat (all as numbers). \
Example: {\"calories\": 300, \"protein\": 20, \"carbs\": 30, \"fat\": 10}. No other text or explanation.";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("could not reach the AI service: {0}")]
    Network(String),

    #[error("the AI service did not answer in time")]
    Timeout,

    #[error("invalid nutrition information format received from the AI service")]
    InvalidFormat,

    #[error("too many requests, please wait a moment before trying again")]
    RateLimited,

    #[error("the AI service is currently overloaded, please try again in a few moments")]
    Overloaded,

    #[error("AI service returned {status}: {message}")]
    Api { status: u16, message: String },
}

impl ExtractionError {
    pub fn status(&self) -> StatusCode {
        match self {
            ExtractionError::InvalidFormat => StatusCode::UNPROCESSABLE_ENTITY,
            ExtractionError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ExtractionError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            ExtractionError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ExtractionError::Network(_) | ExtractionError::Api { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<ExtractionError> for (StatusCode, String) {
    fn from(e: ExtractionError) -> Self {
        (e.status(), e.to_string())
    }
}

/// Turns a meal photo into macro estimates.
#[async_trait]
pub trait NutritionExtractor: Send + Sync {
    async fn extract(&self, image: Bytes, mime_type: &str)
        -> Result<NutritionInfo, ExtractionError>;
}
