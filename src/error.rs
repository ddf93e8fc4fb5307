//! Error types for the psyrisk engine

use crate::types::RiskTier;
use thiserror::Error;

/// Errors that abort an analytics pass.
///
/// Problems with individual respondents are not errors; they are reported as
/// [`crate::types::Exclusion`] entries in the result.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Tier weight table has no entry for tier {0}")]
    MissingTierWeight(RiskTier),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
