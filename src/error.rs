//! Error types for domain_appraiser
//!
//! Storage errors never escape a collection operation; they are logged and
//! the store degrades to empty or no-op. Validation and provider errors are
//! returned to the command that triggered them.

use thiserror::Error;

/// Failures of the durable backing store or the collection codec.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Backend(#[from] sled::Error),

    #[error("Malformed collection data: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Stored value under '{0}' is not valid UTF-8")]
    InvalidUtf8(String),
}

/// Validation errors for user input and for values returned by the
/// valuation provider.
///
/// These errors are shown directly to users and should be clear and actionable.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("At least one domain name is required")]
    NoDomains,

    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    #[error("Value must be a finite, non-negative number, got {0}")]
    InvalidValue(f64),

    #[error("Growth opportunity must be between 0 and 10, got {0}")]
    OpportunityOutOfRange(u8),

    #[error("Unknown influencer '{0}', expected keywordValue, searchVolume, salesHistory or marketTrend")]
    UnknownInfluencer(String),

    #[error("{0} is not in your portfolio")]
    NotInPortfolio(String),

    #[error("Select at least two domains to compare")]
    TooFewToCompare,
}

/// Failures talking to the external valuation API.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Valuation API responded with status {0}")]
    Status(u16),

    #[error("Valuation API returned malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Valuation API returned an invalid result: {0}")]
    Invalid(#[from] ValidationError),
}

/// Failure of a valuation workflow: bad input, or the API call failed.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
