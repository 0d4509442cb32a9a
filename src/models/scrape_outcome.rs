use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::PriceReading;

/// Result of one scrape session. Failure kinds are kept apart so the
/// notification policy can tell them apart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ScrapeOutcome {
    Success(PriceReading),
    LoginFailed,
    ExtractionFailed(String),
}

impl ScrapeOutcome {
    pub fn extraction_failed(cause: impl fmt::Display) -> Self {
        ScrapeOutcome::ExtractionFailed(cause.to_string())
    }

    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeOutcome::Success(reading) if reading.is_valid() => "success",
            ScrapeOutcome::Success(_) => "unparsed",
            ScrapeOutcome::LoginFailed => "login_failed",
            ScrapeOutcome::ExtractionFailed(_) => "extraction_failed",
        }
    }

    pub fn reading(&self) -> Option<&PriceReading> {
        match self {
            ScrapeOutcome::Success(reading) => Some(reading),
            _ => None,
        }
    }
}

impl fmt::Display for ScrapeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeOutcome::Success(reading) => write!(f, "success: {}", reading),
            ScrapeOutcome::LoginFailed => write!(f, "login failed"),
            ScrapeOutcome::ExtractionFailed(cause) => write!(f, "extraction failed: {}", cause),
        }
    }
}
