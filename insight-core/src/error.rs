//! Error taxonomy for the enrichment pipeline.
//!
//! Only [`InsightError::Configuration`] is fatal. Every other variant is caught
//! at the narrowest boundary and turned into a skipped city or a degraded value.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Metadata lookup failed: {0}")]
    MetadataLookup(String),

    #[error("Weather fetch failed for '{city}': {reason}")]
    WeatherFetch { city: String, reason: String },

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),
}

impl InsightError {
    /// Whether this error must stop the process before any run starts.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<rusqlite::Error> for InsightError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Steps of a pipeline run that can fail without aborting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    MetadataLookup,
    WeatherFetch,
    Classify,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::MetadataLookup => "metadata lookup",
            Stage::WeatherFetch => "weather fetch",
            Stage::Classify => "classification",
            Stage::Persist => "persistence",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, InsightError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_errors_are_fatal() {
        assert!(InsightError::Configuration("missing key".into()).is_fatal());
        assert!(!InsightError::Persistence("disk full".into()).is_fatal());
        assert!(
            !InsightError::WeatherFetch { city: "Paris".into(), reason: "timeout".into() }
                .is_fatal()
        );
    }

    #[test]
    fn weather_fetch_message_names_city() {
        let err = InsightError::WeatherFetch {
            city: "Nowhereville".into(),
            reason: "status 404 Not Found".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Nowhereville"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn sqlite_errors_map_to_persistence() {
        let err: InsightError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, InsightError::Persistence(_)));
    }
}
