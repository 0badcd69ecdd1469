use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Static reference data for a city, read from the metadata table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityMetadata {
    pub city: String,
    pub country: Option<String>,
    pub population: Option<u64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Current conditions as reported by a weather provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_mps: f64,
    pub description: String,
}

/// Closed set of weather categories the classifier may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Clear,
    Cloudy,
    Rainy,
    Stormy,
    Snowy,
    Extreme,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Clear => "Clear",
            Category::Cloudy => "Cloudy",
            Category::Rainy => "Rainy",
            Category::Stormy => "Stormy",
            Category::Snowy => "Snowy",
            Category::Extreme => "Extreme",
            Category::Unknown => "Unknown",
        }
    }

    /// Every category, including the `Unknown` fallback.
    pub const fn all() -> &'static [Category] {
        &[
            Category::Clear,
            Category::Cloudy,
            Category::Rainy,
            Category::Stormy,
            Category::Snowy,
            Category::Extreme,
            Category::Unknown,
        ]
    }

    /// Categories a language model is allowed to answer with.
    pub const fn classifiable() -> &'static [Category] {
        &[
            Category::Clear,
            Category::Cloudy,
            Category::Rainy,
            Category::Stormy,
            Category::Snowy,
            Category::Extreme,
        ]
    }

    /// Exact, case-sensitive match against the category names.
    /// Anything else becomes `Unknown`.
    pub fn from_label(label: &str) -> Self {
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == label)
            .unwrap_or(Category::Unknown)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified observation for one city in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub city: String,
    pub country: Option<String>,
    pub population: Option<u64>,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_mps: f64,
    pub description: String,
    pub ai_category: Category,
    pub timestamp: DateTime<Utc>,
}

impl EnrichedRecord {
    /// Timestamp as stored: RFC 3339, UTC, millisecond precision.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Returns the record with its category set; consumes the unclassified one.
    pub fn classified(self, ai_category: Category) -> Self {
        Self { ai_category, ..self }
    }
}
