//! Merging metadata and observations into [`EnrichedRecord`]s.

use chrono::{DateTime, SubsecRound, Utc};

use crate::model::{CityMetadata, Category, EnrichedRecord, WeatherObservation};

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Wall-clock time at millisecond precision, the resolution the store keeps.
pub fn now_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Build an unclassified record stamped with the current time.
pub fn combine(
    city: &str,
    metadata: Option<&CityMetadata>,
    observation: &WeatherObservation,
) -> EnrichedRecord {
    combine_at(city, metadata, observation, now_timestamp())
}

/// Pure merge of optional metadata and an observation.
///
/// The category starts as `Unknown`; see [`EnrichedRecord::classified`].
pub fn combine_at(
    city: &str,
    metadata: Option<&CityMetadata>,
    observation: &WeatherObservation,
    timestamp: DateTime<Utc>,
) -> EnrichedRecord {
    EnrichedRecord {
        city: city.trim().to_string(),
        country: metadata.and_then(|m| m.country.clone()),
        population: metadata.and_then(|m| m.population),
        temperature_c: round2(observation.temperature_c),
        humidity_pct: round2(observation.humidity_pct),
        wind_speed_mps: round2(observation.wind_speed_mps),
        description: observation.description.clone(),
        ai_category: Category::Unknown,
        timestamp,
    }
}
