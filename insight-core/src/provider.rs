use crate::{
    Config, WeatherObservation,
    error::InsightError,
    provider::{openweather::OpenWeatherProvider, weatherapi::WeatherApiProvider},
};
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug};

pub mod openweather;
pub mod weatherapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    /// Environment variable that may carry this provider's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "OPENWEATHER_API_KEY",
            ProviderId::WeatherApi => "WEATHERAPI_API_KEY",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = InsightError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.trim().to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(InsightError::Configuration(format!(
                "Unknown provider '{value}'. Supported providers: openweather, weatherapi."
            ))),
        }
    }
}

/// Source of current conditions for a named city.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// One outbound request. Any failure is a `WeatherFetch` error naming the city.
    async fn fetch(&self, city: &str) -> Result<WeatherObservation, InsightError>;

    fn id(&self) -> ProviderId;
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
) -> Result<Box<dyn WeatherProvider>, InsightError> {
    let provider_cfg = config
        .provider_config(id)
        .filter(|_| config.is_provider_configured(id))
        .ok_or_else(|| {
            InsightError::Configuration(format!(
                "No API key configured for provider '{id}'.\n\
                 Hint: run `weather-insight configure {id}` and enter your API key."
            ))
        })?;

    let api_key = provider_cfg.api_key.clone();
    let timeout = config.timeout();

    let boxed: Box<dyn WeatherProvider> = match id {
        ProviderId::OpenWeather => {
            let mut p = OpenWeatherProvider::new(api_key, timeout)?;
            if let Some(url) = &provider_cfg.base_url {
                p = p.with_base_url(url);
            }
            Box::new(p)
        }
        ProviderId::WeatherApi => {
            let mut p = WeatherApiProvider::new(api_key, timeout)?;
            if let Some(url) = &provider_cfg.base_url {
                p = p.with_base_url(url);
            }
            Box::new(p)
        }
    };

    Ok(boxed)
}

/// Construct the default provider from config, using `default_provider` field.
pub fn default_provider_from_config(
    config: &Config,
) -> Result<Box<dyn WeatherProvider>, InsightError> {
    let id = config.default_provider_id()?;
    provider_from_config(id, config)
}

/// Reject observations outside physical ranges; upstream glitches count as
/// malformed responses.
pub(crate) fn check_ranges(obs: WeatherObservation) -> anyhow::Result<WeatherObservation> {
    if !(0.0..=100.0).contains(&obs.humidity_pct) {
        anyhow::bail!("humidity {} is outside 0-100", obs.humidity_pct);
    }
    if obs.wind_speed_mps < 0.0 {
        anyhow::bail!("wind speed {} is negative", obs.wind_speed_mps);
    }
    Ok(obs)
}

/// Shorten an error body for inclusion in a message, respecting char boundaries.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn provider_id_as_str_roundtrip() {
        for id in ProviderId::all() {
            let s = id.as_str();
            let parsed = ProviderId::try_from(s).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn provider_id_parse_is_case_insensitive() {
        assert_eq!(ProviderId::try_from(" OpenWeather ").unwrap(), ProviderId::OpenWeather);
    }

    #[test]
    fn unknown_provider_error() {
        let err = ProviderId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
        assert!(err.is_fatal());
    }

    #[test]
    fn provider_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = provider_from_config(ProviderId::OpenWeather, &cfg).unwrap_err();
        assert!(err.to_string().contains("No API key configured for provider"));
    }

    #[test]
    fn default_provider_from_config_errors_when_not_set() {
        let cfg = Config::default();
        let err = default_provider_from_config(&cfg).unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("No default provider configured"));
        assert!(msg.contains("Hint: run `weather-insight configure"));
    }

    #[test]
    fn default_provider_from_config_works_when_set_and_configured() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "KEY".to_string());

        let provider = default_provider_from_config(&cfg).expect("provider");
        assert_eq!(provider.id(), ProviderId::WeatherApi);
    }

    #[test]
    fn truncate_body_keeps_short_bodies() {
        assert_eq!(truncate_body("not found"), "not found");
    }

    #[test]
    fn truncate_body_cuts_on_char_boundary() {
        let body = "é".repeat(300);
        let out = truncate_body(&body);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), 203);
    }
}
