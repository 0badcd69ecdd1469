use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{error::InsightError, model::WeatherObservation};

use super::{ProviderId, WeatherProvider, check_ranges, truncate_body};

pub const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com";

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, InsightError> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            InsightError::Configuration(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self { api_key, base_url: DEFAULT_BASE_URL.to_string(), http })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn fetch_current(&self, city: &str) -> Result<WeatherObservation> {
        let url = format!("{}/v1/current.json", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("q", city)])
            .send()
            .await
            .context("Failed to send request to WeatherAPI.com (current)")?;

        let status = res.status();
        let body = res.text().await.context("Failed to read WeatherAPI current response body")?;

        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "WeatherAPI current request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: WaResponse =
            serde_json::from_str(&body).context("Failed to parse WeatherAPI current JSON")?;

        let description = parsed.current.condition.text.trim().to_string();
        if description.is_empty() {
            anyhow::bail!("WeatherAPI response contained an empty condition text");
        }

        check_ranges(WeatherObservation {
            temperature_c: parsed.current.temp_c,
            humidity_pct: parsed.current.humidity,
            wind_speed_mps: parsed.current.wind_kph / 3.6,
            description,
        })
        .context("WeatherAPI returned an out-of-range value")
    }
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    humidity: f64,
    wind_kph: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    current: WaCurrent,
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    async fn fetch(&self, city: &str) -> Result<WeatherObservation, InsightError> {
        debug!(city = %city, provider = "weatherapi", "fetching current weather");

        self.fetch_current(city).await.map_err(|e| InsightError::WeatherFetch {
            city: city.to_string(),
            reason: format!("{e:#}"),
        })
    }

    fn id(&self) -> ProviderId {
        ProviderId::WeatherApi
    }
}
