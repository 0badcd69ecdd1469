//! Core library for the `weather-insight` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Weather providers and the language-model classifier
//! - The city metadata table and the SQLite insight store
//! - The enrichment pipeline tying them together
//!
//! It is used by `insight-cli`, but can also be reused by other binaries or services.

pub mod classifier;
pub mod config;
pub mod error;
pub mod metadata;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod record;
pub mod store;

pub use classifier::{Classifier, LanguageModel, OpenAiChat, classifier_from_config};
pub use config::{Config, LlmConfig, PathsConfig, ProviderConfig};
pub use error::{InsightError, Stage};
pub use metadata::MetadataStore;
pub use model::{Category, CityMetadata, EnrichedRecord, WeatherObservation};
pub use pipeline::{PersistOutcome, Pipeline, RunReport, StageFailure, parse_city_list};
pub use provider::{ProviderId, WeatherProvider, default_provider_from_config};
pub use store::InsightStore;
