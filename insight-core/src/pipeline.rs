//! Per-run orchestration: lookup, fetch, combine, classify, persist.
//!
//! Cities are processed one at a time in input order. A failing city is
//! recorded as a [`StageFailure`] and skipped; it never stops the others.

use std::fmt;

use tracing::{info, warn};

use crate::{
    classifier::Classifier,
    error::{InsightError, Stage},
    metadata::MetadataStore,
    model::{Category, EnrichedRecord},
    provider::WeatherProvider,
    record,
    store::InsightStore,
};

/// Something that went wrong during a run without aborting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    /// `None` for failures that are not tied to a single city.
    pub city: Option<String>,
    pub stage: Stage,
    pub reason: String,
}

impl StageFailure {
    fn new(city: Option<&str>, stage: Stage, err: &InsightError) -> Self {
        // The city is already carried separately.
        let reason = match err {
            InsightError::WeatherFetch { reason, .. } => reason.clone(),
            other => other.to_string(),
        };

        Self { city: city.map(str::to_string), stage, reason }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.city {
            Some(city) => write!(f, "{city}: {} failed: {}", self.stage, self.reason),
            None => write!(f, "{} failed: {}", self.stage, self.reason),
        }
    }
}

/// What happened when the batch was handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Rows newly written (duplicates excluded).
    Persisted(usize),
    /// The store was attached but could not be opened or written.
    Failed(String),
    /// Persistence was turned off for this run.
    Skipped,
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Successful records, in input order.
    pub records: Vec<EnrichedRecord>,
    pub failures: Vec<StageFailure>,
    pub persisted: PersistOutcome,
}

impl RunReport {
    pub fn failures_for(&self, stage: Stage) -> impl Iterator<Item = &StageFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }
}

#[derive(Debug)]
pub struct Pipeline {
    metadata: MetadataStore,
    weather: Box<dyn WeatherProvider>,
    classifier: Classifier,
    store: Option<InsightStore>,
    store_error: Option<String>,
}

impl Pipeline {
    pub fn new(
        metadata: MetadataStore,
        weather: Box<dyn WeatherProvider>,
        classifier: Classifier,
    ) -> Self {
        Self { metadata, weather, classifier, store: None, store_error: None }
    }

    pub fn with_store(mut self, store: InsightStore) -> Self {
        self.store = Some(store);
        self.store_error = None;
        self
    }

    /// Attach the result of opening a store. An open failure is reported by
    /// every run as a persistence failure instead of aborting.
    pub fn with_opened_store(self, opened: Result<InsightStore, InsightError>) -> Self {
        match opened {
            Ok(store) => self.with_store(store),
            Err(e) => {
                warn!(stage = %Stage::Persist, error = %e, "store unavailable");
                Self { store: None, store_error: Some(e.to_string()), ..self }
            }
        }
    }

    pub fn store(&self) -> Option<&InsightStore> {
        self.store.as_ref()
    }

    /// Run every city through the pipeline and persist the successes.
    ///
    /// Never fails: per-city and persistence problems end up in the report.
    pub async fn run<S: AsRef<str>>(&self, cities: &[S]) -> RunReport {
        let mut failures = Vec::new();

        if let Some(reason) = self.metadata.load_error() {
            failures.push(StageFailure {
                city: None,
                stage: Stage::MetadataLookup,
                reason: reason.to_string(),
            });
        }

        let mut records = Vec::with_capacity(cities.len());
        for city in cities {
            let city = city.as_ref().trim();
            if city.is_empty() {
                continue;
            }
            if let Some(record) = self.process_city(city, &mut failures).await {
                records.push(record);
            }
        }

        let persisted = self.persist(&records, &mut failures);

        info!(
            requested = cities.len(),
            succeeded = records.len(),
            failures = failures.len(),
            "pipeline run finished"
        );

        RunReport { records, failures, persisted }
    }

    async fn process_city(
        &self,
        city: &str,
        failures: &mut Vec<StageFailure>,
    ) -> Option<EnrichedRecord> {
        let metadata = self.metadata.lookup(city);

        let observation = match self.weather.fetch(city).await {
            Ok(obs) => obs,
            Err(e) => {
                warn!(city = %city, stage = %Stage::WeatherFetch, error = %e, "skipping city");
                failures.push(StageFailure::new(Some(city), Stage::WeatherFetch, &e));
                return None;
            }
        };

        let record = record::combine(city, metadata, &observation);

        let category = match self.classifier.try_classify(&record.description).await {
            Ok(category) => category,
            Err(e) => {
                warn!(city = %city, stage = %Stage::Classify, error = %e, "using Unknown category");
                failures.push(StageFailure::new(Some(city), Stage::Classify, &e));
                Category::Unknown
            }
        };

        Some(record.classified(category))
    }

    fn persist(
        &self,
        records: &[EnrichedRecord],
        failures: &mut Vec<StageFailure>,
    ) -> PersistOutcome {
        let Some(store) = &self.store else {
            return match &self.store_error {
                Some(reason) => {
                    failures.push(StageFailure {
                        city: None,
                        stage: Stage::Persist,
                        reason: reason.clone(),
                    });
                    PersistOutcome::Failed(reason.clone())
                }
                None => PersistOutcome::Skipped,
            };
        };

        match store.append(records) {
            Ok(n) => PersistOutcome::Persisted(n),
            Err(e) => {
                warn!(stage = %Stage::Persist, error = %e, "records were not saved");
                failures.push(StageFailure::new(None, Stage::Persist, &e));
                PersistOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Split a comma-separated city list, dropping blanks.
pub fn parse_city_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}
