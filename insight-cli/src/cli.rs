use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Text};
use insight_core::{
    Config, InsightStore, MetadataStore, Pipeline, ProviderId, classifier_from_config,
    default_provider_from_config, parse_city_list,
};

use crate::display;

const DEFAULT_CITIES: &str = "New York, London, Tokyo";

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-insight", version, about = "Weather insight pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a weather provider and the language model.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        provider: String,
    },

    /// Fetch, classify and store weather for a list of cities.
    Run {
        /// Comma-separated city names.
        #[arg(default_value = DEFAULT_CITIES)]
        cities: String,

        /// CSV table with city metadata (overrides the config file).
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// SQLite database file (overrides the config file).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Do not write results to the database.
        #[arg(long)]
        no_persist: bool,
    },

    /// Show the most recent stored records.
    History {
        /// Number of records to show.
        #[arg(long, short, default_value_t = 10)]
        limit: usize,

        /// SQLite database file (overrides the config file).
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Run { cities, metadata, db, no_persist } => {
                run_pipeline(&cities, metadata, db, no_persist).await
            }
            Command::History { limit, db } => history(limit, db),
        }
    }
}

/// Config file plus environment overrides. Only the binary reads the environment.
fn load_config() -> anyhow::Result<Config> {
    let mut config = Config::load()?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    let api_key = Password::new(&format!("{id} API key:"))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read provider API key")?;

    if api_key.trim().is_empty() {
        anyhow::bail!("API key for '{id}' must not be empty");
    }
    config.upsert_provider_api_key(id, api_key.trim().to_string());

    let llm_prompt = if config.llm_api_key().is_some() {
        "Language-model API key (leave blank to keep current):"
    } else {
        "Language-model API key:"
    };
    let llm_key = Password::new(llm_prompt)
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read language-model API key")?;
    if !llm_key.trim().is_empty() {
        config.llm.api_key = Some(llm_key.trim().to_string());
    }

    let model = Text::new("Language model:")
        .with_default(config.llm_model())
        .prompt()
        .context("Failed to read model name")?;
    config.llm.model = Some(model.trim().to_string()).filter(|m| !m.is_empty());

    config.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    if let Ok(default) = config.default_provider_id() {
        println!("Default provider: {default}");
    }

    Ok(())
}

async fn run_pipeline(
    cities: &str,
    metadata: Option<PathBuf>,
    db: Option<PathBuf>,
    no_persist: bool,
) -> anyhow::Result<()> {
    let config = load_config()?;
    config.validate()?;

    let cities = parse_city_list(cities);
    if cities.is_empty() {
        anyhow::bail!("No cities given. Example: weather-insight run \"Paris, Tokyo\"");
    }

    let weather = default_provider_from_config(&config)?;
    let classifier = classifier_from_config(&config)?;
    let metadata = MetadataStore::load(&metadata.unwrap_or_else(|| config.metadata_path()));

    let mut pipeline = Pipeline::new(metadata, weather, classifier);

    if !no_persist {
        let db_path = match db {
            Some(path) => path,
            None => config.database_path()?,
        };
        pipeline = pipeline.with_opened_store(InsightStore::open(&db_path));
    }

    println!("Fetching and analyzing weather for {} cities...", cities.len());
    let report = pipeline.run(cities.as_slice()).await;
    print!("{}", display::render_report(&report));

    Ok(())
}

fn history(limit: usize, db: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config()?;
    let db_path = match db {
        Some(path) => path,
        None => config.database_path()?,
    };

    let store = InsightStore::open(&db_path)?;
    let records = store.recent(limit)?;

    if records.is_empty() {
        println!("No records stored yet in {}", db_path.display());
    } else {
        print!("{}", display::render_records(&records));
    }

    Ok(())
}
