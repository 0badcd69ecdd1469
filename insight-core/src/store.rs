//! SQLite-backed history of enriched records.
//!
//! One table, `weather_insights`, with a surrogate id and a uniqueness
//! constraint on `(city, timestamp)`. Conflicting inserts are ignored.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params, types::Type};
use tracing::{debug, info};

use crate::{
    error::InsightError,
    model::{Category, EnrichedRecord},
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS weather_insights (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        city         TEXT NOT NULL,
        country      TEXT,
        population   INTEGER CHECK (population IS NULL OR population >= 0),
        temperature  REAL NOT NULL,
        humidity     REAL NOT NULL,
        wind_speed   REAL NOT NULL,
        description  TEXT NOT NULL,
        ai_category  TEXT NOT NULL
                     CHECK (ai_category IN
                        ('Clear', 'Cloudy', 'Rainy', 'Stormy', 'Snowy', 'Extreme', 'Unknown')),
        timestamp    TEXT NOT NULL,
        UNIQUE (city, timestamp)
    );

    CREATE INDEX IF NOT EXISTS idx_weather_insights_timestamp
        ON weather_insights (timestamp DESC);
";

/// Durable record of past runs.
///
/// The connection sits behind a Mutex since rusqlite's Connection is not Sync.
pub struct InsightStore {
    conn: Mutex<Connection>,
}

impl InsightStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, InsightError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                InsightError::Persistence(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            InsightError::Persistence(format!("Failed to open database {}: {e}", path.display()))
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        let store = Self::init(conn)?;
        info!("Insight store opened at {}", path.display());
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, InsightError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, InsightError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, InsightError> {
        self.conn
            .lock()
            .map_err(|e| InsightError::Persistence(format!("Database lock poisoned: {e}")))
    }

    /// Append a batch in one transaction. Returns the number of rows actually
    /// inserted; rows whose `(city, timestamp)` already exists are skipped.
    pub fn append(&self, records: &[EnrichedRecord]) -> Result<usize, InsightError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO weather_insights
                    (city, country, population, temperature, humidity, wind_speed,
                     description, ai_category, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;

            for record in records {
                let population = record
                    .population
                    .map(i64::try_from)
                    .transpose()
                    .map_err(|_| {
                        InsightError::Persistence(format!(
                            "population for '{}' does not fit in the store",
                            record.city
                        ))
                    })?;

                let changed = stmt.execute(params![
                    record.city,
                    record.country,
                    population,
                    record.temperature_c,
                    record.humidity_pct,
                    record.wind_speed_mps,
                    record.description,
                    record.ai_category.as_str(),
                    record.timestamp_iso(),
                ])?;

                if changed == 0 {
                    debug!(city = %record.city, timestamp = %record.timestamp_iso(), "duplicate record ignored");
                }
                inserted += changed;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Most recent `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<EnrichedRecord>, InsightError> {
        let conn = self.lock()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut stmt = conn.prepare(
            "SELECT city, country, population, temperature, humidity, wind_speed,
                    description, ai_category, timestamp
             FROM weather_insights
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], record_from_row)?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Total number of stored records.
    pub fn count(&self) -> Result<usize, InsightError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM weather_insights", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

impl std::fmt::Debug for InsightStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightStore").finish()
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<EnrichedRecord> {
    let population: Option<i64> = row.get(2)?;
    let category: String = row.get(7)?;
    let timestamp: String = row.get(8)?;

    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

    Ok(EnrichedRecord {
        city: row.get(0)?,
        country: row.get(1)?,
        population: population.and_then(|p| u64::try_from(p).ok()),
        temperature_c: row.get(3)?,
        humidity_pct: row.get(4)?,
        wind_speed_mps: row.get(5)?,
        description: row.get(6)?,
        ai_category: Category::from_label(&category),
        timestamp,
    })
}
