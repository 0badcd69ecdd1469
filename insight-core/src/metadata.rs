//! Static city reference table.
//!
//! The table is a CSV file with a header row. Columns are found by name, so
//! extra columns and any column order are fine. Only `city` is required.

use std::{collections::HashMap, fs, path::Path};

use tracing::{info, warn};

use crate::{error::InsightError, model::CityMetadata};

#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    by_city: HashMap<String, CityMetadata>,
    load_error: Option<String>,
}

impl MetadataStore {
    /// Load the table, degrading to an empty store on failure.
    ///
    /// The failure is logged and kept so callers can surface it.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(store) => {
                info!(path = %path.display(), cities = store.len(), "loaded city metadata");
                store
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "city metadata unavailable; continuing without it");
                Self { by_city: HashMap::new(), load_error: Some(e.to_string()) }
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, InsightError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            InsightError::MetadataLookup(format!("cannot read {}: {e}", path.display()))
        })?;

        Self::from_csv_str(&contents)
    }

    pub fn from_csv_str(contents: &str) -> Result<Self, InsightError> {
        let mut lines = contents.lines().filter(|l| !l.trim().is_empty());

        let header = lines
            .next()
            .ok_or_else(|| InsightError::MetadataLookup("metadata table is empty".into()))?;
        let columns = Columns::from_header(&split_csv_line(header))?;

        let mut by_city = HashMap::new();
        for line in lines {
            let fields = split_csv_line(line);
            let Some(meta) = columns.row(&fields) else {
                continue;
            };
            // First row wins for duplicate names.
            by_city.entry(normalize_key(&meta.city)).or_insert(meta);
        }

        Ok(Self { by_city, load_error: None })
    }

    /// Case-insensitive lookup by city name.
    pub fn lookup(&self, city: &str) -> Option<&CityMetadata> {
        self.by_city.get(&normalize_key(city))
    }

    /// Why the table could not be loaded, if it could not.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn len(&self) -> usize {
        self.by_city.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_city.is_empty()
    }
}

fn normalize_key(city: &str) -> String {
    city.trim().to_lowercase()
}

struct Columns {
    city: usize,
    country: Option<usize>,
    population: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
}

impl Columns {
    fn from_header(header: &[String]) -> Result<Self, InsightError> {
        let find = |names: &[&str]| {
            header.iter().position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
        };

        let city = find(&["city"]).ok_or_else(|| {
            InsightError::MetadataLookup("metadata table has no `city` column".into())
        })?;

        Ok(Self {
            city,
            country: find(&["country"]),
            population: find(&["population"]),
            latitude: find(&["latitude", "lat"]),
            longitude: find(&["longitude", "lon", "lng"]),
        })
    }

    fn row(&self, fields: &[String]) -> Option<CityMetadata> {
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| fields.get(i)).map(|s| s.as_str()).filter(|s| !s.is_empty())
        };

        let city = cell(Some(self.city))?.to_string();

        Some(CityMetadata {
            city,
            country: cell(self.country).map(str::to_string),
            population: cell(self.population).and_then(parse_population),
            latitude: cell(self.latitude).and_then(|s| s.parse().ok()),
            longitude: cell(self.longitude).and_then(|s| s.parse().ok()),
        })
    }
}

/// Accepts `2148000`, `2148000.0` and `2,148,000`; rejects negatives,
/// fractions, non-numbers and anything the store's INTEGER column can't hold.
fn parse_population(raw: &str) -> Option<u64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && *c != '_').collect();

    let n = match cleaned.parse::<u64>() {
        Ok(n) => n,
        Err(_) => {
            let f = cleaned.parse::<f64>().ok()?;
            // 2^63 is exactly representable; anything at or above it overflows i64.
            if !(f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f < i64::MAX as f64) {
                return None;
            }
            f as u64
        }
    };

    i64::try_from(n).is_ok().then_some(n)
}

/// Split one CSV line, honouring double-quoted fields and `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TABLE: &str = "\
city,country,population,latitude,longitude,timezone
Paris,France,2148000,48.8566,2.3522,Europe/Paris
New York,United States,8336817.0,40.7128,-74.0060,America/New_York
\"Washington, D.C.\",United States,\"689,545\",38.9072,-77.0369,America/New_York
Atlantis,,,,,
paris,Texas,25000,33.66,-95.55,America/Chicago
Springfield,United States,-5,,,
";

    #[test]
    fn lookup_is_case_insensitive() {
        let store = MetadataStore::from_csv_str(TABLE).expect("table");

        let meta = store.lookup("PARIS").expect("paris");
        assert_eq!(meta.country.as_deref(), Some("France"));
        assert_eq!(meta.population, Some(2_148_000));
        assert_eq!(meta.latitude, Some(48.8566));

        assert!(store.lookup("  new york ").is_some());
    }

    #[test]
    fn first_matching_row_wins() {
        let store = MetadataStore::from_csv_str(TABLE).expect("table");
        assert_eq!(store.lookup("paris").and_then(|m| m.country.as_deref()), Some("France"));
    }

    #[test]
    fn population_is_coerced_to_integer() {
        let store = MetadataStore::from_csv_str(TABLE).expect("table");

        assert_eq!(store.lookup("New York").and_then(|m| m.population), Some(8_336_817));
        assert_eq!(store.lookup("Washington, D.C.").and_then(|m| m.population), Some(689_545));
    }

    #[test]
    fn empty_and_invalid_cells_are_absent() {
        let store = MetadataStore::from_csv_str(TABLE).expect("table");

        let atlantis = store.lookup("Atlantis").expect("row exists");
        assert_eq!(atlantis.country, None);
        assert_eq!(atlantis.population, None);

        let springfield = store.lookup("Springfield").expect("row exists");
        assert_eq!(springfield.population, None);
    }

    #[test]
    fn unknown_city_is_absent() {
        let store = MetadataStore::from_csv_str(TABLE).expect("table");
        assert!(store.lookup("Nowhereville").is_none());
    }

    #[test]
    fn columns_located_by_header_name() {
        let store =
            MetadataStore::from_csv_str("population,notes,City\n1000,tiny,Hamlet\n").expect("table");
        let meta = store.lookup("hamlet").expect("hamlet");
        assert_eq!(meta.population, Some(1000));
        assert_eq!(meta.country, None);
    }

    #[test]
    fn missing_city_column_is_an_error() {
        let err = MetadataStore::from_csv_str("name,country\nParis,France\n").unwrap_err();
        assert!(matches!(err, InsightError::MetadataLookup(_)));
    }

    #[test]
    fn missing_file_degrades_to_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MetadataStore::load(&dir.path().join("absent.csv"));

        assert!(store.is_empty());
        assert!(store.lookup("Paris").is_none());
        assert!(store.load_error().is_some());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(TABLE.as_bytes()).expect("write");

        let store = MetadataStore::load(file.path());
        assert!(store.load_error().is_none());
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn oversized_population_is_absent() {
        let store = MetadataStore::from_csv_str(
            "city,population\nBigville,10000000000000000000\nFloatville,1e19\nEdge,9223372036854775807\n",
        )
        .expect("table");

        assert_eq!(store.lookup("Bigville").expect("row exists").population, None);
        assert_eq!(store.lookup("Floatville").expect("row exists").population, None);
        assert_eq!(store.lookup("Edge").and_then(|m| m.population), Some(i64::MAX as u64));
    }

    #[test]
    fn splits_quoted_fields() {
        assert_eq!(
            split_csv_line(r#"a, "b, c" ,"say ""hi""""#),
            vec!["a".to_string(), "b, c".to_string(), "say \"hi\"".to_string()]
        );
    }
}
