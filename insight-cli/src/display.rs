//! Plain-text rendering of records and run reports.

use std::fmt::Write;

use insight_core::{EnrichedRecord, PersistOutcome, RunReport};

const HEADERS: [&str; 9] = [
    "city",
    "country",
    "population",
    "temp °C",
    "humidity %",
    "wind m/s",
    "description",
    "category",
    "timestamp (UTC)",
];

const ABSENT: &str = "-";

fn row(record: &EnrichedRecord) -> [String; 9] {
    [
        record.city.clone(),
        record.country.clone().unwrap_or_else(|| ABSENT.to_string()),
        record.population.map_or_else(|| ABSENT.to_string(), |p| p.to_string()),
        format!("{:.2}", record.temperature_c),
        format!("{:.2}", record.humidity_pct),
        format!("{:.2}", record.wind_speed_mps),
        record.description.clone(),
        record.ai_category.to_string(),
        record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
    ]
}

/// Aligned table, one line per record.
pub fn render_records(records: &[EnrichedRecord]) -> String {
    let rows: Vec<[String; 9]> = records.iter().map(row).collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for r in &rows {
        for (w, cell) in widths.iter_mut().zip(r.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &HEADERS.map(str::to_string), &widths);

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths);

    for r in &rows {
        push_line(&mut out, r, &widths);
    }

    out
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| {
            let pad = w.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join("  ");

    let _ = writeln!(out, "{}", line.trim_end());
}

/// Records table, then failures, then the persistence outcome.
pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();

    if report.records.is_empty() {
        out.push_str("No cities could be processed.\n");
    } else {
        out.push_str(&render_records(&report.records));
    }

    if !report.failures.is_empty() {
        out.push_str("\nProblems:\n");
        for failure in &report.failures {
            let _ = writeln!(out, "  - {failure}");
        }
    }

    let _ = match &report.persisted {
        PersistOutcome::Persisted(n) => writeln!(out, "\nSaved {n} new record(s)."),
        PersistOutcome::Failed(reason) => {
            writeln!(out, "\nWarning: results were NOT saved: {reason}")
        }
        PersistOutcome::Skipped => writeln!(out, "\nResults were not saved (--no-persist)."),
    };

    out
}
