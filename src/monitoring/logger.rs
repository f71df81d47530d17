use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::strategies::weather_edge::Analysis;

const HEADER: &str =
    "timestamp,city,date,samples,average,spread,baseline,score,reliable,bucket,market_price,edge";

/// Append-only CSV record of every analysis.
pub struct CsvLogger {
    log_path: PathBuf,
}

impl CsvLogger {
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self> {
        let log_path = log_path.as_ref().to_path_buf();

        // Create CSV file with headers if it doesn't exist
        if !log_path.exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)
                .with_context(|| format!("Failed to create {}", log_path.display()))?;
            writeln!(file, "{}", HEADER)?;
        }

        Ok(Self { log_path })
    }

    pub fn log_analysis(&self, analysis: &Analysis) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open {}", self.log_path.display()))?;

        writeln!(file, "{}", format_row(analysis, &Utc::now().to_rfc3339()))?;
        Ok(())
    }
}

fn format_row(analysis: &Analysis, timestamp: &str) -> String {
    let (average, spread) = match analysis.summary.summary() {
        Some(s) => (format!("{:.2}", s.average), format!("{:.2}", s.spread)),
        None => (String::new(), String::new()),
    };
    let price = analysis
        .recommendation
        .market_price
        .map(|p| format!("{:.1}", p))
        .unwrap_or_default();

    format!(
        "{},{},{},{},{},{},{:.1},{:.2},{},{},{},{}",
        timestamp,
        escape(analysis.city.name),
        analysis.date,
        analysis.samples.len(),
        average,
        spread,
        analysis.baseline,
        analysis.score.value(),
        analysis.score.is_reliable(),
        escape(analysis.recommendation.bucket.as_deref().unwrap_or("")),
        price,
        analysis.recommendation.edge
    )
}

fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
