//! CSV ingest and validation.
//!
//! Turns the housing-energy CSV into an `ObservationTable`:
//! - **strict schema** for the four model columns (missing column → `DataLoad`)
//! - **row-level validation** (skip bad rows, but keep a record of them)
//! - no fitting logic here

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use tracing::{debug, warn};

use crate::domain::{GROUP_COLUMN, Observation, ObservationTable, RESPONSE, RowError};
use crate::error::AppError;

const REQUIRED_COLUMNS: [&str; 4] = [RESPONSE, "n_rooms", "age", GROUP_COLUMN];

/// Load and validate the observation table.
pub fn load_observations(path: &Path) -> Result<ObservationTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::data_load(format!("Failed to open CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::data_load(format!("Failed to read CSV headers: {e}")))?
        .clone();

    let header_map = build_header_map(&headers);
    ensure_required_columns_exist(&header_map)?;

    let mut observations = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header occupies line 1.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &header_map) {
            Ok(obs) => observations.push(obs),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if !row_errors.is_empty() {
        warn!(
            "Skipped {} of {} rows in '{}'",
            row_errors.len(),
            rows_read,
            path.display()
        );
        for e in row_errors.iter().take(5) {
            debug!("line {}: {}", e.line, e.message);
        }
    }

    if observations.is_empty() {
        return Err(AppError::data_load(format!(
            "No valid rows in '{}' ({} read, {} rejected).",
            path.display(),
            rows_read,
            row_errors.len()
        )));
    }

    Ok(ObservationTable {
        observations,
        row_errors,
        rows_read,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn ensure_required_columns_exist(header_map: &HashMap<String, usize>) -> Result<(), AppError> {
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !header_map.contains_key(*c))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    let names: Vec<String> = missing.iter().map(|c| format!("`{c}`")).collect();
    Err(AppError::data_load(format!(
        "Missing required column(s): {}",
        names.join(", ")
    )))
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<Observation, String> {
    let shortfall = parse_f64(get_required(record, header_map, RESPONSE)?, RESPONSE)?;
    let n_rooms = parse_f64(get_required(record, header_map, "n_rooms")?, "n_rooms")?;
    let age = parse_f64(get_required(record, header_map, "age")?, "age")?;
    let group = get_required(record, header_map, GROUP_COLUMN)?.to_string();

    Ok(Observation {
        shortfall,
        n_rooms,
        age,
        group,
    })
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn parse_f64(s: &str, name: &str) -> Result<f64, String> {
    let v = s
        .parse::<f64>()
        .map_err(|_| format!("Invalid number '{s}' in `{name}`"))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite value '{s}' in `{name}`"))
    }
}
