//! Loader for the yearly billing extracts
//!
//! Reads each delimited file, locates the required columns by header name,
//! tags every row with its source year and concatenates the results.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info, warn};

use crate::config::{ColumnMap, ReportConfig};
use crate::core::record::Observation;

/// Fatal errors while loading a source file
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("source file not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{} is missing required column `{column}`", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("{}:{line}: column `{column}` has non-numeric value {value:?}", path.display())]
    MalformedValue {
        path: PathBuf,
        line: u64,
        column: String,
        value: String,
    },
}

/// One yearly input file
#[derive(Debug, Clone)]
pub struct YearSource {
    pub path: PathBuf,
    pub year: i32,
}

impl YearSource {
    pub fn new<P: Into<PathBuf>>(path: P, year: i32) -> Self {
        Self {
            path: path.into(),
            year,
        }
    }
}

/// How to read the input files
#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub columns: ColumnMap,
    pub delimiter: u8,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            columns: ColumnMap::default(),
            delimiter: b',',
        }
    }
}

impl ReaderSettings {
    pub fn from_config(config: &ReportConfig) -> Result<Self, crate::config::ConfigError> {
        Ok(Self {
            columns: config.columns.clone(),
            delimiter: config.delimiter_byte()?,
        })
    }
}

/// Positions of the required columns inside a header row
struct ColumnIndex {
    provider_id: usize,
    credential: usize,
    jurisdiction: usize,
    specialty: usize,
    submitted_charge: usize,
    allowed_amount: usize,
}

impl ColumnIndex {
    fn locate(headers: &[String], columns: &ColumnMap, path: &Path) -> Result<Self, LoadError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| LoadError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name.to_string(),
                })
        };

        Ok(Self {
            provider_id: find(&columns.provider_id)?,
            credential: find(&columns.credential)?,
            jurisdiction: find(&columns.jurisdiction)?,
            specialty: find(&columns.specialty)?,
            submitted_charge: find(&columns.submitted_charge)?,
            allowed_amount: find(&columns.allowed_amount)?,
        })
    }
}

/// Read the header row of a source file
///
/// Header names are trimmed and a leading byte-order mark is removed.
pub fn read_headers(path: &Path, settings: &ReaderSettings) -> Result<Vec<String>, LoadError> {
    if !path.is_file() {
        return Err(LoadError::MissingSource(path.to_path_buf()));
    }
    let mut reader = ReaderBuilder::new()
        .delimiter(settings.delimiter)
        .from_path(path)
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    let headers = reader.headers().map_err(|source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(clean_headers(headers))
}

fn clean_headers(headers: &StringRecord) -> Vec<String> {
    headers
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect()
}

/// Load one yearly extract and tag each row with `year`
///
/// # Arguments
///
/// * `path` - Path to the delimited file
/// * `year` - Year attached to every row
/// * `settings` - Column names and delimiter
///
/// # Returns
///
/// All rows of the file in file order
pub fn load_year(
    path: &Path,
    year: i32,
    settings: &ReaderSettings,
) -> Result<Vec<Observation>, LoadError> {
    if !path.is_file() {
        return Err(LoadError::MissingSource(path.to_path_buf()));
    }

    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(settings.delimiter)
        .trim(Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = clean_headers(reader.headers().map_err(csv_err)?);
    let index = ColumnIndex::locate(&headers, &settings.columns, path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let text = |i: usize| record.get(i).unwrap_or("").to_string();

        let credential = text(index.credential);
        rows.push(Observation {
            provider_id: text(index.provider_id),
            credential: if credential.is_empty() { None } else { Some(credential) },
            jurisdiction: text(index.jurisdiction),
            specialty: text(index.specialty),
            year,
            submitted_charge: parse_amount(
                record.get(index.submitted_charge),
                &settings.columns.submitted_charge,
                path,
                line,
            )?,
            allowed_amount: parse_amount(
                record.get(index.allowed_amount),
                &settings.columns.allowed_amount,
                path,
                line,
            )?,
        });
    }

    debug!("Read {} rows from {} for {}", rows.len(), path.display(), year);
    Ok(rows)
}

/// Parse a charge cell; an empty cell is a missing value
fn parse_amount(
    cell: Option<&str>,
    column: &str,
    path: &Path,
    line: u64,
) -> Result<Option<f64>, LoadError> {
    let value = cell.unwrap_or("").trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|_| LoadError::MalformedValue {
            path: path.to_path_buf(),
            line,
            column: column.to_string(),
            value: value.to_string(),
        })
}

/// Load every source in order and concatenate, without deduplication
///
/// Header sets that differ outside the required columns are reported but
/// not treated as a schema mismatch.
pub fn load_sources(
    sources: &[YearSource],
    settings: &ReaderSettings,
) -> Result<Vec<Observation>, LoadError> {
    let mut combined = Vec::new();
    let mut first_headers: Option<(PathBuf, BTreeSet<String>)> = None;

    for source in sources {
        let headers: BTreeSet<String> = read_headers(&source.path, settings)?.into_iter().collect();
        match &first_headers {
            Some((first_path, first)) if *first != headers => {
                let extra: Vec<_> = headers.symmetric_difference(first).cloned().collect();
                warn!(
                    "Headers of {} differ from {} outside the required columns: {}",
                    source.path.display(),
                    first_path.display(),
                    extra.join(", ")
                );
            }
            Some(_) => {}
            None => first_headers = Some((source.path.clone(), headers)),
        }

        let rows = load_year(&source.path, source.year, settings)?;
        info!(
            "Loaded {} rows for {} from {}",
            rows.len(),
            source.year,
            source.path.display()
        );
        combined.extend(rows);
    }

    Ok(combined)
}
