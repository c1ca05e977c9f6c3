//! File handling utilities
//!
//! Provenance of the input files (size, timestamps, digest) and output path
//! resolution.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Identity of one input file as it was read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceProvenance {
    pub path: String,
    pub file_name: String,
    pub year: i32,
    pub size_bytes: u64,
    pub modified: Option<String>,
    pub sha256: String,
    pub rows: usize,
}

/// Compute the SHA-256 digest of a file as lowercase hex
///
/// # Arguments
///
/// * `file_path` - Path to the file
///
/// # Returns
///
/// The hex digest
pub fn sha256_file(file_path: &Path) -> Result<String> {
    let mut file = File::open(file_path)
        .with_context(|| format!("Failed to open {} for hashing", file_path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("Failed to read file for hashing"),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Gather provenance for an input file
///
/// # Arguments
///
/// * `file_path` - Path to the file
/// * `year` - Year the file's rows were tagged with
/// * `rows` - Number of data rows read from it
pub fn get_file_provenance(file_path: &Path, year: i32, rows: usize) -> Result<SourceProvenance> {
    let metadata = fs::metadata(file_path)
        .with_context(|| format!("Failed to read metadata for {}", file_path.display()))?;

    let modified = metadata
        .modified()
        .ok()
        .map(|time| DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M:%S").to_string());

    Ok(SourceProvenance {
        path: file_path.to_string_lossy().to_string(),
        file_name: file_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        year,
        size_bytes: metadata.len(),
        modified,
        sha256: sha256_file(file_path)?,
        rows,
    })
}

/// Resolve an output path against an optional output directory
///
/// Absolute paths are left alone.
pub fn resolve_output_path(output_dir: Option<&Path>, requested: &Path) -> PathBuf {
    match output_dir {
        Some(dir) if requested.is_relative() => dir.join(requested),
        _ => requested.to_path_buf(),
    }
}
