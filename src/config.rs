//! Report configuration
//!
//! Every field has a default so a partial JSON file (or none at all) is valid.
//! Command-line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("first and second year must differ (both are {0})")]
    SameYear(i32),

    #[error("at least one target jurisdiction is required")]
    NoJurisdictions,

    #[error("at least one credential token is required")]
    NoCredentialTokens,

    #[error("top_specialties must be at least 1")]
    NoSpecialties,

    #[error("delimiter {0:?} is not a single ASCII character")]
    InvalidDelimiter(char),
}

/// Header names of the columns the report reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub provider_id: String,
    pub credential: String,
    pub jurisdiction: String,
    pub specialty: String,
    pub submitted_charge: String,
    pub allowed_amount: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            provider_id: "Rndrng_NPI".to_string(),
            credential: "Rndrng_Prvdr_Crdntls".to_string(),
            jurisdiction: "Rndrng_Prvdr_State_Abrvtn".to_string(),
            specialty: "Rndrng_Prvdr_Type".to_string(),
            submitted_charge: "Tot_Sbmtd_Chrg".to_string(),
            allowed_amount: "Tot_Mdcr_Alowd_Amt".to_string(),
        }
    }
}

impl ColumnMap {
    /// All required header names in a fixed order
    pub fn required(&self) -> [&str; 6] {
        [
            &self.provider_id,
            &self.credential,
            &self.jurisdiction,
            &self.specialty,
            &self.submitted_charge,
            &self.allowed_amount,
        ]
    }
}

/// Full report configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Year tagged onto rows of the first file
    pub first_year: i32,

    /// Year tagged onto rows of the second file
    pub second_year: i32,

    /// Jurisdiction codes kept by the cohort filter
    pub jurisdictions: Vec<String>,

    /// Whole-word tokens a normalized credential must contain
    pub credential_tokens: Vec<String>,

    /// Number of most frequent specialties in the proportion breakdown
    pub top_specialties: usize,

    /// Field delimiter of the input files
    pub delimiter: char,

    /// Input header names
    pub columns: ColumnMap,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            first_year: 2022,
            second_year: 2023,
            jurisdictions: vec!["RI".to_string(), "NH".to_string()],
            credential_tokens: vec!["MD".to_string()],
            top_specialties: 3,
            delimiter: ',',
            columns: ColumnMap::default(),
        }
    }
}

impl ReportConfig {
    /// Parse a configuration from a JSON string
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Read a configuration file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to a JSON configuration file
    ///
    /// # Returns
    ///
    /// The parsed configuration, with defaults for absent fields
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }

    /// Check the configuration for values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.first_year == self.second_year {
            return Err(ConfigError::SameYear(self.first_year));
        }
        if self.jurisdictions.iter().all(|j| j.trim().is_empty()) {
            return Err(ConfigError::NoJurisdictions);
        }
        if self.credential_tokens.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::NoCredentialTokens);
        }
        if self.top_specialties == 0 {
            return Err(ConfigError::NoSpecialties);
        }
        self.delimiter_byte()?;
        Ok(())
    }

    /// The delimiter as the single byte the CSV reader expects
    pub fn delimiter_byte(&self) -> Result<u8, ConfigError> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(ConfigError::InvalidDelimiter(self.delimiter))
        }
    }

    /// The two configured years in file order
    pub fn years(&self) -> (i32, i32) {
        (self.first_year, self.second_year)
    }
}
