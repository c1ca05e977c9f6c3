//! Observation records shared by every pipeline stage
//!
//! One `Observation` is one (provider, year) row from a yearly billing extract.

use serde::{Deserialize, Serialize};

/// A single provider-year billing record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Stable provider key across years (NPI)
    pub provider_id: String,

    /// Free-text credential as submitted, `None` when the cell is empty
    pub credential: Option<String>,

    /// Two-letter state code of the rendering provider
    pub jurisdiction: String,

    /// Provider type / specialty label
    pub specialty: String,

    /// Year of the extract this row came from
    pub year: i32,

    /// Total submitted charge
    pub submitted_charge: Option<f64>,

    /// Total Medicare allowed amount
    pub allowed_amount: Option<f64>,
}

/// Which charge column a statistic is computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeField {
    Submitted,
    Allowed,
}

impl ChargeField {
    /// Read this field from an observation
    pub fn get(self, observation: &Observation) -> Option<f64> {
        match self {
            ChargeField::Submitted => observation.submitted_charge,
            ChargeField::Allowed => observation.allowed_amount,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChargeField::Submitted => "Submitted charge",
            ChargeField::Allowed => "Allowed amount",
        }
    }
}
