//! Grouped summaries of the cohort
//!
//! Two independent computations: charge moments per (jurisdiction, year) and
//! specialty shares per jurisdiction for the most frequent specialties.

use std::collections::{BTreeMap, HashMap};

use log::debug;
use serde::Serialize;

use crate::core::cohort::Cohort;
use crate::core::record::{ChargeField, Observation};

/// Count, mean and sample standard deviation of one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Moments {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl Moments {
    /// Moments of the present values; missing values are skipped
    ///
    /// The mean of no values and the deviation of fewer than two values are `NaN`.
    pub fn of<I: IntoIterator<Item = Option<f64>>>(values: I) -> Self {
        let present: Vec<f64> = values.into_iter().flatten().collect();
        let count = present.len();
        if count == 0 {
            return Self {
                count,
                mean: f64::NAN,
                std_dev: f64::NAN,
            };
        }

        let mean = present.iter().sum::<f64>() / count as f64;
        let std_dev = if count < 2 {
            f64::NAN
        } else {
            let ss: f64 = present.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        };

        Self {
            count,
            mean,
            std_dev,
        }
    }
}

/// Charge moments for one (jurisdiction, year) group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargeSummaryRow {
    pub jurisdiction: String,
    pub year: i32,
    pub rows: usize,
    pub submitted: Moments,
    pub allowed: Moments,
}

impl ChargeSummaryRow {
    pub fn moments(&self, field: ChargeField) -> &Moments {
        match field {
            ChargeField::Submitted => &self.submitted,
            ChargeField::Allowed => &self.allowed,
        }
    }
}

/// Mean and sample SD of submitted and allowed charges per (jurisdiction, year)
///
/// Groups come back sorted by jurisdiction, then year. Groups with no rows are
/// absent.
pub fn charge_summary(cohort: &Cohort) -> Vec<ChargeSummaryRow> {
    let mut groups: BTreeMap<(&str, i32), Vec<&Observation>> = BTreeMap::new();
    for row in cohort.rows() {
        groups
            .entry((row.jurisdiction.as_str(), row.year))
            .or_default()
            .push(row);
    }

    groups
        .into_iter()
        .map(|((jurisdiction, year), rows)| ChargeSummaryRow {
            jurisdiction: jurisdiction.to_string(),
            year,
            rows: rows.len(),
            submitted: Moments::of(rows.iter().map(|r| r.submitted_charge)),
            allowed: Moments::of(rows.iter().map(|r| r.allowed_amount)),
        })
        .collect()
}

/// Frequency of one specialty across the whole cohort
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecialtyCount {
    pub specialty: String,
    pub count: usize,
}

/// Share of one specialty within a jurisdiction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecialtyShare {
    pub jurisdiction: String,
    pub specialty: String,
    pub count: usize,
    /// Percent of the jurisdiction's rows among the top specialties, one decimal
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecialtySummary {
    /// Most frequent specialties, most frequent first
    pub top: Vec<SpecialtyCount>,
    /// Shares sorted by jurisdiction, then specialty
    pub shares: Vec<SpecialtyShare>,
}

impl SpecialtySummary {
    /// Shares of one jurisdiction
    pub fn for_jurisdiction<'a>(
        &'a self,
        jurisdiction: &'a str,
    ) -> impl Iterator<Item = &'a SpecialtyShare> + 'a {
        self.shares
            .iter()
            .filter(move |s| s.jurisdiction == jurisdiction)
    }

    /// Distinct jurisdictions present, sorted
    pub fn jurisdictions(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = self.shares.iter().map(|s| s.jurisdiction.as_str()).collect();
        seen.dedup();
        seen
    }
}

/// Specialty frequencies in first-encounter order
fn specialty_counts(rows: &[Observation]) -> Vec<SpecialtyCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<SpecialtyCount> = Vec::new();
    for row in rows {
        match index.get(row.specialty.as_str()) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(&row.specialty, counts.len());
                counts.push(SpecialtyCount {
                    specialty: row.specialty.clone(),
                    count: 1,
                });
            }
        }
    }
    counts
}

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Proportions of the `top_n` most frequent specialties within each jurisdiction
///
/// Ties in frequency keep the order in which specialties were first seen.
pub fn specialty_summary(cohort: &Cohort, top_n: usize) -> SpecialtySummary {
    let mut counts = specialty_counts(cohort.rows());
    // stable: equal counts stay in encounter order
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(top_n);
    debug!("Top specialties: {:?}", counts);

    let mut grouped: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    let mut totals: HashMap<&str, usize> = HashMap::new();
    for row in cohort.rows() {
        if counts.iter().any(|c| c.specialty == row.specialty) {
            *grouped
                .entry((row.jurisdiction.as_str(), row.specialty.as_str()))
                .or_insert(0) += 1;
            *totals.entry(row.jurisdiction.as_str()).or_insert(0) += 1;
        }
    }

    let shares = grouped
        .into_iter()
        .map(|((jurisdiction, specialty), count)| {
            let total = totals.get(jurisdiction).copied().unwrap_or(0);
            SpecialtyShare {
                jurisdiction: jurisdiction.to_string(),
                specialty: specialty.to_string(),
                count,
                percentage: round1(100.0 * count as f64 / total as f64),
            }
        })
        .collect();

    SpecialtySummary { top: counts, shares }
}
