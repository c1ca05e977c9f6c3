//! Ordinary least squares of allowed amount on jurisdiction, specialty and year
//!
//! Jurisdiction and specialty enter as reference-coded dummies, with the
//! lexicographically first level of each as the reference. Year enters as a
//! single continuous regressor. Terms are produced as structured values, so
//! consumers never parse coefficient names.

use std::collections::BTreeSet;
use std::fmt;

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::core::cohort::Cohort;
use crate::core::record::Observation;

/// Relative size below which a pivot of R counts as zero
const RANK_TOLERANCE: f64 = 1e-10;

/// Why a regression could not be fitted
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("{observations} observations cannot identify {parameters} parameters")]
    NotEnoughObservations {
        observations: usize,
        parameters: usize,
    },

    #[error("design matrix is rank deficient at term {0}")]
    RankDeficient(Predictor),
}

/// What a regression term measures
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "level", rename_all = "snake_case")]
pub enum Predictor {
    Intercept,
    /// Difference from the reference jurisdiction
    Jurisdiction(String),
    /// Difference from the reference specialty
    Specialty(String),
    /// Linear trend per calendar year
    Year,
}

impl fmt::Display for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predictor::Intercept => write!(f, "Intercept"),
            Predictor::Jurisdiction(level) => write!(f, "Jurisdiction: {}", level),
            Predictor::Specialty(level) => write!(f, "Specialty: {}", level),
            Predictor::Year => write!(f, "Year"),
        }
    }
}

/// One row of the coefficient table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub term: Predictor,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
}

/// A fitted model and its coefficient table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionFit {
    /// Intercept, jurisdiction levels, specialty levels, year
    pub coefficients: Vec<Coefficient>,
    pub observations: usize,
    /// Rows dropped because the allowed amount was missing
    pub dropped_missing: usize,
    pub residual_df: usize,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub jurisdiction_reference: String,
    pub specialty_reference: String,
}

impl RegressionFit {
    /// Specialty terms sorted by descending estimate
    ///
    /// The sort is stable, so equal estimates keep level order.
    pub fn ranked_specialties(&self) -> Vec<&Coefficient> {
        let mut specialties: Vec<&Coefficient> = self
            .coefficients
            .iter()
            .filter(|c| matches!(c.term, Predictor::Specialty(_)))
            .collect();
        specialties.sort_by(|a, b| {
            b.estimate
                .partial_cmp(&a.estimate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        specialties
    }

    /// The specialty with the highest allowed amount relative to the reference
    pub fn top_specialty(&self) -> Option<&Coefficient> {
        self.ranked_specialties().into_iter().next()
    }

    pub fn coefficient(&self, term: &Predictor) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| &c.term == term)
    }
}

/// Design matrix columns derived from the data
struct Design {
    terms: Vec<Predictor>,
    jurisdictions: Vec<String>,
    specialties: Vec<String>,
}

impl Design {
    fn from_rows(rows: &[&Observation]) -> Self {
        let jurisdictions: Vec<String> = rows
            .iter()
            .map(|r| r.jurisdiction.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let specialties: Vec<String> = rows
            .iter()
            .map(|r| r.specialty.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut terms = vec![Predictor::Intercept];
        terms.extend(
            jurisdictions
                .iter()
                .skip(1)
                .map(|j| Predictor::Jurisdiction(j.clone())),
        );
        terms.extend(
            specialties
                .iter()
                .skip(1)
                .map(|s| Predictor::Specialty(s.clone())),
        );
        terms.push(Predictor::Year);

        Self {
            terms,
            jurisdictions,
            specialties,
        }
    }

    fn matrix(&self, rows: &[&Observation]) -> DMatrix<f64> {
        let mut x = DMatrix::<f64>::zeros(rows.len(), self.terms.len());
        for (i, row) in rows.iter().enumerate() {
            for (j, term) in self.terms.iter().enumerate() {
                x[(i, j)] = match term {
                    Predictor::Intercept => 1.0,
                    Predictor::Jurisdiction(level) => indicator(&row.jurisdiction == level),
                    Predictor::Specialty(level) => indicator(&row.specialty == level),
                    Predictor::Year => row.year as f64,
                };
            }
        }
        x
    }
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

/// Two-sided p-value of a t statistic
fn two_sided_p(t_value: f64, df: usize) -> f64 {
    if df == 0 || t_value.is_nan() {
        return f64::NAN;
    }
    match StudentsT::new(0.0, 1.0, df as f64) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(t_value.abs())),
        Err(_) => f64::NAN,
    }
}

/// Fit allowed amount ~ jurisdiction + specialty + year over the cohort
///
/// # Arguments
///
/// * `cohort` - The cohort table; rows with a missing allowed amount are skipped
///
/// # Returns
///
/// The fitted model, or a [`ModelError`] when the design cannot be estimated
pub fn fit_allowed_amount(cohort: &Cohort) -> Result<RegressionFit, ModelError> {
    let rows: Vec<&Observation> = cohort
        .rows()
        .iter()
        .filter(|r| r.allowed_amount.is_some())
        .collect();
    let dropped_missing = cohort.len() - rows.len();

    let design = Design::from_rows(&rows);
    let n = rows.len();
    let p = design.terms.len();
    if rows.is_empty() || n < p {
        return Err(ModelError::NotEnoughObservations {
            observations: n,
            parameters: p,
        });
    }

    let x = design.matrix(&rows);
    let y = DVector::from_iterator(n, rows.iter().map(|r| r.allowed_amount.unwrap_or(f64::NAN)));

    let qr = x.clone().qr();
    let r = qr.r();
    for (j, term) in design.terms.iter().enumerate() {
        let scale = x.column(j).norm();
        if scale == 0.0 || r[(j, j)].abs() <= RANK_TOLERANCE * scale {
            return Err(ModelError::RankDeficient(term.clone()));
        }
    }

    let qty = qr.q().transpose() * &y;
    let beta = r
        .solve_upper_triangular(&qty)
        .ok_or_else(|| ModelError::RankDeficient(Predictor::Intercept))?;
    let r_inv = r
        .solve_upper_triangular(&DMatrix::<f64>::identity(p, p))
        .ok_or_else(|| ModelError::RankDeficient(Predictor::Intercept))?;

    let residuals = &y - &x * &beta;
    let ssr = residuals.norm_squared();
    let mean_y = y.mean();
    let sst: f64 = y.iter().map(|v| (v - mean_y).powi(2)).sum();

    let residual_df = n - p;
    let sigma2 = if residual_df > 0 {
        ssr / residual_df as f64
    } else {
        f64::NAN
    };

    let coefficients = design
        .terms
        .iter()
        .enumerate()
        .map(|(j, term)| {
            let variance: f64 = r_inv.row(j).iter().map(|v| v * v).sum::<f64>() * sigma2;
            let std_error = variance.sqrt();
            let t_value = beta[j] / std_error;
            Coefficient {
                term: term.clone(),
                estimate: beta[j],
                std_error,
                t_value,
                p_value: two_sided_p(t_value, residual_df),
            }
        })
        .collect();

    let r_squared = if sst > 0.0 { 1.0 - ssr / sst } else { f64::NAN };
    let adj_r_squared = if residual_df > 0 {
        1.0 - (1.0 - r_squared) * (n - 1) as f64 / residual_df as f64
    } else {
        f64::NAN
    };

    debug!(
        "Regression design: {} rows x {} terms, references {:?}/{:?}",
        n,
        p,
        design.jurisdictions.first(),
        design.specialties.first()
    );
    info!(
        "Fitted allowed-amount model on {} rows: R² = {:.4}, adjusted R² = {:.4}",
        n, r_squared, adj_r_squared
    );

    Ok(RegressionFit {
        coefficients,
        observations: n,
        dropped_missing,
        residual_df,
        r_squared,
        adj_r_squared,
        jurisdiction_reference: design.jurisdictions[0].clone(),
        specialty_reference: design.specialties[0].clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::fixtures::obs;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    /// allowed = 100 + 50*[NH] + {0, 30, -20}[specialty] + 10*(year-2022) + noise
    fn synthetic_rows() -> Vec<Observation> {
        let specialties = [("Cardiology", 0.0), ("Internal Medicine", 30.0), ("Urology", -20.0)];
        let noise = [1.0, -0.5, -1.0, 0.5, 0.25, -0.25];
        let mut rows = Vec::new();
        let mut k = 0;
        for (state, state_effect) in [("NH", 0.0), ("RI", 50.0)] {
            for (specialty, effect) in specialties {
                for provider in 0..3 {
                    for year in [2022, 2023] {
                        let allowed = 100.0
                            + state_effect
                            + effect
                            + 10.0 * (year - 2022) as f64
                            + noise[k % noise.len()];
                        k += 1;
                        let id = format!("{state}-{specialty}-{provider}");
                        rows.push(obs(&id, "MD", state, specialty, year, allowed * 2.0, allowed));
                    }
                }
            }
        }
        rows
    }

    #[test]
    fn test_recovers_known_effects() {
        let fit = fit_allowed_amount(&Cohort::from_rows(synthetic_rows(), (2022, 2023))).unwrap();

        assert_eq!(fit.jurisdiction_reference, "NH");
        assert_eq!(fit.specialty_reference, "Cardiology");
        let est = |term: Predictor| fit.coefficient(&term).unwrap().estimate;
        assert!(close(est(Predictor::Jurisdiction("RI".into())), 50.0, 1.5));
        assert!(close(est(Predictor::Specialty("Internal Medicine".into())), 30.0, 1.5));
        assert!(close(est(Predictor::Specialty("Urology".into())), -20.0, 1.5));
        assert!(close(est(Predictor::Year), 10.0, 1.5));
        assert!(fit.r_squared > 0.99);
    }

    #[test]
    fn test_coefficient_count_and_order() {
        let fit = fit_allowed_amount(&Cohort::from_rows(synthetic_rows(), (2022, 2023))).unwrap();
        // 1 intercept + (2 - 1) jurisdictions + (3 - 1) specialties + 1 year
        assert_eq!(fit.coefficients.len(), 5);
        let terms: Vec<_> = fit.coefficients.iter().map(|c| c.term.clone()).collect();
        assert_eq!(
            terms,
            vec![
                Predictor::Intercept,
                Predictor::Jurisdiction("RI".into()),
                Predictor::Specialty("Internal Medicine".into()),
                Predictor::Specialty("Urology".into()),
                Predictor::Year,
            ]
        );
        assert_eq!(fit.residual_df, 36 - 5);
    }

    #[test]
    fn test_adjusted_r_squared_not_above_r_squared() {
        let fit = fit_allowed_amount(&Cohort::from_rows(synthetic_rows(), (2022, 2023))).unwrap();
        assert!(fit.adj_r_squared <= fit.r_squared);
        for c in &fit.coefficients {
            assert!(c.std_error > 0.0);
            assert!((0.0..=1.0).contains(&c.p_value), "{}: {}", c.term, c.p_value);
        }
    }

    #[test]
    fn test_top_specialty_ignores_other_terms() {
        let fit = fit_allowed_amount(&Cohort::from_rows(synthetic_rows(), (2022, 2023))).unwrap();
        let top = fit.top_specialty().unwrap();
        assert_eq!(top.term, Predictor::Specialty("Internal Medicine".into()));
        let ranked: Vec<_> = fit.ranked_specialties().iter().map(|c| c.term.to_string()).collect();
        assert_eq!(ranked, vec!["Specialty: Internal Medicine", "Specialty: Urology"]);
    }

    #[test]
    fn test_missing_allowed_rows_are_dropped() {
        let mut rows = synthetic_rows();
        rows[0].allowed_amount = None;
        let fit = fit_allowed_amount(&Cohort::from_rows(rows, (2022, 2023))).unwrap();
        assert_eq!(fit.observations, 35);
        assert_eq!(fit.dropped_missing, 1);
    }

    #[test]
    fn test_single_year_is_rank_deficient() {
        let rows: Vec<_> = synthetic_rows().into_iter().filter(|r| r.year == 2022).collect();
        let err = fit_allowed_amount(&Cohort::from_rows(rows, (2022, 2023))).unwrap_err();
        assert_eq!(err, ModelError::RankDeficient(Predictor::Year));
    }

    #[test]
    fn test_empty_cohort_is_not_estimable() {
        let err = fit_allowed_amount(&Cohort::from_rows(Vec::new(), (2022, 2023))).unwrap_err();
        assert!(matches!(err, ModelError::NotEnoughObservations { observations: 0, .. }));
    }

    #[test]
    fn test_p_value_bounds() {
        assert!(close(two_sided_p(0.0, 10), 1.0, 1e-12));
        assert!(two_sided_p(50.0, 10) < 1e-6);
        assert!(two_sided_p(2.0, 0).is_nan());
    }
}
