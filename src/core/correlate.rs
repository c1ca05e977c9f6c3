//! Cross-year correlation of submitted and allowed charges

use std::collections::BTreeMap;

use log::info;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::core::cohort::Cohort;
use crate::core::record::ChargeField;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResult {
    pub x_field: ChargeField,
    pub x_year: i32,
    pub y_field: ChargeField,
    pub y_year: i32,
    /// Providers present in both sub-tables
    pub providers_joined: usize,
    /// Joined providers with both values present
    pub complete_pairs: usize,
    /// Pearson r, `NaN` when undefined
    pub coefficient: f64,
    /// Two-sided p-value for r = 0
    pub p_value: f64,
}

/// Pearson product-moment correlation of paired samples
///
/// Returns `NaN` for fewer than two pairs or when either side has zero
/// variance. The result is clamped to [-1, 1].
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let len = xs.len().min(ys.len());
    if len < 2 {
        return f64::NAN;
    }
    let mean_x = xs[..len].iter().sum::<f64>() / len as f64;
    let mean_y = ys[..len].iter().sum::<f64>() / len as f64;

    let mut num = 0.0;
    let mut denom_x = 0.0;
    let mut denom_y = 0.0;
    for (x, y) in xs[..len].iter().zip(&ys[..len]) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        num += dx * dy;
        denom_x += dx * dx;
        denom_y += dy * dy;
    }

    if denom_x == 0.0 || denom_y == 0.0 {
        return f64::NAN;
    }
    (num / (denom_x.sqrt() * denom_y.sqrt())).clamp(-1.0, 1.0)
}

/// Two-sided p-value of a Pearson coefficient from `n` pairs
pub fn pearson_p_value(r: f64, n: usize) -> f64 {
    if n < 3 || r.is_nan() {
        return f64::NAN;
    }
    if r.abs() >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
        Err(_) => f64::NAN,
    }
}

/// Provider → value of `field` among rows of `year`
fn provider_values(cohort: &Cohort, (field, year): (ChargeField, i32)) -> BTreeMap<&str, Option<f64>> {
    cohort
        .rows()
        .iter()
        .filter(|r| r.year == year)
        .map(|r| (r.provider_id.as_str(), field.get(r)))
        .collect()
}

/// Correlate one field in one year with another field in another year
///
/// Each side is reduced to a provider → value table for its year and the two
/// tables are inner-joined on provider. Pairs with a missing value on either
/// side are skipped; missing values elsewhere in the row do not matter.
pub fn correlate_fields(
    cohort: &Cohort,
    x: (ChargeField, i32),
    y: (ChargeField, i32),
) -> CorrelationResult {
    let left = provider_values(cohort, x);
    let right = provider_values(cohort, y);

    let mut providers_joined = 0;
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for (provider, left_value) in &left {
        if let Some(right_value) = right.get(provider) {
            providers_joined += 1;
            if let (Some(a), Some(b)) = (left_value, right_value) {
                xs.push(*a);
                ys.push(*b);
            }
        }
    }

    let coefficient = pearson(&xs, &ys);
    info!(
        "Correlation over {} complete pairs ({} joined providers): r = {:.4}",
        xs.len(),
        providers_joined,
        coefficient
    );

    CorrelationResult {
        x_field: x.0,
        x_year: x.1,
        y_field: y.0,
        y_year: y.1,
        providers_joined,
        complete_pairs: xs.len(),
        coefficient,
        p_value: pearson_p_value(coefficient, xs.len()),
    }
}

/// First-year submitted charge against second-year allowed amount
pub fn correlate_across_years(cohort: &Cohort) -> CorrelationResult {
    let (first, second) = cohort.years();
    correlate_fields(
        cohort,
        (ChargeField::Submitted, first),
        (ChargeField::Allowed, second),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cohort::tests::cohort_of;
    use crate::core::record::fixtures::{obs, two_provider_example};

    #[test]
    fn test_two_provider_example() {
        let result = correlate_across_years(&cohort_of(&two_provider_example()));
        assert_eq!(result.providers_joined, 2);
        assert_eq!(result.complete_pairs, 2);
        // {100, 200} against {85, 160}: two points are perfectly correlated
        assert_eq!(result.coefficient, pearson(&[100.0, 200.0], &[85.0, 160.0]));
        assert!((result.coefficient - 1.0).abs() < 1e-12);
        assert!(result.p_value.is_nan());
    }

    #[test]
    fn test_pairwise_complete_skips_only_missing_pairs() {
        let mut rows = vec![
            obs("A", "MD", "RI", "Cardiology", 2022, 100.0, 1.0),
            obs("A", "MD", "RI", "Cardiology", 2023, 1.0, 90.0),
            obs("B", "MD", "RI", "Cardiology", 2022, 200.0, 1.0),
            obs("B", "MD", "RI", "Cardiology", 2023, 1.0, 150.0),
            obs("C", "MD", "RI", "Cardiology", 2022, 300.0, 1.0),
            obs("C", "MD", "RI", "Cardiology", 2023, 1.0, 260.0),
            obs("D", "MD", "RI", "Cardiology", 2022, 400.0, 1.0),
            obs("D", "MD", "RI", "Cardiology", 2023, 1.0, 310.0),
        ];
        // unrelated fields missing: still used
        rows[0].allowed_amount = None;
        rows[1].submitted_charge = None;
        // paired field missing: pair skipped
        rows[7].allowed_amount = None;

        let result = correlate_across_years(&Cohort::from_rows(rows, (2022, 2023)));
        assert_eq!(result.providers_joined, 4);
        assert_eq!(result.complete_pairs, 3);
        let expected = pearson(&[100.0, 200.0, 300.0], &[90.0, 150.0, 260.0]);
        assert_eq!(result.coefficient, expected);
    }

    #[test]
    fn test_coefficient_in_range_and_deterministic() {
        let rows: Vec<_> = (0..20)
            .flat_map(|i| {
                let id = format!("P{i}");
                let s = 50.0 + ((i * 37) % 11) as f64 * 13.0;
                let a = 30.0 + ((i * 17) % 7) as f64 * 9.0;
                vec![
                    obs(&id, "MD", "NH", "Urology", 2022, s, a),
                    obs(&id, "MD", "NH", "Urology", 2023, s + 5.0, a + 3.0),
                ]
            })
            .collect();
        let cohort = Cohort::from_rows(rows, (2022, 2023));
        let first = correlate_across_years(&cohort);
        let second = correlate_across_years(&cohort);
        assert!((-1.0..=1.0).contains(&first.coefficient));
        assert_eq!(first.coefficient.to_bits(), second.coefficient.to_bits());
        assert!((0.0..=1.0).contains(&first.p_value));
    }

    #[test]
    fn test_degenerate_inputs_are_nan() {
        assert!(pearson(&[], &[]).is_nan());
        assert!(pearson(&[1.0], &[2.0]).is_nan());
        assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_nan());
        assert!((pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
    }
}
