//! Balanced panel construction
//!
//! Keeps only providers observed exactly once in each of the two years.

use std::collections::{BTreeMap, BTreeSet};

use log::{info, warn};
use serde::Serialize;

use crate::core::record::Observation;

/// Years and row counts seen per provider
#[derive(Debug, Default)]
pub struct Panel {
    years: BTreeMap<String, BTreeSet<i32>>,
    rows: BTreeMap<String, usize>,
}

impl Panel {
    /// Years in which a provider appears
    pub fn years_of(&self, provider_id: &str) -> Option<&BTreeSet<i32>> {
        self.years.get(provider_id)
    }

    /// Number of rows recorded for a provider
    pub fn row_count(&self, provider_id: &str) -> usize {
        self.rows.get(provider_id).copied().unwrap_or(0)
    }

    pub fn provider_count(&self) -> usize {
        self.years.len()
    }

    /// Whether a provider has exactly one row in each of `years`
    pub fn is_balanced(&self, provider_id: &str, years: (i32, i32)) -> bool {
        let expected: BTreeSet<i32> = [years.0, years.1].into_iter().collect();
        self.row_count(provider_id) == 2 && self.years_of(provider_id) == Some(&expected)
    }
}

/// Build the provider → years mapping
pub fn build_panel(rows: &[Observation]) -> Panel {
    let mut panel = Panel::default();
    for row in rows {
        panel
            .years
            .entry(row.provider_id.clone())
            .or_default()
            .insert(row.year);
        *panel.rows.entry(row.provider_id.clone()).or_insert(0) += 1;
    }
    panel
}

/// Counts describing what the panel filter dropped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PanelStats {
    pub providers_seen: usize,
    pub balanced_providers: usize,
    pub dropped_providers: usize,
    /// Providers with two rows that fall in the same year
    pub duplicate_year_providers: usize,
}

/// Rows of providers present once in each year
#[derive(Debug, Clone)]
pub struct BalancedPanel {
    rows: Vec<Observation>,
    pub years: (i32, i32),
    pub stats: PanelStats,
}

impl BalancedPanel {
    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Retain only providers with exactly two rows whose years are `years`
///
/// A provider with two rows in the same year is not balanced even though its
/// row count is two; such providers are counted in
/// [`PanelStats::duplicate_year_providers`].
pub fn filter_balanced(rows: &[Observation], years: (i32, i32)) -> BalancedPanel {
    let panel = build_panel(rows);

    let mut stats = PanelStats {
        providers_seen: panel.provider_count(),
        ..PanelStats::default()
    };
    let mut balanced = BTreeSet::new();
    for (provider_id, seen) in &panel.years {
        if panel.is_balanced(provider_id, years) {
            balanced.insert(provider_id.as_str());
        } else {
            stats.dropped_providers += 1;
            if panel.row_count(provider_id) == 2 && seen.len() == 1 {
                stats.duplicate_year_providers += 1;
            }
        }
    }
    stats.balanced_providers = balanced.len();

    if stats.duplicate_year_providers > 0 {
        warn!(
            "{} providers have two rows in a single year and were dropped",
            stats.duplicate_year_providers
        );
    }

    let kept: Vec<Observation> = rows
        .iter()
        .filter(|row| balanced.contains(row.provider_id.as_str()))
        .cloned()
        .collect();

    info!(
        "Balanced panel: {} of {} providers kept ({} rows)",
        stats.balanced_providers,
        stats.providers_seen,
        kept.len()
    );

    BalancedPanel {
        rows: kept,
        years,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::fixtures::{obs, two_provider_example};
    use std::collections::HashMap;

    #[test]
    fn test_example_providers_are_balanced() {
        let balanced = filter_balanced(&two_provider_example(), (2022, 2023));
        assert_eq!(balanced.len(), 4);
        assert_eq!(balanced.stats.balanced_providers, 2);
        assert_eq!(balanced.stats.dropped_providers, 0);
    }

    #[test]
    fn test_single_year_provider_dropped() {
        let mut rows = two_provider_example();
        rows.push(obs("C", "MD", "RI", "Cardiology", 2022, 10.0, 5.0));
        let balanced = filter_balanced(&rows, (2022, 2023));
        assert!(balanced.rows().iter().all(|r| r.provider_id != "C"));
        assert_eq!(balanced.stats.dropped_providers, 1);
    }

    #[test]
    fn test_duplicate_same_year_rows_not_balanced() {
        let mut rows = two_provider_example();
        rows.push(obs("D", "MD", "RI", "Cardiology", 2022, 10.0, 5.0));
        rows.push(obs("D", "MD", "RI", "Cardiology", 2022, 10.0, 5.0));
        let balanced = filter_balanced(&rows, (2022, 2023));
        assert!(balanced.rows().iter().all(|r| r.provider_id != "D"));
        assert_eq!(balanced.stats.duplicate_year_providers, 1);
    }

    #[test]
    fn test_retained_providers_have_two_distinct_years() {
        let mut rows = two_provider_example();
        rows.push(obs("E", "MD", "NH", "Cardiology", 2023, 1.0, 1.0));
        rows.push(obs("F", "MD", "NH", "Cardiology", 2022, 1.0, 1.0));
        rows.push(obs("F", "MD", "NH", "Cardiology", 2023, 1.0, 1.0));
        rows.push(obs("F", "MD", "NH", "Cardiology", 2023, 1.0, 1.0));
        rows.push(obs("G", "MD", "NH", "Cardiology", 2021, 1.0, 1.0));
        rows.push(obs("G", "MD", "NH", "Cardiology", 2023, 1.0, 1.0));

        let balanced = filter_balanced(&rows, (2022, 2023));
        let mut by_provider: HashMap<&str, Vec<i32>> = HashMap::new();
        for row in balanced.rows() {
            by_provider.entry(&row.provider_id).or_default().push(row.year);
        }
        assert_eq!(by_provider.len(), 2);
        for years in by_provider.values() {
            let mut years = years.clone();
            years.sort();
            assert_eq!(years, vec![2022, 2023]);
        }
    }

    #[test]
    fn test_build_panel_records_years() {
        let panel = build_panel(&two_provider_example());
        let years = panel.years_of("A").unwrap();
        assert!(years.contains(&2022) && years.contains(&2023));
        assert_eq!(panel.row_count("B"), 2);
        assert_eq!(panel.row_count("Z"), 0);
    }
}
