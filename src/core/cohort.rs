//! Cohort filter over the balanced panel

use std::collections::BTreeSet;

use log::{debug, info};

use crate::config::ReportConfig;
use crate::core::panel::BalancedPanel;
use crate::core::patterns::{normalize_credential, CredentialMatcher};
use crate::core::record::Observation;

/// Which rows belong to the analysed subpopulation
#[derive(Debug, Clone)]
pub struct CohortCriteria {
    pub matcher: CredentialMatcher,
    pub jurisdictions: BTreeSet<String>,
}

impl CohortCriteria {
    pub fn new<S: AsRef<str>>(tokens: &[S], jurisdictions: &[S]) -> Result<Self, regex::Error> {
        Ok(Self {
            matcher: CredentialMatcher::new(tokens)?,
            jurisdictions: jurisdictions
                .iter()
                .map(|j| j.as_ref().trim().to_uppercase())
                .filter(|j| !j.is_empty())
                .collect(),
        })
    }

    pub fn from_config(config: &ReportConfig) -> Result<Self, regex::Error> {
        Self::new(
            config.credential_tokens.as_slice(),
            config.jurisdictions.as_slice(),
        )
    }

    /// Whether a single row belongs to the cohort
    pub fn admits(&self, row: &Observation) -> bool {
        self.jurisdictions.contains(row.jurisdiction.as_str())
            && row
                .credential
                .as_deref()
                .map(|c| self.matcher.is_match_normalized(&normalize_credential(c)))
                .unwrap_or(false)
    }
}

/// Read-only table of cohort rows
#[derive(Debug, Clone)]
pub struct Cohort {
    rows: Vec<Observation>,
    years: (i32, i32),
}

impl Cohort {
    #[cfg(test)]
    pub(crate) fn from_rows(rows: Vec<Observation>, years: (i32, i32)) -> Self {
        Self { rows, years }
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    /// The two panel years, first then second
    pub fn years(&self) -> (i32, i32) {
        self.years
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of distinct providers in the cohort
    pub fn provider_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.provider_id.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Keep balanced-panel rows that satisfy the credential and jurisdiction tests
pub fn filter_cohort(panel: &BalancedPanel, criteria: &CohortCriteria) -> Cohort {
    let rows: Vec<Observation> = panel
        .rows()
        .iter()
        .filter(|row| criteria.admits(row))
        .cloned()
        .collect();

    debug!(
        "Cohort tokens {:?}, jurisdictions {:?}",
        criteria.matcher.tokens(),
        criteria.jurisdictions
    );
    info!("Cohort filter kept {} of {} rows", rows.len(), panel.len());

    Cohort {
        rows,
        years: panel.years,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::panel::filter_balanced;
    use crate::core::record::fixtures::{obs, two_provider_example};

    pub(crate) fn cohort_of(rows: &[Observation]) -> Cohort {
        let criteria = CohortCriteria::new(&["MD"], &["RI", "NH"]).unwrap();
        filter_cohort(&filter_balanced(rows, (2022, 2023)), &criteria)
    }

    #[test]
    fn test_example_rows_all_pass() {
        let cohort = cohort_of(&two_provider_example());
        assert_eq!(cohort.len(), 4);
        assert_eq!(cohort.provider_count(), 2);
        assert_eq!(cohort.years(), (2022, 2023));
    }

    #[test]
    fn test_cohort_is_subset_meeting_criteria() {
        let mut rows = two_provider_example();
        for (id, cred, state) in [
            ("C", "M. D.", "RI"),
            ("D", "DO", "RI"),
            ("E", "MD", "MA"),
            ("F", "", "NH"),
            ("G", "m.d., ph.d.", "NH"),
        ] {
            rows.push(obs(id, cred, state, "Internal Medicine", 2022, 10.0, 8.0));
            rows.push(obs(id, cred, state, "Internal Medicine", 2023, 11.0, 9.0));
        }

        let panel = filter_balanced(&rows, (2022, 2023));
        let criteria = CohortCriteria::new(&["MD"], &["RI", "NH"]).unwrap();
        let cohort = filter_cohort(&panel, &criteria);

        let ids: BTreeSet<&str> = cohort.rows().iter().map(|r| r.provider_id.as_str()).collect();
        assert_eq!(ids, ["A", "B", "C", "G"].into_iter().collect());

        let token = regex::Regex::new(r"\bMD\b").unwrap();
        for row in cohort.rows() {
            assert!(panel.rows().contains(row));
            assert!(["RI", "NH"].contains(&row.jurisdiction.as_str()));
            let normalized = normalize_credential(row.credential.as_deref().unwrap());
            assert!(token.is_match(&normalized));
        }
    }

    #[test]
    fn test_missing_credential_never_matches() {
        let mut row = obs("A", "MD", "RI", "Cardiology", 2022, 1.0, 1.0);
        row.credential = None;
        let criteria = CohortCriteria::new(&["MD"], &["RI"]).unwrap();
        assert!(!criteria.admits(&row));
    }

    #[test]
    fn test_jurisdictions_are_normalized() {
        let criteria = CohortCriteria::new(&["MD"], &[" ri ", ""]).unwrap();
        assert_eq!(criteria.jurisdictions.len(), 1);
        assert!(criteria.admits(&obs("A", "MD", "RI", "Cardiology", 2022, 1.0, 1.0)));
    }
}
