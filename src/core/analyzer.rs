//! Report orchestration
//!
//! `ReportAnalyzer` runs the stages in data-dependency order: load, balance,
//! filter to the cohort, then the three independent analyses over the cohort.

use std::path::Path;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use log::{info, warn};
use serde::Serialize;

use crate::config::ReportConfig;
use crate::core::aggregate::{
    charge_summary, specialty_summary, ChargeSummaryRow, SpecialtyShare, SpecialtySummary,
};
use crate::core::cohort::{filter_cohort, CohortCriteria};
use crate::core::correlate::{correlate_across_years, CorrelationResult};
use crate::core::loader::{load_sources, ReaderSettings, YearSource};
use crate::core::model::{fit_allowed_amount, Predictor, RegressionFit};
use crate::core::panel::{filter_balanced, PanelStats};
use crate::core::record::Observation;
use crate::utils::file_utils::{get_file_provenance, SourceProvenance};
use crate::utils::output_formatter::{format_money, format_stat};

/// Pipeline stage names, in order
pub const STAGES: [&str; 6] = [
    "Loading sources",
    "Balancing panel",
    "Filtering cohort",
    "Aggregating charges",
    "Fitting regression",
    "Correlating years",
];

/// Row and provider counts after each filtering stage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageCounts {
    pub rows_loaded: usize,
    pub panel: PanelStats,
    pub balanced_rows: usize,
    pub cohort_rows: usize,
    pub cohort_providers: usize,
}

/// Everything the report renders
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: String,
    pub config: ReportConfig,
    pub sources: Vec<SourceProvenance>,
    pub counts: StageCounts,
    pub charge_summary: Vec<ChargeSummaryRow>,
    pub specialty_summary: SpecialtySummary,
    pub regression: Option<RegressionFit>,
    /// Why the regression could not be estimated, when it could not
    pub regression_error: Option<String>,
    pub correlation: CorrelationResult,
    /// Plain-language answers derived from the results
    pub findings: Vec<String>,
}

/// Runs the whole report over two yearly extracts
pub struct ReportAnalyzer {
    config: ReportConfig,
    settings: ReaderSettings,
    criteria: CohortCriteria,
    progress: Option<ProgressBar>,
}

impl ReportAnalyzer {
    /// Create a new ReportAnalyzer instance
    ///
    /// # Arguments
    ///
    /// * `config` - Validated or unvalidated report configuration
    ///
    /// # Returns
    ///
    /// The analyzer, or an error if the configuration is unusable
    pub fn new(config: &ReportConfig) -> Result<Self> {
        config.validate().context("Invalid report configuration")?;
        let settings = ReaderSettings::from_config(config)?;
        let criteria =
            CohortCriteria::from_config(config).context("Invalid credential token")?;

        Ok(Self {
            config: config.clone(),
            settings,
            criteria,
            progress: None,
        })
    }

    /// Report stage progress on `progress`
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    fn stage(&self, index: usize) {
        info!("{}", STAGES[index]);
        if let Some(pb) = &self.progress {
            pb.set_position(index as u64);
            pb.set_message(STAGES[index]);
        }
    }

    /// Load both files and run the full report
    ///
    /// # Arguments
    ///
    /// * `first` - Extract for the first configured year
    /// * `second` - Extract for the second configured year
    pub fn analyze_files(&self, first: &Path, second: &Path) -> Result<AnalysisReport> {
        self.stage(0);
        let (first_year, second_year) = self.config.years();

        let inputs = [
            YearSource::new(first, first_year),
            YearSource::new(second, second_year),
        ];
        let rows = load_sources(&inputs, &self.settings).context("Failed to load sources")?;

        let sources = inputs
            .iter()
            .map(|input| {
                let count = rows.iter().filter(|r| r.year == input.year).count();
                get_file_provenance(&input.path, input.year, count)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(self.analyze_rows(&rows, sources))
    }

    /// Run every stage after loading over an already combined table
    pub fn analyze_rows(&self, rows: &[Observation], sources: Vec<SourceProvenance>) -> AnalysisReport {
        self.stage(1);
        let balanced = filter_balanced(rows, self.config.years());

        self.stage(2);
        let cohort = filter_cohort(&balanced, &self.criteria);
        if cohort.is_empty() {
            warn!("Cohort is empty; statistics will be empty or NaN");
        }

        self.stage(3);
        let charges = charge_summary(&cohort);
        let specialties = specialty_summary(&cohort, self.config.top_specialties);

        self.stage(4);
        let (regression, regression_error) = match fit_allowed_amount(&cohort) {
            Ok(fit) => (Some(fit), None),
            Err(e) => {
                warn!("Regression not estimable: {}", e);
                (None, Some(e.to_string()))
            }
        };

        self.stage(5);
        let correlation = correlate_across_years(&cohort);

        if let Some(pb) = &self.progress {
            pb.set_position(STAGES.len() as u64);
        }

        let mut report = AnalysisReport {
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            config: self.config.clone(),
            sources,
            counts: StageCounts {
                rows_loaded: rows.len(),
                panel: balanced.stats.clone(),
                balanced_rows: balanced.len(),
                cohort_rows: cohort.len(),
                cohort_providers: cohort.provider_count(),
            },
            charge_summary: charges,
            specialty_summary: specialties,
            regression,
            regression_error,
            correlation,
            findings: Vec::new(),
        };
        report.findings = findings(&report);
        report
    }
}

/// Plain-language statements answering the report's four questions
pub fn findings(report: &AnalysisReport) -> Vec<String> {
    let mut out = Vec::new();
    let (first, second) = report.config.years();

    let mut jurisdictions: Vec<&str> = report
        .charge_summary
        .iter()
        .map(|r| r.jurisdiction.as_str())
        .collect();
    jurisdictions.dedup();
    for jurisdiction in jurisdictions {
        let mean_in = |year: i32| {
            report
                .charge_summary
                .iter()
                .find(|r| r.jurisdiction == jurisdiction && r.year == year)
                .map(|r| (r.submitted.mean, r.allowed.mean))
        };
        if let (Some(a), Some(b)) = (mean_in(first), mean_in(second)) {
            out.push(format!(
                "In {}, the mean submitted charge went from {} in {} to {} in {}; \
                 the mean allowed amount went from {} to {}.",
                jurisdiction,
                format_money(a.0),
                first,
                format_money(b.0),
                second,
                format_money(a.1),
                format_money(b.1)
            ));
        }
    }

    for jurisdiction in report.specialty_summary.jurisdictions() {
        let mut largest: Option<&SpecialtyShare> = None;
        for share in report.specialty_summary.for_jurisdiction(jurisdiction) {
            if largest.map_or(true, |best| share.count > best.count) {
                largest = Some(share);
            }
        }
        if let Some(share) = largest {
            out.push(format!(
                "{} is the largest of the top specialties in {} ({:.1}% of their rows).",
                share.specialty, jurisdiction, share.percentage
            ));
        }
    }

    match (&report.regression, &report.regression_error) {
        (Some(fit), _) => match fit.top_specialty() {
            Some(top) => out.push(format!(
                "Holding jurisdiction and year fixed, {} has the highest allowed amount: \
                 {} above {} (p = {}).",
                specialty_name(&top.term),
                format_money(top.estimate),
                fit.specialty_reference,
                format_stat(top.p_value, 4)
            )),
            None => out.push(format!(
                "Only one specialty ({}) is present, so no specialty comparison is possible.",
                fit.specialty_reference
            )),
        },
        (None, Some(error)) => out.push(format!("The regression could not be estimated: {}.", error)),
        (None, None) => {}
    }

    let c = &report.correlation;
    out.push(format!(
        "The Pearson correlation between {} {} and {} {} is {} over {} providers.",
        c.x_year,
        c.x_field.label().to_lowercase(),
        c.y_year,
        c.y_field.label().to_lowercase(),
        format_stat(c.coefficient, 3),
        c.complete_pairs
    ));

    out
}

fn specialty_name(term: &Predictor) -> String {
    match term {
        Predictor::Specialty(level) => level.clone(),
        other => other.to_string(),
    }
}
