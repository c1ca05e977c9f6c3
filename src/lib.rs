/// Physician Charges - a two-year panel report over Medicare billing extracts
///
/// This library loads two yearly provider extracts, keeps providers present in
/// both years, narrows them to MD-credentialed providers in the target
/// jurisdictions, and computes charge summaries, specialty shares, an
/// allowed-amount regression and a cross-year correlation.

pub mod config;
pub mod core;
pub mod utils;

// Re-export main types for convenience
pub use crate::config::ReportConfig;
pub use crate::core::analyzer::{AnalysisReport, ReportAnalyzer};
pub use crate::core::patterns::normalize_credential;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the report over two files with the default configuration
///
/// This is a convenience function for simple use cases.
///
/// # Arguments
///
/// * `first` - Extract for the first year (2022 by default)
/// * `second` - Extract for the second year (2023 by default)
///
/// # Returns
///
/// The finished report
pub fn analyze_files<P: AsRef<std::path::Path>>(
    first: P,
    second: P,
) -> anyhow::Result<AnalysisReport> {
    let analyzer = ReportAnalyzer::new(&ReportConfig::default())?;
    analyzer.analyze_files(first.as_ref(), second.as_ref())
}
