/// Core module for the charges report
///
/// This module contains the pipeline stages: loading the yearly extracts,
/// building the balanced panel, selecting the cohort, and the statistics
/// computed over it.

pub mod aggregate;
pub mod analyzer;
pub mod cohort;
pub mod correlate;
pub mod loader;
pub mod model;
pub mod panel;
pub mod patterns;
pub mod record;
