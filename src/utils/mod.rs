/// Utility modules for the charges report
///
/// This module contains helpers for source file provenance and for formatting
/// and exporting the finished report.

pub mod file_utils;
pub mod output_formatter;
