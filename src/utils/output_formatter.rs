//! Output formatter for the report
//!
//! This module handles formatting and exporting the report in various formats,
//! including console output, JSON, HTML, and CSV.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use handlebars::Handlebars;
use serde_json::{json, Value};

use crate::core::aggregate::Moments;
use crate::core::analyzer::AnalysisReport;

/// Slice colours for the specialty pie charts
const PALETTE: [&str; 6] = ["#3498db", "#e67e22", "#2ecc71", "#9b59b6", "#e74c3c", "#95a5a6"];

/// Format a dollar amount with thousands separators, `n/a` when undefined
pub fn format_money(value: f64) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

/// Format a statistic with `decimals` places, `n/a` when undefined
pub fn format_stat(value: f64, decimals: usize) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else {
        format!("{:.*}", decimals, value)
    }
}

fn format_p(value: f64) -> String {
    if value.is_finite() && value < 0.0001 {
        "<0.0001".to_string()
    } else {
        format_stat(value, 4)
    }
}

fn mean_sd(moments: &Moments) -> String {
    format!("{} ± {}", format_money(moments.mean), format_money(moments.std_dev))
}

/// Format the report for console output
///
/// # Arguments
///
/// * `report` - The finished report
/// * `use_markdown` - Whether to wrap output in markdown triple backticks
///
/// # Returns
///
/// Formatted string for console output
pub fn format_report(report: &AnalysisReport, use_markdown: &bool) -> String {
    let mut output = String::new();

    if *use_markdown {
        output.push_str("```\n");
    }

    output.push_str(&format!("{}\n", "Sources".yellow().bold()));
    for source in &report.sources {
        output.push_str(&format!(
            "  {} ({}): {} rows, sha256 {}\n",
            source.file_name.cyan(),
            source.year,
            source.rows,
            &source.sha256[..source.sha256.len().min(12)]
        ));
    }
    let counts = &report.counts;
    output.push_str(&format!(
        "  Rows loaded: {}, balanced providers: {} of {}, cohort rows: {} ({} providers)\n\n",
        counts.rows_loaded,
        counts.panel.balanced_providers,
        counts.panel.providers_seen,
        counts.cohort_rows,
        counts.cohort_providers
    ));

    output.push_str(&format!("{}\n", "Charges by jurisdiction and year".yellow().bold()));
    if report.charge_summary.is_empty() {
        output.push_str("  No cohort rows.\n");
    }
    for row in &report.charge_summary {
        output.push_str(&format!(
            "  {} {}: submitted {}, allowed {} (n = {})\n",
            row.jurisdiction.cyan().bold(),
            row.year,
            mean_sd(&row.submitted),
            mean_sd(&row.allowed),
            row.rows
        ));
    }
    output.push('\n');

    output.push_str(&format!("{}\n", "Top specialties by jurisdiction".yellow().bold()));
    for jurisdiction in report.specialty_summary.jurisdictions() {
        output.push_str(&format!("  {}\n", jurisdiction.cyan().bold()));
        for share in report.specialty_summary.for_jurisdiction(jurisdiction) {
            output.push_str(&format!(
                "    - {}: {} ({:.1}%)\n",
                share.specialty, share.count, share.percentage
            ));
        }
    }
    output.push('\n');

    output.push_str(&format!("{}\n", "Allowed amount regression".yellow().bold()));
    match (&report.regression, &report.regression_error) {
        (Some(fit), _) => {
            output.push_str(&format!(
                "  n = {}, R² = {}, adjusted R² = {}, references: {} / {}\n",
                fit.observations,
                format_stat(fit.r_squared, 4),
                format_stat(fit.adj_r_squared, 4),
                fit.jurisdiction_reference,
                fit.specialty_reference
            ));
            output.push_str(&format!(
                "    {:<40} {:>14} {:>12} {:>9} {:>9}\n",
                "Term", "Estimate", "Std. error", "t", "p"
            ));
            for c in &fit.coefficients {
                output.push_str(&format!(
                    "    {:<40} {:>14.2} {:>12.2} {:>9} {:>9}\n",
                    c.term.to_string(),
                    c.estimate,
                    c.std_error,
                    format_stat(c.t_value, 3),
                    format_p(c.p_value)
                ));
            }
        }
        (None, Some(error)) => output.push_str(&format!("  Not estimable: {}\n", error)),
        (None, None) => {}
    }
    output.push('\n');

    let c = &report.correlation;
    output.push_str(&format!("{}\n", "Cross-year correlation".yellow().bold()));
    output.push_str(&format!(
        "  r({} {}, {} {}) = {} over {} pairs (p = {})\n\n",
        c.x_year,
        c.x_field.label(),
        c.y_year,
        c.y_field.label(),
        format_stat(c.coefficient, 4),
        c.complete_pairs,
        format_p(c.p_value)
    ));

    output.push_str(&format!("{}\n", "Findings".yellow().bold()));
    for finding in &report.findings {
        output.push_str(&format!("  - {}\n", finding));
    }

    if *use_markdown {
        output.push_str("```\n");
    }

    output
}

/// Short summary for `--summary-only`
pub fn create_summary(report: &AnalysisReport) -> String {
    let mut output = String::new();
    output.push_str(&format!("{}\n\n", "Report Summary".yellow().bold()));
    output.push_str(&format!("Cohort rows: {}\n", report.counts.cohort_rows));
    output.push_str(&format!("Cohort providers: {}\n\n", report.counts.cohort_providers));
    for (i, finding) in report.findings.iter().enumerate() {
        output.push_str(&format!("{}. {}\n", i + 1, finding));
    }
    output
}

/// Export the report to a JSON file
///
/// Undefined statistics are written as `null`.
pub fn export_report_json(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create JSON output file: {}", output_path.display()))?;

    serde_json::to_writer_pretty(file, report).context("Failed to write JSON data")?;

    Ok(())
}

/// Export the coefficient table to a CSV file
pub fn create_csv_report(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create CSV output file: {}", output_path.display()))?;

    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(["Term", "Estimate", "Std. error", "t", "p"])
        .context("Failed to write CSV header")?;

    if let Some(fit) = &report.regression {
        for c in &fit.coefficients {
            writer
                .write_record([
                    c.term.to_string(),
                    c.estimate.to_string(),
                    c.std_error.to_string(),
                    c.t_value.to_string(),
                    c.p_value.to_string(),
                ])
                .context("Failed to write CSV record")?;
        }
    }

    writer.flush().context("Failed to flush CSV writer")?;

    Ok(())
}

const HTML_TEMPLATE: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Physician Charges Report</title>
    <style>
        body {
            font-family: Arial, sans-serif;
            line-height: 1.6;
            color: #333;
            max-width: 1200px;
            margin: 0 auto;
            padding: 20px;
        }
        h1 {
            color: #2c3e50;
            border-bottom: 2px solid #3498db;
            padding-bottom: 10px;
        }
        h2 {
            color: #2980b9;
            margin-top: 30px;
        }
        table {
            border-collapse: collapse;
            margin-bottom: 20px;
        }
        th, td {
            border-bottom: 1px solid #eee;
            padding: 4px 12px;
            text-align: right;
        }
        th:first-child, td:first-child {
            text-align: left;
        }
        .timestamp {
            color: #7f8c8d;
            font-size: 0.9em;
            margin-bottom: 30px;
        }
        .summary {
            background-color: #e8f4f8;
            padding: 15px;
            border-radius: 5px;
            margin-bottom: 30px;
        }
        .bar-row {
            display: flex;
            align-items: center;
            margin: 4px 0;
        }
        .bar-label {
            width: 220px;
        }
        .bar {
            height: 18px;
            margin-right: 8px;
        }
        .submitted { background-color: #3498db; }
        .allowed { background-color: #e67e22; }
        .pies {
            display: flex;
            gap: 40px;
        }
        .pie {
            width: 180px;
            height: 180px;
            border-radius: 50%;
        }
        .swatch {
            display: inline-block;
            width: 12px;
            height: 12px;
            margin-right: 6px;
        }
    </style>
</head>
<body>
    <h1>Physician Charges Report</h1>
    <div class="timestamp">Generated on: {{generated_at}}</div>

    <div class="summary">
        <h2>Findings</h2>
        <ul>
            {{#each findings}}
            <li>{{this}}</li>
            {{/each}}
        </ul>
        <p>Rows loaded: {{counts.rows_loaded}}; balanced providers: {{counts.panel.balanced_providers}}
           of {{counts.panel.providers_seen}}; cohort: {{counts.cohort_rows}} rows,
           {{counts.cohort_providers}} providers.</p>
    </div>

    <h2>Charges by jurisdiction and year</h2>
    <table>
        <tr><th>Jurisdiction</th><th>Year</th><th>Rows</th><th>Submitted (mean ± SD)</th><th>Allowed (mean ± SD)</th></tr>
        {{#each charges}}
        <tr><td>{{jurisdiction}}</td><td>{{year}}</td><td>{{rows}}</td><td>{{submitted}}</td><td>{{allowed}}</td></tr>
        {{/each}}
    </table>
    {{#each charges}}
    <div class="bar-row">
        <span class="bar-label">{{jurisdiction}} {{year}} submitted</span>
        <div class="bar submitted" style="width: {{submitted_width}}%"></div>{{submitted}}
    </div>
    <div class="bar-row">
        <span class="bar-label">{{jurisdiction}} {{year}} allowed</span>
        <div class="bar allowed" style="width: {{allowed_width}}%"></div>{{allowed}}
    </div>
    {{/each}}

    <h2>Top specialties by jurisdiction</h2>
    <div class="pies">
        {{#each pies}}
        <div>
            <h3>{{jurisdiction}}</h3>
            <div class="pie" style="background: {{gradient}}"></div>
            <ul>
                {{#each slices}}
                <li><span class="swatch" style="background: {{color}}"></span>{{specialty}}: {{count}} ({{percentage}}%)</li>
                {{/each}}
            </ul>
        </div>
        {{/each}}
    </div>

    <h2>Allowed amount regression</h2>
    {{#if regression}}
    <p>n = {{regression.observations}}, R² = {{regression.r_squared}}, adjusted R² = {{regression.adj_r_squared}}.
       Reference levels: {{regression.jurisdiction_reference}} / {{regression.specialty_reference}}.</p>
    <table>
        <tr><th>Term</th><th>Estimate</th><th>Std. error</th><th>t</th><th>p</th></tr>
        {{#each regression.coefficients}}
        <tr><td>{{term}}</td><td>{{estimate}}</td><td>{{std_error}}</td><td>{{t_value}}</td><td>{{p_value}}</td></tr>
        {{/each}}
    </table>
    {{else}}
    <p>Not estimable: {{regression_error}}</p>
    {{/if}}

    <h2>Cross-year correlation</h2>
    <p>{{correlation}}</p>

    <h2>Sources</h2>
    <table>
        <tr><th>File</th><th>Year</th><th>Rows</th><th>Bytes</th><th>Modified</th><th>SHA-256</th></tr>
        {{#each sources}}
        <tr><td>{{file_name}}</td><td>{{year}}</td><td>{{rows}}</td><td>{{size_bytes}}</td><td>{{modified}}</td><td>{{sha256}}</td></tr>
        {{/each}}
    </table>
</body>
</html>
"#;

/// CSS conic-gradient for one jurisdiction's specialty shares
fn pie_gradient(percentages: &[f64]) -> String {
    let total: f64 = percentages.iter().sum();
    if total <= 0.0 {
        return "#eee".to_string();
    }
    let mut start = 0.0;
    let stops: Vec<String> = percentages
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let end = start + p / total * 100.0;
            let stop = format!("{} {:.1}% {:.1}%", PALETTE[i % PALETTE.len()], start, end);
            start = end;
            stop
        })
        .collect();
    format!("conic-gradient({})", stops.join(", "))
}

/// Build the data handed to the HTML template
fn html_data(report: &AnalysisReport) -> Value {
    let max_mean = report
        .charge_summary
        .iter()
        .flat_map(|r| [r.submitted.mean, r.allowed.mean])
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);
    let width = |v: f64| {
        if max_mean > 0.0 && v.is_finite() {
            format!("{:.1}", (v / max_mean * 70.0).max(0.0))
        } else {
            "0".to_string()
        }
    };

    let charges: Vec<Value> = report
        .charge_summary
        .iter()
        .map(|r| {
            json!({
                "jurisdiction": r.jurisdiction,
                "year": r.year,
                "rows": r.rows,
                "submitted": mean_sd(&r.submitted),
                "allowed": mean_sd(&r.allowed),
                "submitted_width": width(r.submitted.mean),
                "allowed_width": width(r.allowed.mean),
            })
        })
        .collect();

    let pies: Vec<Value> = report
        .specialty_summary
        .jurisdictions()
        .into_iter()
        .map(|jurisdiction| {
            let shares: Vec<_> = report.specialty_summary.for_jurisdiction(jurisdiction).collect();
            let percentages: Vec<f64> = shares.iter().map(|s| s.percentage).collect();
            let slices: Vec<Value> = shares
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    json!({
                        "specialty": s.specialty,
                        "count": s.count,
                        "percentage": format!("{:.1}", s.percentage),
                        "color": PALETTE[i % PALETTE.len()],
                    })
                })
                .collect();
            json!({
                "jurisdiction": jurisdiction,
                "gradient": pie_gradient(&percentages),
                "slices": slices,
            })
        })
        .collect();

    let regression = report.regression.as_ref().map(|fit| {
        json!({
            "observations": fit.observations,
            "r_squared": format_stat(fit.r_squared, 4),
            "adj_r_squared": format_stat(fit.adj_r_squared, 4),
            "jurisdiction_reference": fit.jurisdiction_reference,
            "specialty_reference": fit.specialty_reference,
            "coefficients": fit.coefficients.iter().map(|c| json!({
                "term": c.term.to_string(),
                "estimate": format_stat(c.estimate, 2),
                "std_error": format_stat(c.std_error, 2),
                "t_value": format_stat(c.t_value, 3),
                "p_value": format_p(c.p_value),
            })).collect::<Vec<_>>(),
        })
    });

    let c = &report.correlation;
    let correlation = format!(
        "r = {} between {} {} and {} {} over {} providers (p = {}).",
        format_stat(c.coefficient, 4),
        c.x_year,
        c.x_field.label().to_lowercase(),
        c.y_year,
        c.y_field.label().to_lowercase(),
        c.complete_pairs,
        format_p(c.p_value)
    );

    json!({
        "generated_at": report.generated_at,
        "findings": report.findings,
        "counts": report.counts,
        "charges": charges,
        "pies": pies,
        "regression": regression,
        "regression_error": report.regression_error,
        "correlation": correlation,
        "sources": report.sources,
    })
}

/// Create an HTML report
///
/// # Arguments
///
/// * `report` - The finished report
/// * `output_path` - Path where the HTML file will be written
///
/// # Returns
///
/// Result indicating success or failure
pub fn create_html_report(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    let mut handlebars = Handlebars::new();
    handlebars
        .register_template_string("report", HTML_TEMPLATE)
        .context("Failed to register HTML template")?;

    let html = handlebars
        .render("report", &html_data(report))
        .context("Failed to render HTML template")?;

    let mut file = File::create(output_path)
        .context(format!("Failed to create HTML output file: {}", output_path.display()))?;

    file.write_all(html.as_bytes())
        .context("Failed to write HTML data")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0.0), "$0.00");
        assert_eq!(format_money(1234567.891), "$1,234,567.89");
        assert_eq!(format_money(-20.5), "-$20.50");
        assert_eq!(format_money(999.999), "$1,000.00");
        assert_eq!(format_money(f64::NAN), "n/a");
    }

    #[test]
    fn test_format_stat_and_p() {
        assert_eq!(format_stat(0.123456, 3), "0.123");
        assert_eq!(format_stat(f64::NAN, 3), "n/a");
        assert_eq!(format_p(0.00001), "<0.0001");
        assert_eq!(format_p(0.5), "0.5000");
    }

    #[test]
    fn test_pie_gradient_covers_circle() {
        let gradient = pie_gradient(&[50.0, 33.3, 16.7]);
        assert!(gradient.starts_with("conic-gradient(#3498db 0.0% 50.0%"));
        assert!(gradient.ends_with("100.0%)"));
        assert_eq!(pie_gradient(&[]), "#eee");
    }
}
