/// Integration tests for the charges report
///
/// These tests write small extracts to a temporary directory and verify that
/// the full pipeline and the exporters work together.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use physician_charges::core::model::Predictor;
use physician_charges::utils::output_formatter;
use physician_charges::{analyze_files, ReportAnalyzer, ReportConfig};

const HEADER: &str = "Rndrng_NPI,Rndrng_Prvdr_Last_Org_Name,Rndrng_Prvdr_Crdntls,Rndrng_Prvdr_State_Abrvtn,Rndrng_Prvdr_Type,Tot_Sbmtd_Chrg,Tot_Mdcr_Alowd_Amt";

const FIRST_YEAR: &str = "\
1001,Smith,MD,RI,Cardiology,1000,400
1002,Jones,M.D.,NH,Cardiology,900,380
1003,Brown,MD,RI,Family Practice,300,150
1004,Green,md,NH,Family Practice,280,120
1005,White,DO,RI,Cardiology,800,350
1006,Black,MD,CA,Cardiology,1200,500
1007,Gray,MD,RI,Cardiology,700,300
";

const SECOND_YEAR: &str = "\
1001,Smith,MD,RI,Cardiology,1100,450
1002,Jones,M.D.,NH,Cardiology,950,390
1003,Brown,MD,RI,Family Practice,320,170
1004,Green,md,NH,Family Practice,310,135
1005,White,DO,RI,Cardiology,820,360
1006,Black,MD,CA,Cardiology,1250,520
";

fn write_extract(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("{}\n{}", HEADER, body)).expect("Failed to write extract");
    path
}

fn fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let first = write_extract(dir.path(), "2022.csv", FIRST_YEAR);
    let second = write_extract(dir.path(), "2023.csv", SECOND_YEAR);
    (dir, first, second)
}

#[test]
fn test_full_report() {
    let (_dir, first, second) = fixture();
    let report = analyze_files(&first, &second).expect("Failed to run report");

    assert_eq!(report.counts.rows_loaded, 13);
    assert_eq!(report.counts.panel.providers_seen, 7);
    assert_eq!(report.counts.panel.balanced_providers, 6);
    assert_eq!(report.counts.cohort_rows, 8);
    assert_eq!(report.counts.cohort_providers, 4);

    // NH and RI, two years each
    assert_eq!(report.charge_summary.len(), 4);
    let ri_2022 = report
        .charge_summary
        .iter()
        .find(|r| r.jurisdiction == "RI" && r.year == 2022)
        .expect("RI 2022 row");
    assert_eq!(ri_2022.rows, 2);
    assert!((ri_2022.submitted.mean - 650.0).abs() < 1e-9);
    assert!((ri_2022.allowed.mean - 275.0).abs() < 1e-9);

    for jurisdiction in ["NH", "RI"] {
        let total: f64 = report
            .specialty_summary
            .for_jurisdiction(jurisdiction)
            .map(|s| s.percentage)
            .sum();
        assert!((total - 100.0).abs() < 0.2);
    }

    let fit = report.regression.as_ref().expect("Regression should be estimable");
    assert_eq!(fit.observations, 8);
    assert_eq!(fit.coefficients.len(), 4);
    assert_eq!(fit.jurisdiction_reference, "NH");
    assert_eq!(fit.specialty_reference, "Cardiology");
    let family = fit
        .coefficient(&Predictor::Specialty("Family Practice".to_string()))
        .expect("Family Practice term");
    assert!(family.estimate < 0.0);

    assert_eq!(report.correlation.complete_pairs, 4);
    assert!(report.correlation.coefficient > 0.9);

    assert_eq!(report.sources.len(), 2);
    assert_eq!(report.sources[0].rows, 7);
    assert_eq!(report.sources[1].rows, 6);
    assert_eq!(report.sources[0].sha256.len(), 64);
    assert!(!report.findings.is_empty());
}

#[test]
fn test_missing_file_is_an_error() {
    let (dir, first, _) = fixture();
    let missing = dir.path().join("missing.csv");
    assert!(analyze_files(&first, &missing).is_err());
}

#[test]
fn test_config_narrows_jurisdictions() {
    let (_dir, first, second) = fixture();
    let config = ReportConfig {
        jurisdictions: vec!["RI".to_string()],
        ..ReportConfig::default()
    };
    let report = ReportAnalyzer::new(&config)
        .expect("Valid configuration")
        .analyze_files(&first, &second)
        .expect("Failed to run report");

    assert_eq!(report.counts.cohort_providers, 2);
    assert!(report.charge_summary.iter().all(|r| r.jurisdiction == "RI"));
}

#[test]
fn test_exports() {
    let (dir, first, second) = fixture();
    let report = analyze_files(&first, &second).expect("Failed to run report");

    let json_path = dir.path().join("report.json");
    output_formatter::export_report_json(&report, &json_path).expect("JSON export");
    let json: Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).expect("Valid JSON");
    assert_eq!(json["counts"]["cohort_rows"], 8);
    assert_eq!(json["config"]["jurisdictions"][0], "RI");
    assert!(json["regression"]["coefficients"].is_array());

    let html_path = dir.path().join("report.html");
    output_formatter::create_html_report(&report, &html_path).expect("HTML export");
    let html = fs::read_to_string(&html_path).unwrap();
    assert!(html.contains("<title>Physician Charges Report</title>"));
    assert!(html.contains("conic-gradient("));
    assert!(html.contains("Specialty: Family Practice"));

    let csv_path = dir.path().join("coefficients.csv");
    output_formatter::create_csv_report(&report, &csv_path).expect("CSV export");
    let mut reader = csv::Reader::from_path(&csv_path).unwrap();
    let terms: Vec<String> = reader
        .records()
        .map(|r| r.unwrap()[0].to_string())
        .collect();
    assert_eq!(
        terms,
        vec!["Intercept", "Jurisdiction: RI", "Specialty: Family Practice", "Year"]
    );
}

#[test]
fn test_console_report_mentions_every_section() {
    let (_dir, first, second) = fixture();
    let report = analyze_files(&first, &second).expect("Failed to run report");

    let text = output_formatter::format_report(&report, &true);
    assert!(text.starts_with("```\n"));
    assert!(text.contains("Family Practice"));
    assert!(text.contains("2022.csv"));

    let summary = output_formatter::create_summary(&report);
    assert!(summary.contains("Cohort providers: 4"));
}
