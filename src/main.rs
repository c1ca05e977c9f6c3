/// Physician Charges - two-year panel report over Medicare billing extracts
///
/// The main entry point for the report. It parses command-line arguments,
/// merges them over the configuration file, runs the pipeline and writes the
/// requested outputs.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, LevelFilter};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use physician_charges::core::analyzer::{AnalysisReport, ReportAnalyzer, STAGES};
use physician_charges::utils::file_utils::resolve_output_path;
use physician_charges::utils::output_formatter;
use physician_charges::ReportConfig;

/// Command line argument structure
#[derive(Parser, Debug)]
#[command(
    name = "physician_charges",
    version,
    about = "Two-year panel report over Medicare physician billing extracts",
    long_about = "Loads two yearly provider extracts and, for MD-credentialed providers \
present in both years in the target jurisdictions, reports:
- Mean and standard deviation of submitted charges and allowed amounts
- The share of the most frequent specialties per jurisdiction
- Which specialty has the highest allowed amount, adjusting for jurisdiction and year
- The correlation between first-year submitted and second-year allowed amounts"
)]
struct Args {
    /// Extract for the first year
    #[arg(name = "first_file")]
    first_file: PathBuf,

    /// Extract for the second year
    #[arg(name = "second_file")]
    second_file: PathBuf,

    /// Year of the first file (default: 2022)
    #[arg(long = "first-year")]
    first_year: Option<i32>,

    /// Year of the second file (default: 2023)
    #[arg(long = "second-year")]
    second_year: Option<i32>,

    /// Target jurisdiction code (can be used multiple times, default: RI and NH)
    #[arg(long = "jurisdiction", action = ArgAction::Append)]
    jurisdiction: Option<Vec<String>>,

    /// Number of most frequent specialties to break down (default: 3)
    #[arg(long = "top-specialties")]
    top_specialties: Option<usize>,

    /// Output in markdown format (wrapped in triple backticks)
    #[arg(long = "md", action = ArgAction::SetTrue)]
    md: bool,

    /// Export the report to a JSON file
    #[arg(long = "json")]
    json: Option<PathBuf>,

    /// Export the report to an HTML file
    #[arg(long = "html")]
    html: Option<PathBuf>,

    /// Export the coefficient table to a CSV file
    #[arg(long = "csv")]
    csv: Option<PathBuf>,

    /// Directory to store all output files
    #[arg(long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Suppress terminal output
    #[arg(long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Show only summary information
    #[arg(long = "summary-only", action = ArgAction::SetTrue)]
    summary_only: bool,

    /// Path to configuration file
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Set logging level (default: INFO)
    #[arg(long = "log-level", default_value = "info")]
    log_level: LevelFilter,

    /// Log file path (default: physician_charges.log)
    #[arg(long = "log-file", default_value = "physician_charges.log")]
    log_file: String,
}

/// Main entry point function
fn main() -> Result<()> {
    let start_time = Instant::now();

    let args = Args::parse();

    let _ = setup_logging(&args);

    let config = apply_overrides(load_config(&args.config), &args);

    let analyzer = match ReportAnalyzer::new(&config) {
        Ok(analyzer) => analyzer,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red(), e);
            process::exit(2);
        }
    };

    if !args.quiet {
        println!(
            "\n{} {} ({}) and {} ({})...",
            "Analyzing".bold(),
            args.first_file.display(),
            config.first_year,
            args.second_file.display(),
            config.second_year
        );
    }

    let progress_bar = if !args.quiet {
        let pb = ProgressBar::new(STAGES.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let analyzer = match &progress_bar {
        Some(pb) => analyzer.with_progress(pb.clone()),
        None => analyzer,
    };

    let report = match analyzer.analyze_files(&args.first_file, &args.second_file) {
        Ok(report) => report,
        Err(e) => {
            if let Some(pb) = &progress_bar {
                pb.abandon();
            }
            error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red(), e);
            process::exit(1);
        }
    };

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Report complete");
    }

    export_report(&report, &args)?;

    if !args.quiet {
        let elapsed_time = start_time.elapsed();
        println!("\n{}", "Report Complete".bold());
        println!("{} {}", "Rows loaded:".green(), report.counts.rows_loaded);
        println!("{} {}", "Cohort rows:".green(), report.counts.cohort_rows);
        println!(
            "{} {:.2} seconds",
            "Time elapsed:".green(),
            elapsed_time.as_secs_f64()
        );
        println!("\n{}", "=".repeat(80).bold());

        if args.summary_only {
            println!("{}", output_formatter::create_summary(&report));
        } else {
            println!("{}", output_formatter::format_report(&report, &args.md));
        }
    }

    Ok(())
}

/// Set up logging with file output
fn setup_logging(args: &Args) -> Result<()> {
    let mut builder = env_logger::Builder::new();

    builder.filter_level(args.log_level);

    builder.format(|buf, record| {
        use chrono::Local;
        use std::io::Write;
        writeln!(
            buf,
            "{} - {} - {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Ok(file) = File::create(&args.log_file) {
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;

    Ok(())
}

/// Load configuration from file if provided, falling back to defaults
fn load_config(config_path: &Option<PathBuf>) -> ReportConfig {
    match config_path {
        Some(path) if !path.exists() => {
            error!("Configuration file not found: {}", path.display());
            ReportConfig::default()
        }
        Some(path) => match ReportConfig::from_file(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                error!("Invalid configuration file {}: {}", path.display(), e);
                ReportConfig::default()
            }
        },
        None => ReportConfig::default(),
    }
}

/// Apply command-line flags on top of the loaded configuration
fn apply_overrides(mut config: ReportConfig, args: &Args) -> ReportConfig {
    if let Some(year) = args.first_year {
        config.first_year = year;
    }
    if let Some(year) = args.second_year {
        config.second_year = year;
    }
    if let Some(jurisdictions) = &args.jurisdiction {
        config.jurisdictions = jurisdictions.iter().map(|j| j.trim().to_uppercase()).collect();
    }
    if let Some(top) = args.top_specialties {
        config.top_specialties = top;
    }
    config
}

/// Write every requested export
fn export_report(report: &AnalysisReport, args: &Args) -> Result<()> {
    let output_dir = args.output_dir.as_deref();
    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    if let Some(json_path) = &args.json {
        let path = resolve_output_path(output_dir, json_path);
        output_formatter::export_report_json(report, &path)?;
        log_export("JSON", &path);
    }

    if let Some(html_path) = &args.html {
        let path = resolve_output_path(output_dir, html_path);
        output_formatter::create_html_report(report, &path)?;
        log_export("HTML", &path);
    }

    if let Some(csv_path) = &args.csv {
        let path = resolve_output_path(output_dir, csv_path);
        output_formatter::create_csv_report(report, &path)?;
        log_export("CSV", &path);
    }

    Ok(())
}

fn log_export(kind: &str, path: &Path) {
    info!("Wrote {} report to {}", kind, path.display());
}
