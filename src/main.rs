//! CLI entry point for the assessment ingestion tool.
//!
//! Provides subcommands for running the full per-school pipeline, inspecting
//! a single workbook, and checking how a field value normalizes.

use anyhow::{Context, Result};
use assessment_ingest::config::PipelineConfig;
use assessment_ingest::output::print_json;
use assessment_ingest::pipeline;
use clap::{Parser, Subcommand, ValueEnum};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "assessment_ingest")]
#[command(about = "Ingest assessment spreadsheets into per-student score data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every configured school
    Run {
        /// JSON config file (falls back to INGEST_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Extract and aggregate a single workbook, printing the test summary
    Inspect {
        /// Workbook to inspect
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Roster file to attribute students against
        #[arg(short, long)]
        roster: Option<PathBuf>,

        /// JSON config file for sheet names, policies and subject rules
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the canonical form of a field value
    Normalize {
        #[arg(value_enum)]
        kind: FieldKind,

        value: String,

        /// JSON config file with extra subject rules
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FieldKind {
    Name,
    Class,
    Subject,
}

fn load_config(path: Option<PathBuf>) -> Result<PipelineConfig> {
    let path = path.or_else(|| std::env::var("INGEST_CONFIG").ok().map(PathBuf::from));
    match path {
        Some(path) => PipelineConfig::load(&path),
        None => Ok(PipelineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/assessment_ingest.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("assessment_ingest.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config = load_config(config)?;
            if config.schools.is_empty() {
                info!("No schools configured, nothing to do");
                return Ok(());
            }
            let summary = pipeline::run(&config).await?;

            let failed: usize = summary.schools.iter().map(|s| s.files_failed).sum();
            let parsed: usize = summary.schools.iter().map(|s| s.files_parsed).sum();
            info!(
                schools = summary.schools.len(),
                parsed,
                failed,
                output_dir = %config.output_dir.display(),
                "Run finished"
            );
        }
        Commands::Inspect {
            file,
            roster,
            config,
        } => {
            let config = load_config(config)?;
            let summary = tokio::task::spawn_blocking(move || {
                pipeline::inspect_file(&config, &file, roster.as_deref())
            })
            .await
            .context("inspection task failed")??;
            print_json(&summary)?;
        }
        Commands::Normalize {
            kind,
            value,
            config,
        } => {
            let normalizer = load_config(config)?.normalizer();
            let normalized = match kind {
                FieldKind::Name => normalizer.name(&value),
                FieldKind::Class => normalizer.class(&value),
                FieldKind::Subject => normalizer.subject(&value),
            };
            println!("{normalized}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_config_brings_subject_rules_to_normalizer() {
        let path = std::env::temp_dir().join("assessment_ingest_main_config.json");
        fs::write(
            &path,
            r#"{"subject_rules": [{"keywords": ["родн"], "canonical": "Родной язык"}]}"#,
        )
        .unwrap();

        let normalizer = load_config(Some(path.clone())).unwrap().normalizer();
        fs::remove_file(&path).unwrap();

        assert_eq!(normalizer.subject("родной (русский)"), "Родной язык");
    }
}
