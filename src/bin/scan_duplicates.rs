#![forbid(unsafe_code)]

//! Runs a full-catalog duplicate scan against the metadata store and prints
//! a summary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use vidshare_tools::config::{RuntimeOverrides, resolve_runtime_config};
use vidshare_tools::duplicates::{DuplicateDetector, ScanReport};
use vidshare_tools::metadata::{METADATA_DB_FILE, MetadataStore, VideoRecord};
use vidshare_tools::security::ensure_not_root;

#[derive(Parser, Debug)]
#[command(
    name = "scan_duplicates",
    version,
    about = "Flag duplicate uploads across the whole catalog"
)]
struct Cli {
    /// Directory holding metadata.db (defaults to DATA_ROOT)
    #[arg(long, value_name = "DIR")]
    data_root: Option<PathBuf>,

    /// .env file to read settings from
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// Seconds two durations may differ and still count as a match
    #[arg(long, value_name = "SECS")]
    duration_tolerance: Option<u32>,

    /// Also list every flagged record after the scan
    #[arg(long)]
    list: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanOutput {
    #[serde(flatten)]
    report: ScanReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    flagged: Option<Vec<VideoRecord>>,
}

impl Cli {
    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            data_root: self.data_root.clone(),
            duration_tolerance_secs: self.duration_tolerance.map(i64::from),
            env_path: self.env_file.clone(),
            ..RuntimeOverrides::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidshare_tools=info,scan_duplicates=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    ensure_not_root("scan_duplicates")?;

    let runtime = resolve_runtime_config(cli.overrides())?;
    let metadata_path = runtime.data_root.join(METADATA_DB_FILE);
    let store = MetadataStore::open(&metadata_path)
        .await
        .with_context(|| format!("opening {}", metadata_path.display()))?;

    info!("scanning {}", metadata_path.display());
    let detector = DuplicateDetector::new(runtime.limits);
    let output = run(&detector, &store, cli.list).await?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serializing scan report")?
        );
    } else {
        print!("{}", render_text(&output));
    }
    Ok(())
}

async fn run(
    detector: &DuplicateDetector,
    store: &MetadataStore,
    list: bool,
) -> Result<ScanOutput> {
    let report = detector.scan(store).await.context("duplicate scan")?;
    let flagged = if list {
        Some(store.list_duplicates().await?)
    } else {
        None
    };
    Ok(ScanOutput { report, flagged })
}

fn render_text(output: &ScanOutput) -> String {
    let mut text = format!(
        "Scanned {} record(s), flagged {} duplicate(s).\n",
        output.report.total_scanned, output.report.duplicates_found
    );
    if let Some(flagged) = &output.flagged {
        for video in flagged {
            let reasons: Vec<&str> = video
                .duplicate_reasons
                .iter()
                .map(|reason| reason.as_str())
                .collect();
            text.push_str(&format!(
                "  {} \"{}\" -> {} [{}]\n",
                video.id,
                video.title,
                video.duplicate_of.as_deref().unwrap_or("?"),
                reasons.join(", ")
            ));
        }
    }
    text
}
