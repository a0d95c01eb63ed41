use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use datwatch_core::config::{ConfigLayer, WatchConfig, ENV_LOG_FILE};
use datwatch_core::convert::convert_lr_to_epic;
use datwatch_core::daemon;
use datwatch_core::export::{export_file, ExportFormat};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Watches instrument exports and converts them to EPIC logs", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,
    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch a directory and convert .dat files once they stop changing
    Watch(WatchArgs),
    /// Convert files to EPIC LR logs immediately
    Convert(ConvertArgs),
    /// Export a .dat file as a flat table (parquet, csv, json)
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// TOML configuration file
    #[arg(long, env = "DATWATCH_CONFIG")]
    config: Option<PathBuf>,
    /// Directory the instrument writes .dat files into
    #[arg(long)]
    input_dir: Option<PathBuf>,
    /// Root of the EPIC log tree
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Seconds a file must stay unchanged before it is converted
    #[arg(long)]
    inactivity_secs: Option<u64>,
    /// Seconds between checks of pending files
    #[arg(long)]
    poll_secs: Option<u64>,
    /// File name suffix to watch for, without the dot
    #[arg(long)]
    extension: Option<String>,
    /// JSON file recording which files were already processed
    #[arg(long)]
    state_file: Option<PathBuf>,
    /// Also watch subdirectories
    #[arg(long)]
    recursive: bool,
    /// Queue matching files that already exist at startup
    #[arg(long)]
    scan_existing: bool,
    /// Skip files whose content is identical to the last processed version
    #[arg(long)]
    dedupe_by_content: bool,
}

impl WatchArgs {
    fn to_layer(&self) -> ConfigLayer {
        ConfigLayer {
            input_dir: self.input_dir.clone(),
            output_dir: self.output_dir.clone(),
            inactivity_secs: self.inactivity_secs,
            poll_interval_secs: self.poll_secs,
            extension: self.extension.clone(),
            recursive: self.recursive.then_some(true),
            scan_existing: self.scan_existing.then_some(true),
            state_file: self.state_file.clone(),
            dedupe_by_content: self.dedupe_by_content.then_some(true),
            log_file: None,
        }
    }
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Files to convert
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Root of the EPIC log tree
    #[arg(long, env = "DATWATCH_OUTPUT_DIR")]
    output_dir: PathBuf,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Source .dat file
    file: PathBuf,
    /// Destination file
    #[arg(long)]
    out: PathBuf,
    /// Output format
    #[arg(long, default_value = "parquet")]
    format: ExportFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Watch(args) => {
            let config = load_watch_config(&args)?;
            let log_file = cli.log_file.clone().or_else(|| config.log_file.clone());
            init_tracing(cli.log_format, log_file.as_deref())?;
            handle_watch(config).await
        }
        Command::Convert(args) => {
            init_tracing(cli.log_format, env_log_file(cli.log_file).as_deref())?;
            handle_convert(args)
        }
        Command::Export(args) => {
            init_tracing(cli.log_format, env_log_file(cli.log_file).as_deref())?;
            handle_export(args)
        }
    }
}

fn env_log_file(flag: Option<PathBuf>) -> Option<PathBuf> {
    flag.or_else(|| {
        std::env::var(ENV_LOG_FILE)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
    })
}

fn init_tracing(format: LogFormat, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (format, log_file) {
        (LogFormat::Json, None) => builder.with_writer(std::io::stderr).json().init(),
        (LogFormat::Pretty, None) => builder.with_writer(std::io::stderr).init(),
        (format, Some(path)) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file '{}'", path.display()))?;
            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            match format {
                LogFormat::Json => builder.json().init(),
                LogFormat::Pretty => builder.init(),
            }
        }
    }
    Ok(())
}

fn load_watch_config(args: &WatchArgs) -> Result<WatchConfig> {
    let file_layer = match &args.config {
        Some(path) => ConfigLayer::from_toml_file(path)?,
        None => ConfigLayer::default(),
    };
    let env_layer = ConfigLayer::from_env().context("invalid DATWATCH_* environment")?;
    let layer = file_layer.merge(env_layer).merge(args.to_layer());
    WatchConfig::resolve(layer).context("invalid watch configuration")
}

async fn handle_watch(config: WatchConfig) -> Result<()> {
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    let summary = daemon::run(config, shutdown).await?;
    info!(
        converted = summary.converted,
        failed = summary.failed,
        "Watcher exited"
    );
    Ok(())
}

fn handle_convert(args: ConvertArgs) -> Result<()> {
    let mut failures = 0;
    for path in &args.files {
        match convert_lr_to_epic(path, &args.output_dir) {
            Ok(report) => println!(
                "{} -> {} ({} lines, {} skipped)",
                path.display(),
                report.output.display(),
                report.lines_written,
                report.skipped_lines
            ),
            Err(err) => {
                error!("Failed to convert file {}: {err}", path.display());
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} files failed to convert", args.files.len());
    }
    Ok(())
}

fn handle_export(args: ExportArgs) -> Result<()> {
    let report = export_file(&args.file, &args.out, args.format)
        .with_context(|| format!("failed to export '{}'", args.file.display()))?;
    println!(
        "Exported {} rows ({} skipped lines) to {} as {}",
        report.rows,
        report.skipped_lines,
        report.output.display(),
        report.format.as_str()
    );
    Ok(())
}
