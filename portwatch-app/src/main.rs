use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use portwatch_common::OutputFormat;
use portwatch_common::observability::{LogConfig, LogFormat, init_logging};
use portwatch_config::{PortwatchConfig, PortwatchConfigLoader};
use portwatch_export::{SnapshotWriter, writer_for};
use portwatch_extract::{Assembler, Normalizer};
use portwatch_runtime::{PortwatchRuntime, Trigger, run_scheduled};
use std::path::PathBuf;
use std::time::Duration;

mod report;
mod sources;

const DEFAULT_CONFIG: &str = "portwatch.yaml";

#[derive(ValueEnum, Debug, Copy, Clone)]
enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

/// Collect vessel arrivals from port-authority pages into one snapshot.
#[derive(Parser, Debug)]
#[command(name = "portwatch", version, about, long_about = None)]
struct Args {
    /// YAML config; `portwatch.yaml` is read when present.
    #[arg(short, long, env = "PORTWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    #[arg(short, long, value_enum)]
    format: Option<FormatArg>,

    /// Re-run every SECS seconds until Ctrl-C instead of once.
    #[arg(long, value_name = "SECS")]
    every: Option<u64>,

    #[arg(long)]
    log_stderr: bool,

    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn load_config(&self) -> Result<PortwatchConfig> {
        let loader = match &self.config {
            Some(path) => PortwatchConfigLoader::new().with_file(path),
            None => PortwatchConfigLoader::new().with_optional_file(DEFAULT_CONFIG),
        };
        let mut cfg = loader.load().context("loading configuration")?;
        self.apply_overrides(&mut cfg);
        Ok(cfg)
    }

    fn apply_overrides(&self, cfg: &mut PortwatchConfig) {
        if let Some(dir) = &self.output_dir {
            cfg.output.dir = dir.clone();
        }
        if let Some(format) = self.format {
            cfg.output.format = format.into();
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = args.load_config()?;

    let log_path = init_logging(LogConfig {
        emit_stderr: args.log_stderr,
        format: if args.json_logs {
            LogFormat::Json
        } else {
            LogFormat::Text
        },
        ..LogConfig::default()
    })?;
    tracing::info!(
        log = %log_path.display(),
        version = cfg.version.as_deref().unwrap_or("-"),
        output = %cfg.output.dir.display(),
        "portwatch.start"
    );

    let normalizer = Normalizer::new(cfg.zone()?);
    let registry = sources::build_registry(&cfg, &normalizer)?;
    let assembler = Assembler::new(registry, normalizer);
    let writer = writer_for(&cfg.output);

    let runtime = PortwatchRuntime::build("portwatch", None)?;
    let handle = runtime.handle();
    let cancel = handle.cancellation();
    let trigger = Trigger::from_secs(args.every);
    if let Trigger::Every(period) = trigger {
        println!("Running every {}s, Ctrl-C to stop.", period.as_secs());
        let _watcher = handle.cancel_on_ctrl_c();
    }

    let outcome = runtime.block_on(run_scheduled(trigger, &cancel, |run| {
        collect_and_write(run, &assembler, writer.as_ref())
    }));
    runtime.shutdown(Duration::from_secs(2));

    let runs = outcome?;
    tracing::info!(runs, "portwatch.stop");
    Ok(())
}

async fn collect_and_write(
    run: u64,
    assembler: &Assembler,
    writer: &dyn SnapshotWriter,
) -> Result<()> {
    for port in assembler.registry().ports() {
        println!("Fetching {port} arrivals...");
    }
    let snapshot = assembler.assemble().await;
    for line in report::summary_lines(&snapshot) {
        println!("{line}");
    }

    let path = writer.write(&snapshot).context("writing snapshot")?;
    println!("Snapshot saved to: {}", path.display());
    tracing::info!(
        run,
        path = %path.display(),
        records = snapshot.record_count(),
        failed = snapshot.failed_ports().len(),
        "portwatch.run.done"
    );
    Ok(())
}
