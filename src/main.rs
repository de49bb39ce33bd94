//! snapshot-relay CLI
//!
//! Entry point for the `snapshot-relay` command-line tool.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, warn};

use snapshot_relay::archive::PruneResult;
use snapshot_relay::config::{ConfigLayer, ProcessEnv, Settings};
use snapshot_relay::engine::{MysqlClient, MysqlDump};
use snapshot_relay::export::Producer;
use snapshot_relay::logging::{init_logging, run_span, LogFormat};
use snapshot_relay::pipeline::{collect_status, run_prune};
use snapshot_relay::signal::SignalHandler;
use snapshot_relay::summary::{CycleStatus, ExitCode, FailureReport};
use snapshot_relay::transport::{DirectoryTransport, SshTransport, Transport};
use snapshot_relay::{ExportJob, ImportCycle, PipelineError, PipelineResult};

#[derive(Parser)]
#[command(name = "snapshot-relay")]
#[command(about = "Export, deliver, import and archive MySQL schema snapshots", version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Schema to operate on (default: news)
    #[arg(long, short = 's', global = true)]
    schema: Option<String>,

    /// Log output format (logs go to stderr)
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print the result as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the schema into a compressed artifact and deliver it
    Export(ExportArgs),

    /// Run one import cycle: select, import, verify, archive, prune
    Import(ImportArgs),

    /// Apply the archive retention window
    Prune {
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        #[arg(long)]
        retention_days: Option<u32>,

        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Show landing backlog and archive contents
    Status {
        #[arg(long)]
        landing_dir: Option<PathBuf>,

        #[arg(long)]
        archive_dir: Option<PathBuf>,
    },

    /// Print the effective configuration with secrets redacted
    Config,
}

#[derive(Args)]
struct ExportArgs {
    /// Directory the artifact is staged in
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Deliver into a locally mounted landing directory instead of over SSH
    #[arg(long, conflicts_with = "local_only")]
    deliver_to: Option<PathBuf>,

    /// Dump and compress only, even when a remote is configured
    #[arg(long)]
    local_only: bool,

    /// Keep the staging copy after a verified delivery
    #[arg(long)]
    keep_local: bool,
}

#[derive(Args)]
struct ImportArgs {
    #[arg(long)]
    landing_dir: Option<PathBuf>,

    #[arg(long)]
    archive_dir: Option<PathBuf>,

    #[arg(long)]
    retention_days: Option<u32>,

    /// Seconds to wait for a competing cycle to release the schema lock
    #[arg(long)]
    lock_timeout: Option<u64>,

    /// Directory for the decompressed SQL scratch file
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let signals = SignalHandler::new();
    if let Err(e) = signals.install() {
        warn!(
            error = %e,
            "could not install signal handler; interrupts will terminate immediately"
        );
    }

    let code = match run(&cli, &signals) {
        Ok(code) => code,
        Err(e) => report_failure(&e, cli.json),
    };
    process::exit(code.as_i32());
}

fn run(cli: &Cli, signals: &SignalHandler) -> PipelineResult<ExitCode> {
    let mut overrides = ConfigLayer {
        schema: cli.schema.clone(),
        ..ConfigLayer::default()
    };

    match cli.command {
        Commands::Export(ref args) => {
            overrides.staging_dir = args.staging_dir.clone();
            if args.keep_local {
                overrides.keep_local = Some(true);
            }
            let settings = load_settings(cli, overrides)?;
            run_export(cli, &settings, args, signals)
        }
        Commands::Import(ref args) => {
            overrides.landing_dir = args.landing_dir.clone();
            overrides.archive_dir = args.archive_dir.clone();
            overrides.retention_days = args.retention_days;
            overrides.lock_timeout_seconds = args.lock_timeout;
            overrides.scratch_dir = args.scratch_dir.clone();
            let settings = load_settings(cli, overrides)?;
            run_import(cli, &settings, signals)
        }
        Commands::Prune {
            ref archive_dir,
            retention_days,
            dry_run,
        } => {
            overrides.archive_dir = archive_dir.clone();
            overrides.retention_days = retention_days;
            let settings = load_settings(cli, overrides)?;
            let _span = run_span("prune", &settings.schema).entered();

            let mut policy = settings.retention_policy();
            if dry_run {
                policy = policy.with_dry_run();
            }
            let result = run_prune(&settings.archive_dir, &settings.schema, policy)?;
            emit(cli.json, &result, || prune_human(&settings.schema, &result, dry_run));
            Ok(ExitCode::Success)
        }
        Commands::Status {
            ref landing_dir,
            ref archive_dir,
        } => {
            overrides.landing_dir = landing_dir.clone();
            overrides.archive_dir = archive_dir.clone();
            let settings = load_settings(cli, overrides)?;

            let report = collect_status(
                &settings.schema,
                &settings.landing_dir,
                &settings.archive_dir,
                settings.retention_days,
            )?;
            emit(cli.json, &report, || report.to_human());
            Ok(ExitCode::Success)
        }
        Commands::Config => {
            let settings = load_settings(cli, overrides)?;
            match serde_json::to_string_pretty(&settings) {
                Ok(json) => println!("{}", json),
                Err(e) => error!(error = %e, "could not serialize configuration"),
            }
            Ok(ExitCode::Success)
        }
    }
}

fn load_settings(cli: &Cli, overrides: ConfigLayer) -> PipelineResult<Settings> {
    Ok(Settings::load(cli.config.as_deref(), &ProcessEnv, overrides)?)
}

fn run_export(
    cli: &Cli,
    settings: &Settings,
    args: &ExportArgs,
    signals: &SignalHandler,
) -> PipelineResult<ExitCode> {
    let _span = run_span("export", &settings.schema).entered();

    let dumper = MysqlDump::new(settings.source_connection()?);
    let producer = Producer::new(&dumper, settings.staging_dir.clone())
        .with_compression_level(settings.compression_level);

    let directory;
    let ssh;
    let transport: Option<&dyn Transport> = if args.local_only {
        None
    } else if let Some(ref landing) = args.deliver_to {
        directory = DirectoryTransport::new(landing.clone());
        Some(&directory)
    } else if let Some(config) = settings.ssh_config() {
        ssh = SshTransport::new(config);
        Some(&ssh)
    } else {
        None
    };

    let cancel = signals.state();
    let job = ExportJob {
        schema: &settings.schema,
        producer,
        transport,
        keep_local: settings.keep_local,
        cancel: &cancel,
    };

    let report = job.run()?;
    emit(cli.json, &report, || report.to_human());
    Ok(ExitCode::Success)
}

fn run_import(cli: &Cli, settings: &Settings, signals: &SignalHandler) -> PipelineResult<ExitCode> {
    let _span = run_span("import", &settings.schema).entered();

    let client = MysqlClient::new(settings.destination_connection()?);
    let cancel = signals.state();
    let cycle = ImportCycle {
        schema: &settings.schema,
        landing_dir: &settings.landing_dir,
        archive_dir: &settings.archive_dir,
        lock_dir: &settings.lock_dir,
        lock_timeout: Duration::from_secs(settings.lock_timeout_seconds),
        scratch_dir: &settings.scratch_dir,
        retention: settings.retention_policy(),
        client: &client,
        cancel: &cancel,
    };

    let report = cycle.run()?;
    if report.status == CycleStatus::ImportedWithWarnings {
        warn!(schema = %settings.schema, "cycle finished with verification warnings");
    }
    emit(cli.json, &report, || report.to_human());
    Ok(ExitCode::Success)
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce() -> String) {
    if !json {
        println!("{}", human());
        return;
    }
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => error!(error = %e, "could not serialize report"),
    }
}

fn prune_human(schema: &str, result: &PruneResult, dry_run: bool) -> String {
    let verb = if dry_run { "would delete" } else { "deleted" };
    let mut text = format!(
        "{}: {} archive entries scanned, {} {} ({} bytes)",
        schema, result.scanned, verb, result.deleted, result.bytes_reclaimed
    );
    for err in &result.errors {
        text.push_str(&format!("\n  ERROR: {}", err));
    }
    text
}

fn report_failure(err: &PipelineError, json: bool) -> ExitCode {
    let kind = err.failure_kind();
    error!(
        failure = kind.description(),
        exit_code = kind.exit_code().as_i32(),
        "{}",
        err
    );

    if json {
        let report = FailureReport::new(kind, err.to_string());
        if let Ok(text) = serde_json::to_string_pretty(&report) {
            println!("{}", text);
        }
    }
    kind.exit_code()
}
