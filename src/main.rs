//! DBM Ticket Flow CLI
//!
//! Entry point for the `ticket-flow` command-line tool.

use clap::{Parser, Subcommand};
use dbm_ticket_flow::config::EffectiveConfig;
use dbm_ticket_flow::mock::MockServices;
use dbm_ticket_flow::observability::init_logging;
use dbm_ticket_flow::signal::SignalHandler;
use dbm_ticket_flow::store::StateFile;
use dbm_ticket_flow::{EngineSettings, FlowManager, FlowStore, Reconciler, RpcHandler, SettingsHandle, SettingsSources};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ticket-flow")]
#[command(about = "Ticket flow engine for DB operations", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve one JSON RPC request from stdin
    Rpc {
        /// Path to the state snapshot (created if missing)
        #[arg(long, short = 's', default_value = "ticket_flow_state.json")]
        state: PathBuf,

        /// Path to the engine config file (TOML)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Run the reconciler sweeps
    Reconcile {
        #[arg(long, short = 's', default_value = "ticket_flow_state.json")]
        state: PathBuf,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Keep sweeping until interrupted
        #[arg(long)]
        watch: bool,

        /// Seconds between sweeps (default: reconciler.interval_seconds)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Explain whether one ticket type must wait for another
    Explain {
        /// Ticket type asking to run
        requesting: String,

        /// Ticket type already running on the cluster
        active: String,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output in human-readable format instead of JSON
        #[arg(long)]
        human: bool,
    },

    /// Verify the engine configuration
    Verify {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Print the merged configuration as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Rpc { state, config } => run_rpc(&state, config),
        Commands::Reconcile {
            state,
            config,
            watch,
            interval,
        } => run_reconcile(&state, config, watch, interval),
        Commands::Explain {
            requesting,
            active,
            config,
            human,
        } => run_explain(&requesting, &active, config, human),
        Commands::Verify { config, json } => run_verify(config, json),
    }
}

fn load_settings(config: Option<PathBuf>) -> Arc<SettingsHandle> {
    let sources = SettingsSources {
        config_path: config,
        cli_overrides: None,
    };
    match SettingsHandle::load(sources) {
        Ok(handle) => {
            init_logging(handle.current().logging.format);
            Arc::new(handle)
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

/// Engine over an empty store; every command reloads it from the snapshot
/// under the state lock.
fn load_manager(state: &Path, config: Option<PathBuf>) -> (FlowManager, StateFile) {
    let settings = load_settings(config);
    let file = StateFile::new(state, settings.current().state.lock_timeout());
    let manager = FlowManager::new(FlowStore::new(), settings, MockServices::new().services());
    (manager, file)
}

fn run_rpc(state: &Path, config: Option<PathBuf>) {
    let (manager, file) = load_manager(state, config);
    if let Err(e) = RpcHandler::new(&manager).with_state_file(file).run() {
        eprintln!("RPC I/O error: {}", e);
        process::exit(1);
    }
}

fn run_reconcile(state: &Path, config: Option<PathBuf>, watch: bool, interval: Option<u64>) {
    let (manager, file) = load_manager(state, config);
    let reconciler = Reconciler::new(&manager).with_state_file(file);

    if !watch {
        let report = reconciler.sweep(chrono::Utc::now());
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        if report.failures > 0 {
            process::exit(1);
        }
        return;
    }

    let handler = SignalHandler::new();
    if let Err(e) = handler.install() {
        eprintln!("Failed to install signal handler: {}", e);
        process::exit(1);
    }
    let shutdown = handler.state();
    let interval = interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| manager.settings().reconciler.interval());
    tracing::info!(interval_ms = interval.as_millis() as u64, "reconcile loop started");

    reconciler.run_loop(interval, shutdown.stop_flag(), |report| {
        if !report.retried.is_empty() || !report.fired.is_empty() || !report.expired.is_empty() || report.failures > 0
        {
            tracing::info!(
                retried = report.retried.len(),
                fired = report.fired.len(),
                expired = report.expired.len(),
                failures = report.failures,
                "sweep finished"
            );
        }
    });
}

fn run_explain(requesting: &str, active: &str, config: Option<PathBuf>, human: bool) {
    let settings = load_settings(config).current();
    let decision = settings.exclusive.matrix.decide(requesting, active);

    if human {
        let verdict = if decision.conflicts { "must wait for" } else { "may run alongside" };
        println!("{} {} {} ({:?})", requesting, verdict, active, decision.source);
    } else {
        match serde_json::to_string_pretty(&decision) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    }

    if decision.conflicts {
        process::exit(1);
    }
}

fn run_verify(config: Option<PathBuf>, json: bool) {
    let effective = match EffectiveConfig::build(config.as_deref(), None) {
        Ok(effective) => effective,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };
    let settings = match EngineSettings::from_effective(&effective) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    if json {
        match effective.to_json() {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Configuration valid");
    println!();
    for source in &effective.sources {
        match (&source.path, &source.digest) {
            (Some(path), Some(digest)) => println!("  Source: {:?} {} (sha256 {})", source.origin, path, digest),
            _ => println!("  Source: {:?}", source.origin),
        }
    }
    println!("  Skip human stages: {}", settings.skip_human_stages);
    println!("  Reconcile interval: {}s", settings.reconciler.interval_seconds);
    println!(
        "  Expiry: every {}s, batch {}",
        settings.reconciler.expire_interval_seconds, settings.reconciler.expire_batch
    );
    println!("  Expiry overrides: {}", settings.expire.len().saturating_sub(1));
    println!("  Exclusivity entries: {}", settings.exclusive.matrix.len());
    println!("  Administrator groups: {}", settings.administrators.len());
}
