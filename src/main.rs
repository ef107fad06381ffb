//! Pilgrim check-in - card scan boarding station
//!
//! Scans pilgrim cards and toggles their boarding status in the remote
//! roster, one card per cycle, until Ctrl+C.
//!
//! Module structure:
//! - `domain/` - Core business types (Pilgrim, FailureKind, SessionStats)
//! - `io/` - External interfaces (card readers, record stores, history)
//! - `services/` - Business logic (ScanSession, validator, CheckinCoordinator)
//! - `infra/` - Infrastructure (Config)

use anyhow::Context;
use clap::Parser;
use pilgrim_checkin::domain::{PilgrimStatus, ScanMode};
use pilgrim_checkin::infra::Config;
use pilgrim_checkin::io::{
    CardReader, HttpRecordStore, InMemoryRecordStore, RecordStore, ScriptedCardReader,
    SerialCardReader, SessionHistory,
};
use pilgrim_checkin::services::{
    CheckinCoordinator, CoordinatorSettings, CycleOutcome, NextAction, ScanSession,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Pilgrim check-in - card scan boarding station
#[derive(Parser, Debug)]
#[command(name = "pilgrim-checkin", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Status every successful scan moves the pilgrim to
    #[arg(short, long, default_value = "onboard")]
    mode: PilgrimStatus,

    /// Scripted card ids to scan instead of the serial reader
    #[arg(long, value_delimiter = ',')]
    simulate: Vec<String>,

    /// JSON roster for the in-memory store used with --simulate
    #[arg(long, requires = "simulate")]
    roster: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-scan detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "pilgrim-checkin starting");

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(&[]),
    };

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        reader_device = %config.reader_device(),
        reader_enabled = %config.reader_enabled(),
        scan_timeout_ms = %config.scan_timeout().as_millis(),
        store_url = %config.store_base_url(),
        collection = %config.store_collection(),
        locale = ?config.locale(),
        "config_loaded"
    );

    let simulated = !args.simulate.is_empty();
    let script = simulated.then(|| {
        Arc::new(ScriptedCardReader::with_cards(args.simulate.iter().map(String::as_str)))
    });

    let (reader, store): (Arc<dyn CardReader>, Arc<dyn RecordStore>) = match &script {
        Some(script) => {
            let store = match &args.roster {
                Some(path) => InMemoryRecordStore::from_json_file(path)?,
                None => InMemoryRecordStore::new(),
            };
            (script.clone(), Arc::new(store))
        }
        None => {
            let store = HttpRecordStore::new(&config).context("Failed to build record store")?;
            (Arc::new(SerialCardReader::new(&config)), Arc::new(store))
        }
    };

    report_roster(store.as_ref(), "roster_before").await;

    let settings = CoordinatorSettings::from_config(&config);
    let mut coordinator = CheckinCoordinator::new(
        ScanMode::from(args.mode),
        ScanSession::new(reader),
        store.clone(),
        settings,
    )?;

    // Ctrl+C cancels the in-flight scan and ends the session
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    coordinator
        .run(
            |outcome| {
                print_outcome(outcome);
                match outcome {
                    // Nothing to scan with until the reader is fixed
                    CycleOutcome::Unavailable(_) => NextAction::End,
                    _ if script.as_ref().is_some_and(|s| s.remaining() == 0) => NextAction::End,
                    _ => NextAction::ScanAnother,
                }
            },
            shutdown_rx,
        )
        .await;

    let summary = coordinator.end().await;
    println!(
        "session {}: {} scanned, {} checked in, {} failed",
        summary.session_id, summary.total, summary.successful, summary.failed
    );
    SessionHistory::new(config.history_file()).record(&summary);

    report_roster(store.as_ref(), "roster_after").await;

    info!("pilgrim-checkin shutdown complete");
    Ok(())
}

async fn report_roster(store: &dyn RecordStore, label: &str) {
    match store.stats().await {
        Ok(stats) => {
            info!(
                total = %stats.total,
                onboard = %stats.onboard,
                offboard = %stats.offboard,
                "{}", label
            );
            println!(
                "{}: {} pilgrims, {} onboard, {} offboard",
                label, stats.total, stats.onboard, stats.offboard
            );
        }
        Err(e) => warn!(error = %e, "{} unavailable", label),
    }
}

fn print_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::CheckedIn { pilgrim, previous } => {
            let seat = pilgrim.seat_number.as_deref().unwrap_or("-");
            println!(
                "OK   {} ({}) seat {}: {} -> {}",
                pilgrim.name, pilgrim.id, seat, previous, pilgrim.status
            );
        }
        CycleOutcome::Failed(failure) | CycleOutcome::Unavailable(failure) => {
            match &failure.pilgrim {
                Some(pilgrim) => {
                    println!("FAIL {} ({}): {}", pilgrim.name, pilgrim.id, failure.message)
                }
                None => println!("FAIL {}", failure.message),
            }
        }
        CycleOutcome::Cancelled => println!("scan cancelled"),
    }
}
