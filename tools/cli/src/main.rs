//! GateCheck CLI - Command line interface for device check-in operations.
//!
//! This tool drives a check-in device from the terminal: load a roster, scan
//! or look up attendees, run a sync cycle, inspect stats.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

use gatecheck_api::{HttpServerApi, ServerApi};
use gatecheck_checkin::{CheckinOutcome, EventSession, SessionConfig};
use gatecheck_common::{AttendeeId, DeviceId, EventId};
use gatecheck_store::{KeyValueStore, SqliteStore};
use gatecheck_sync::Connectivity;

/// Store key holding this device's generated identity.
const DEVICE_KEY: &str = "device/id";

#[derive(Parser)]
#[command(name = "gatecheck")]
#[command(about = "GateCheck - Offline-capable event check-in")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Local data directory (defaults to the platform data dir).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Check-in server base URL.
    #[arg(short, long, global = true)]
    server: Option<Url>,

    /// Event identifier.
    #[arg(short, long, global = true)]
    event: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the event roster into the local cache.
    Load,

    /// Admit an attendee from a scanned QR payload.
    Scan {
        /// Raw QR payload (bare attendee id or gatecheck: URI).
        payload: String,
    },

    /// Admit an attendee by id (manual lookup).
    Checkin {
        /// Attendee id.
        attendee: String,
    },

    /// Re-admit an attendee past the duplicate check.
    Override {
        /// Attendee id.
        attendee: String,

        /// Justification, recorded for audit.
        #[arg(short, long)]
        reason: String,
    },

    /// Search the cached roster.
    Search {
        /// Name or id fragment.
        query: String,
    },

    /// Show derived event statistics.
    Stats,

    /// Run one sync cycle against the server.
    Sync,

    /// Destroy all locally stored data for the event.
    Clear,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(
            *shell,
            &mut Cli::command(),
            "gatecheck",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let session = open_session(&cli)?;

    match cli.command {
        Commands::Load => cmd_load(&session).await,
        Commands::Scan { payload } => cmd_scan(&session, &payload),
        Commands::Checkin { attendee } => cmd_checkin(&session, &attendee),
        Commands::Override { attendee, reason } => cmd_override(&session, &attendee, &reason),
        Commands::Search { query } => cmd_search(&session, &query),
        Commands::Stats => cmd_stats(&session),
        Commands::Sync => cmd_sync(&session).await,
        Commands::Clear => cmd_clear(&session),
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}

/// Open the event session from the CLI flags.
fn open_session(cli: &Cli) -> Result<EventSession> {
    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => dirs::data_dir()
            .context("No platform data directory; pass --data-dir")?
            .join("gatecheck"),
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

    let store: Arc<dyn KeyValueStore> =
        Arc::new(SqliteStore::open(data_dir.join("device.db"))?);

    let server = cli
        .server
        .clone()
        .context("Missing --server URL")?;
    let api: Arc<dyn ServerApi> = Arc::new(HttpServerApi::new(server));

    let event = EventId::new(
        cli.event
            .clone()
            .context("Missing --event identifier")?,
    )?;
    let device = device_identity(store.as_ref())?;

    // One-shot commands assume reachability; a failed cycle still exits
    // cleanly with the records left pending.
    let session = EventSession::open(
        store,
        api,
        event,
        device,
        Connectivity::Online,
        SessionConfig::default(),
    )?;
    Ok(session)
}

/// Load or generate the persistent device identity.
fn device_identity(store: &dyn KeyValueStore) -> Result<DeviceId> {
    if let Some(bytes) = store.get(DEVICE_KEY)? {
        let id = String::from_utf8(bytes).context("Corrupt device identity")?;
        return Ok(DeviceId::new(id)?);
    }

    let device = DeviceId::generate();
    store.put(DEVICE_KEY, device.as_str().as_bytes())?;
    info!(device = %device, "Generated new device identity");
    Ok(device)
}

async fn cmd_load(session: &EventSession) -> Result<()> {
    let count = session.load_roster().await?;
    println!("Loaded {} attendees for event {}", count, session.event());
    Ok(())
}

fn cmd_scan(session: &EventSession, payload: &str) -> Result<()> {
    report_outcome(session.scan(payload)?);
    Ok(())
}

fn cmd_checkin(session: &EventSession, attendee: &str) -> Result<()> {
    let attendee = AttendeeId::new(attendee)?;
    report_outcome(session.manual_checkin(&attendee)?);
    Ok(())
}

fn cmd_override(session: &EventSession, attendee: &str, reason: &str) -> Result<()> {
    let attendee = AttendeeId::new(attendee)?;
    let record = session.emergency_override(&attendee, reason)?;
    println!(
        "OVERRIDE  {} admitted (seq {}, reason: {})",
        record.attendee, record.sequence, reason
    );
    Ok(())
}

fn cmd_search(session: &EventSession, query: &str) -> Result<()> {
    let hits = session.search(query);
    if hits.is_empty() {
        println!("No attendees match {:?}", query);
        return Ok(());
    }

    for record in hits {
        println!("{:24}  {}  [{}]", record.id, record.display_name, record.category);
    }
    Ok(())
}

fn cmd_stats(session: &EventSession) -> Result<()> {
    let stats = session.stats()?;
    println!("Event:       {}", session.event());
    println!("Total:       {}", stats.total);
    println!("Checked in:  {}", stats.checked_in);
    println!("No-shows:    {}", stats.no_shows);
    println!("Rate:        {:.1}%", stats.rate);
    Ok(())
}

async fn cmd_sync(session: &EventSession) -> Result<()> {
    let outcome = session.force_sync().await?;
    if outcome.skipped {
        println!("Sync skipped (offline or already running)");
        return Ok(());
    }

    println!(
        "Sync complete: {} accepted, {} rejected, {} deferred, {} merged",
        outcome.accepted, outcome.rejected, outcome.deferred, outcome.merged
    );
    Ok(())
}

fn cmd_clear(session: &EventSession) -> Result<()> {
    session.clear_event_data()?;
    println!("Cleared all local data for event {}", session.event());
    Ok(())
}

fn report_outcome(outcome: CheckinOutcome) {
    match outcome {
        CheckinOutcome::Admitted(record) => {
            println!("OK        {} admitted (seq {})", record.attendee, record.sequence);
        }
        CheckinOutcome::Duplicate { existing } => match existing {
            Some(record) => println!(
                "DUPLICATE {} already checked in ({} at {})",
                record.attendee, record.method, record.recorded_at
            ),
            None => println!("DUPLICATE already checked in on another device"),
        },
        CheckinOutcome::Unknown { attendee } => {
            println!("UNKNOWN   {} is not on the roster", attendee);
        }
    }
}
