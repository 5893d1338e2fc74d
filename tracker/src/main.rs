//! Pocket Watch Tracker - background location reporting daemon.
//!
//! The foreground commands (`toggle`, `ping`, `status`, `sign-out`) are
//! short-lived: they mutate or inspect durable state and exit. The `run`
//! command is the background task executor: a long-lived process that
//! resumes the persisted registration table and drives the scheduled
//! handlers. The two kinds of invocation share nothing but the files in the
//! state directory, which is exactly the contract the tracking core is
//! built around.
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pocketwatch_tracker::config::Config;
use pocketwatch_tracker::credentials::{CredentialMirror, FileCredentialMirror};
use pocketwatch_tracker::executor::TaskExecutor;
use pocketwatch_tracker::handlers::HandlerContext;
use pocketwatch_tracker::position::FilePositionSource;
use pocketwatch_tracker::reporter::{Reporter, ReporterConfig};
use pocketwatch_tracker::scheduler::{LocationProvider, TaskScheduler};
use pocketwatch_tracker::service::{
    PingOutcome, ServicePolicy, SessionProvider, ToggleOutcome, TrackingService,
};
use pocketwatch_tracker::settings::{ConfigResolver, JsonSettingsStore};

/// Pocket Watch Tracker - background location reporting client.
///
/// Registers background location tasks, reports positions to the Pocket
/// Watch server, and keeps the displayed tracking state in sync with the
/// durable registration table.
#[derive(Parser, Debug)]
#[command(name = "pocketwatch-tracker")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    POCKETWATCH_STATE_DIR    State directory (default: ~/.pocketwatch)
    POCKETWATCH_FIX_PATH     Fix file path (default: <state dir>/position.json)
    POCKETWATCH_SERVER_URL   Seeds the 'url' setting when set
    POCKETWATCH_TOKEN        Bearer token for foreground commands

EXAMPLES:
    # Start or stop background tracking
    export POCKETWATCH_TOKEN=...
    pocketwatch-tracker toggle

    # Run the background task executor
    pocketwatch-tracker run

    # Report the last known position right now
    pocketwatch-tracker ping
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the background task executor.
    ///
    /// Resumes any persisted registrations and drives the location and
    /// heartbeat handlers until interrupted.
    Run,

    /// Start or stop background location tracking.
    Toggle,

    /// Report the last known position immediately, or probe the server when
    /// no position exists yet.
    Ping,

    /// List the server's named positions, or report one by id.
    Manual {
        /// Position id to report; omit to list available positions.
        position_id: Option<String>,
    },

    /// Print the tracking state reconciled against the registration table.
    Status,

    /// Clear the mirrored bearer token.
    SignOut,
}

/// Session provider for CLI invocations: the token travels in the
/// environment.
struct EnvSessionProvider;

impl SessionProvider for EnvSessionProvider {
    fn bearer_token(&self) -> Option<String> {
        std::env::var("POCKETWATCH_TOKEN")
            .ok()
            .filter(|token| !token.is_empty())
    }
}

/// Everything a command needs, wired over the shared state directory.
struct App {
    service: TrackingService,
    executor: Arc<TaskExecutor>,
    credentials: Arc<FileCredentialMirror>,
    provider: Arc<FilePositionSource>,
    resolver: ConfigResolver,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        init_logging();

        let config = Config::from_env().context("Failed to load configuration")?;
        if let Some(url) = &config.server_url {
            seed_server_url(&config, url)?;
        }

        let app = build_app(&config);

        match cli.command {
            Command::Run => run_executor(&config, &app).await,
            Command::Toggle => run_toggle(&app).await,
            Command::Ping => run_ping(&app).await,
            Command::Manual { position_id } => run_manual(&app, position_id).await,
            Command::Status => run_status(&app).await,
            Command::SignOut => run_sign_out(&app),
        }
    })
}

/// Wires the service and executor over the shared state directory.
fn build_app(config: &Config) -> App {
    let store = Arc::new(JsonSettingsStore::new(config.settings_path()));
    let resolver = ConfigResolver::new(store);
    let credentials = Arc::new(FileCredentialMirror::new(&config.state_dir));
    let provider = Arc::new(FilePositionSource::new(config.fix_path.clone()));

    let ctx = HandlerContext::new(
        resolver.clone(),
        Arc::clone(&credentials) as Arc<dyn CredentialMirror>,
        Arc::clone(&provider) as Arc<dyn LocationProvider>,
    );
    let executor = Arc::new(TaskExecutor::new(
        &config.state_dir,
        ctx,
        Arc::clone(&provider) as Arc<dyn LocationProvider>,
    ));

    let service = TrackingService::new(
        Arc::clone(&executor) as Arc<dyn TaskScheduler>,
        Arc::clone(&provider) as Arc<dyn LocationProvider>,
        Arc::new(EnvSessionProvider),
        Arc::clone(&credentials) as Arc<dyn CredentialMirror>,
        resolver.clone(),
        ServicePolicy::default(),
    );

    App {
        service,
        executor,
        credentials,
        provider,
        resolver,
    }
}

/// Runs the background task executor until interrupted.
async fn run_executor(config: &Config, app: &App) -> Result<()> {
    info!(
        state_dir = %config.state_dir.display(),
        fix_path = %config.fix_path.display(),
        "Starting Pocket Watch tracker"
    );

    // Mirrors the permission prompt the app fires on mount.
    let permission = app.provider.request_background_permission().await;
    info!(?permission, "Background location permission");

    let state = app
        .service
        .resync()
        .await
        .context("Failed to resync tracking state")?;
    info!(started = state.started, "Tracking state resynced");

    info!("Executor running. Press Ctrl+C to stop.");
    app.executor
        .run(wait_for_shutdown())
        .await
        .context("Executor failed")?;

    Ok(())
}

/// Starts or stops tracking and reports what happened.
async fn run_toggle(app: &App) -> Result<()> {
    let outcome = app.service.toggle().await.context("Toggle failed")?;

    match outcome {
        ToggleOutcome::Started => println!("Tracking started."),
        ToggleOutcome::Stopped => println!("Tracking stopped."),
        ToggleOutcome::ManualFlowRequested => {
            println!("Manual reporting mode: select a position to report.");
        }
        ToggleOutcome::PermissionDenied => {
            println!("Background location permission denied; tracking not started.");
        }
        ToggleOutcome::TaskNotDefined => {
            println!("Location task is not defined with the scheduler.");
        }
        ToggleOutcome::Busy => println!("Another toggle is already in flight."),
    }

    let feedback = app.service.feedback().current();
    if feedback.visible {
        println!("{}", feedback.text);
    }

    Ok(())
}

/// Sends a manual ping.
async fn run_ping(app: &App) -> Result<()> {
    let outcome = app.service.send_ping().await.context("Ping failed")?;

    match outcome {
        PingOutcome::Reported => println!("Reported last known position."),
        PingOutcome::HealthChecked => {
            println!("No position available; server health check succeeded.");
        }
    }

    Ok(())
}

/// Lists the server's named positions, or reports the selected one.
async fn run_manual(app: &App, position_id: Option<String>) -> Result<()> {
    let base_url = app
        .resolver
        .base_url()
        .context("No server URL configured")?;
    let reporter = Reporter::new(ReporterConfig::new(base_url));

    let token = EnvSessionProvider
        .bearer_token()
        .or(app.credentials.load().context("Failed to read mirrored token")?)
        .context("No bearer token available")?;

    match position_id {
        Some(id) => {
            reporter
                .report_manual_location(&token, &id)
                .await
                .context("Manual report failed")?;
            println!("Reported manual position {id}.");
        }
        None => {
            let locations = reporter
                .manual_locations(&token)
                .await
                .context("Failed to fetch manual locations")?;

            if locations.is_empty() {
                println!("No manual locations defined.");
            }
            for location in locations {
                println!("{}  {}", location.id, location.name);
            }
        }
    }

    Ok(())
}

/// Prints the reconciled tracking state as JSON.
async fn run_status(app: &App) -> Result<()> {
    let state = app.service.resync().await.context("Resync failed")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&state).context("Failed to format state")?
    );
    Ok(())
}

/// Clears the mirrored token.
fn run_sign_out(app: &App) -> Result<()> {
    app.credentials
        .clear()
        .context("Failed to clear mirrored token")?;
    println!("Mirrored token cleared.");
    Ok(())
}

/// Writes the server URL into the settings store if it differs.
fn seed_server_url(config: &Config, url: &str) -> Result<()> {
    let path = config.settings_path();

    let mut settings = match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str::<serde_json::Value>(&contents)
            .unwrap_or_else(|_| serde_json::json!({})),
        Err(_) => serde_json::json!({}),
    };
    if !settings.is_object() {
        settings = serde_json::json!({});
    }

    if settings.get("url").and_then(|v| v.as_str()) == Some(url) {
        return Ok(());
    }

    settings["url"] = serde_json::Value::from(url);
    std::fs::create_dir_all(&config.state_dir).context("Failed to create state directory")?;
    std::fs::write(
        &path,
        serde_json::to_string_pretty(&settings).context("Failed to encode settings")?,
    )
    .context("Failed to write settings")?;

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
