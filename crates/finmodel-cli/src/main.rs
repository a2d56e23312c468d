// finmodel command-line entry point.
//
// Startup sequence:
// 1. Parse arguments
// 2. Initialize tracing (log to file, not terminal)
// 3. Load config
// 4. Open the session store
// 5. Build the session manager and its event channel
// 6. Build the API client
// 7. Run the command, report errors and session expiry

mod cli;
mod commands;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use finmodel_api::{ApiClient, SessionManager};
use finmodel_core::config;
use finmodel_core::store::SqliteSessionStore;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // 1. Parse arguments
    let cli = cli::Cli::parse();

    // 2. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("finmodel starting");

    // 3. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: base_url={}, auto_refresh={}",
        config.api.base_url, config.session.auto_refresh
    );

    // 4. Open the session store
    let store = SqliteSessionStore::open(&config.session.store_path)
        .context("failed to open session store")?;
    info!("Session store opened at {}", config.session.store_path.display());

    // 5. Session manager with an event channel
    let (events_tx, mut events_rx) = mpsc::channel(16);
    let session = Arc::new(SessionManager::new(Arc::new(store)).with_events(events_tx));

    // 6. API client
    let client = ApiClient::from_config(&config, session)
        .context("failed to build HTTP client")?;
    let app = commands::App {
        client: Arc::new(client),
        page_size: config.pagination.page_size,
    };

    // 7. Run the command
    let outcome = commands::run(cli.command, &app).await;
    let hint = commands::expiry_hint(&mut events_rx);

    let code = match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("command failed: {e:#}");
            eprintln!("{}", commands::error_message(&e));
            ExitCode::FAILURE
        }
    };
    if let Some(hint) = hint {
        eprintln!("{hint}");
    }
    Ok(code)
}

/// Initialize tracing to log to a file so command output stays clean.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("finmodel.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("finmodel=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
