//! Railway Booking Server
//!
//! Line-delimited JSON over TCP: accounts, train search and seat booking.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use clap::Parser;
use tracing::{info, warn};

use railway_core::config::{Config, default_database_path, load_config};
use railway_core::tracing_init::init_tracing;
use railway_server::auth::{AuthManager, AuthPolicy};
use railway_server::booking::BookingEngine;
use railway_server::clock::{Clock, SystemClock};
use railway_server::notify::LogMailer;
use railway_server::server::{Server, Services};
use railway_server::storage::Database;
use railway_server::storage::seed::seed_demo_network;

#[derive(Parser, Debug)]
#[command(name = "railway-server")]
#[command(version, about = "Railway booking server - line-delimited JSON over TCP")]
struct Args {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind.
    #[arg(long)]
    bind: Option<String>,

    /// Path to SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Maximum number of live connections.
    #[arg(long)]
    max_connections: Option<usize>,

    /// Seed the demo network with a schedule on this date (YYYY-MM-DD)
    /// when the database has no stations yet.
    #[arg(long, value_name = "DATE")]
    seed_demo: Option<NaiveDate>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "RAILWAY_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = &self.bind {
            config.server.bind_address.clone_from(bind);
        }
        if let Some(path) = &self.db_path {
            config.database.path = Some(path.clone());
        }
        if let Some(n) = self.max_connections {
            config.server.max_connections = n;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("railway_server=info", args.log_json);

    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.server.bind_address,
        port = config.server.port,
        "Starting railway-server"
    );

    let db_path = config
        .database
        .path
        .clone()
        .or_else(default_database_path)
        .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    info!(path = %db_path.display(), "Opening database");
    let db = Database::open(&db_path).await?;

    if let Some(date) = args.seed_demo {
        let mut lock = db.lock().await;
        if lock.list_stations().await?.is_empty() {
            let date = date.format("%Y-%m-%d").to_string();
            let network = seed_demo_network(&mut lock, &date).await?;
            info!(
                schedule_id = network.schedule_id,
                date = %network.departure_date,
                "Seeded demo network"
            );
        } else {
            warn!("Database already has stations, skipping demo seed");
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let services = Services {
        auth: AuthManager::new(
            db.clone(),
            Arc::clone(&clock),
            AuthPolicy::from_config(&config.security),
        ),
        booking: BookingEngine::new(
            db.clone(),
            clock,
            Duration::minutes(config.booking.hold_minutes),
        ),
        mailer: Arc::new(LogMailer::new(&config.mail)),
    };

    let server = Server::new(config.server.clone(), services);
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    server.stop().await;

    info!("Server stopped");
    Ok(())
}
