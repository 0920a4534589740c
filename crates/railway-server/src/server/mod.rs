//! TCP front end: listener, connection ceiling, maintenance sweep.
//!
//! Each accepted socket gets its own task running
//! [`handler::serve_connection`]. Handlers share nothing but the cloned
//! [`Services`] and the [`ConnectionRegistry`].

pub mod dispatch;
mod handler;


use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use railway_core::config::ServerConfig;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::auth::AuthManager;
use crate::booking::BookingEngine;
use crate::notify::Mailer;
use crate::registry::ConnectionRegistry;

/// Application services shared by every connection.
#[derive(Clone)]
pub struct Services {
    pub auth: AuthManager,
    pub booking: BookingEngine,
    pub mailer: Arc<dyn Mailer>,
}

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("Failed to bind {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server is already listening on {0}")]
    AlreadyListening(SocketAddr),
}

struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    accept: JoinHandle<()>,
    maintenance: JoinHandle<()>,
    handlers: TaskTracker,
}

/// The booking server.
pub struct Server {
    config: ServerConfig,
    services: Services,
    registry: ConnectionRegistry,
    running: Mutex<Option<Running>>,
}

impl Server {
    pub fn new(config: ServerConfig, services: Services) -> Self {
        Self {
            config,
            services,
            registry: ConnectionRegistry::new(),
            running: Mutex::new(None),
        }
    }

    pub const fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Address of the listener, if started.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Bind and start accepting. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr, BindError> {
        let mut running = self.running.lock().await;
        if let Some(r) = running.as_ref() {
            return Err(BindError::AlreadyListening(r.local_addr));
        }

        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| BindError::Io {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| BindError::Io {
            addr: addr.clone(),
            source,
        })?;

        let shutdown = CancellationToken::new();
        let handlers = TaskTracker::new();

        let accept = tokio::spawn(accept_loop(
            listener,
            self.services.clone(),
            self.registry.clone(),
            self.config.clone(),
            handlers.clone(),
            shutdown.clone(),
        ));
        let maintenance = tokio::spawn(maintenance_loop(
            self.services.clone(),
            self.registry.clone(),
            Duration::from_secs(self.config.maintenance_interval_secs.max(1)),
        ));

        info!(
            addr = %local_addr,
            max_connections = self.config.max_connections,
            "Server listening"
        );
        *running = Some(Running {
            local_addr,
            shutdown,
            accept,
            maintenance,
            handlers,
        });
        Ok(local_addr)
    }

    /// Stop accepting, close every live connection and wait for handlers to
    /// finish. Calling it on a stopped server does nothing.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        running.shutdown.cancel();
        if let Err(e) = running.accept.await {
            warn!(error = %e, "Accept task ended abnormally");
        }
        running.maintenance.abort();

        let signalled = self.registry.disconnect_all().await;
        running.handlers.close();
        running.handlers.wait().await;
        info!(
            addr = %running.local_addr,
            connections = signalled,
            "Server stopped"
        );
    }
}

async fn accept_loop(
    listener: TcpListener,
    services: Services,
    registry: ConnectionRegistry,
    config: ServerConfig,
    handlers: TaskTracker,
    shutdown: CancellationToken,
) {
    loop {
        let (stream, peer) = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    continue;
                }
            },
        };

        let cancel = CancellationToken::new();
        let Some(id) = registry
            .try_register(peer, config.max_connections, cancel.clone())
            .await
        else {
            // Over the ceiling: close without a protocol exchange.
            drop(stream);
            continue;
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }
        handlers.spawn(handler::serve_connection(
            stream,
            peer,
            id,
            services.clone(),
            registry.clone(),
            config.max_line_bytes,
            cancel,
        ));
    }
    debug!("Accept loop stopped");
}

async fn maintenance_loop(services: Services, registry: ConnectionRegistry, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip first immediate tick
    loop {
        interval.tick().await;
        sweep(&services, &registry).await;
    }
}

/// One maintenance pass: expire holds and sessions, purge stale codes,
/// report connection counters.
pub async fn sweep(services: &Services, registry: &ConnectionRegistry) {
    match services.booking.expire_stale_bookings().await {
        Ok(n) if n > 0 => info!(expired = n, "Expired unpaid bookings"),
        Err(e) => warn!(error = %e, "Booking expiry sweep failed"),
        _ => {}
    }
    match services.auth.expire_sessions().await {
        Ok(n) if n > 0 => info!(expired = n, "Expired sessions"),
        Err(e) => warn!(error = %e, "Session expiry sweep failed"),
        _ => {}
    }
    match services.auth.purge_codes().await {
        Ok(n) if n > 0 => info!(purged = n, "Purged verification codes"),
        Err(e) => warn!(error = %e, "Verification code purge failed"),
        _ => {}
    }

    let stats = registry.stats().await;
    info!(
        active = stats.active,
        authenticated = stats.authenticated,
        total_accepted = stats.total_accepted,
        total_rejected = stats.total_rejected,
        "Connection statistics"
    );
}
