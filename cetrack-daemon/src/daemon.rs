//! Daemon assembly and lifecycle.
//!
//! The [`Daemon`] validates the configuration, installs the metrics
//! recorder when enabled, binds the event sink, and serves until a
//! shutdown signal arrives.
//!
//! # Shutdown
//!
//! 1. The store is closed, so late submissions get `503`
//! 2. The HTTP server stops accepting and drains in-flight requests
//! 3. The server task is awaited for at most [`SHUTDOWN_TIMEOUT`]

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use cetrack_core::CetrackConfig;
use cetrack_sink::{EventStore, SinkServer};

use crate::metrics_server;

/// Upper bound on graceful server shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// The sink daemon.
pub struct Daemon {
    /// Loaded and validated configuration.
    config: CetrackConfig,
    /// Bound but not yet serving sink.
    server: SinkServer,
    /// Daemon start time (for the shutdown summary).
    start_time: Instant,
}

impl Daemon {
    /// Load configuration from `config_path` and build the daemon.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated,
    /// or if the sink address cannot be bound.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = CetrackConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: CetrackConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Recorder must exist before the store records its first gauge value
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let server = SinkServer::bind(&config.sink)
            .await
            .map_err(|e| anyhow::anyhow!("failed to start event sink: {}", e))?;

        tracing::info!(
            addr = %server.local_addr(),
            max_events = config.sink.max_events,
            max_body_bytes = config.sink.max_body_bytes,
            "daemon initialized"
        );

        Ok(Self {
            config,
            server,
            start_time: Instant::now(),
        })
    }

    /// Address the sink is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Shared handle to the event store.
    pub fn store(&self) -> Arc<EventStore> {
        self.server.store()
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &CetrackConfig {
        &self.config
    }

    /// Serve until `shutdown` completes, then stop gracefully.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Self {
            server,
            start_time,
            ..
        } = self;

        let mut handle = server.spawn();
        tracing::info!(url = %handle.url(), "accepting CloudEvents");

        shutdown.await;
        tracing::info!("shutting down event sink");

        let store = handle.store();
        handle
            .shutdown(SHUTDOWN_TIMEOUT)
            .await
            .map_err(|e| anyhow::anyhow!("event sink shutdown failed: {}", e))?;

        tracing::info!(
            recorded = store.len(),
            uptime_secs = start_time.elapsed().as_secs(),
            "cetrack-daemon stopped"
        );
        Ok(())
    }

    /// Serve until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = wait_for_shutdown_signal().await {
                tracing::error!(error = %e, "signal handler failed, shutting down");
            }
        })
        .await
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    tracing::info!(signal = name, "shutdown signal received");
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(signal = "ctrl-c", "shutdown signal received");
    Ok(())
}
