/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! HTTP surface for signalhop: the ingestion webhook, queue inspection and
//! reset endpoints, and the fan-out and worker triggers an external
//! scheduler calls on an interval.

pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::{ConfigLoader, ServerConfig, Validate};
pub use routes::build_router;
pub use state::AppState;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use signalhop::{Database, DAL};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Connects to the database, migrates it, and serves until ctrl-c or
/// SIGTERM.
pub async fn serve(config: ServerConfig, metrics: Option<PrometheusHandle>) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let core = config
        .to_signalhop_config()
        .context("Invalid configuration")?;

    if core.access_token().is_none() {
        warn!("CRYPTOHOPPER_ACCESS_TOKEN is not set; fan-out and worker endpoints will refuse to run");
    }

    let database = Database::try_new(&config.database.url, config.database.pool_size)
        .context("Failed to create database pool")?;
    database
        .run_migrations()
        .await
        .context("Failed to run database migrations")?;
    let dal = DAL::new(database);

    let mut state = AppState::new(dal, core).context("Failed to build delivery client")?;
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }

    let router = build_router(state, config.server.body_limit_bytes);
    let address = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!("signalhop-server listening on {}", address);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("signalhop-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
