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

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use signalhop_server::{logging, ConfigLoader};
use std::path::PathBuf;

/// signalhop-server - webhook ingestion and delivery triggers over HTTP
#[derive(Parser)]
#[command(name = "signalhop-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (can also be set via SIGNALHOP_CONFIG)
    #[arg(short, long, env = "SIGNALHOP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the configured port
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = ConfigLoader::new()
        .load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let level = if args.verbose {
        "debug".to_string()
    } else {
        config.server.log_level.clone()
    };
    let json = args.json_logs || config.server.log_format.eq_ignore_ascii_case("json");
    let _guard = logging::init_logging(&level, json, config.server.log_directory.as_deref())?;

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    signalhop_server::serve(config, Some(metrics)).await
}
