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

//! Signalhop CLI - operate the signal queue without the HTTP server.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use signalhop::SignalGroup;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::purge::PurgeTarget;
use commands::work::StrategyArg;
use commands::Connection;

/// Signalhop - fan trading signals out to hoppers and deliver them
#[derive(Parser)]
#[command(name = "signalhop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (can also be set via DATABASE_URL environment variable)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Downstream API credential
    #[arg(
        long,
        env = "CRYPTOHOPPER_ACCESS_TOKEN",
        global = true,
        hide_env_values = true
    )]
    access_token: Option<String>,

    /// Downstream API base URL
    #[arg(long, env = "CRYPTOHOPPER_API_URL", global = true)]
    api_base_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fan new signals out into delivery tasks, for every group
    Fanout,

    /// Run one worker invocation
    Work {
        /// Scheduling strategy
        #[arg(long, value_enum, default_value = "global")]
        strategy: StrategyArg,

        /// Group to drain with the per-queue strategy
        #[arg(long, default_value = "default")]
        group: SignalGroup,
    },

    /// Return tasks whose lease has expired to the retry path
    Reclaim {
        /// Treat claims older than this as abandoned (e.g., "10m", "1h")
        #[arg(long, default_value = "10m")]
        older_than: String,
    },

    /// Delete rows belonging to one group
    Purge {
        #[arg(long)]
        group: SignalGroup,

        /// Which table to clear
        #[arg(long, value_enum, default_value = "all")]
        what: PurgeTarget,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show signal and task counts by status
    Stats {
        /// Limit output to one group
        #[arg(long)]
        group: Option<SignalGroup>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let database_url = cli
        .database_url
        .context("Database URL is required. Set --database-url or DATABASE_URL environment variable")?;
    let connection = Connection {
        database_url,
        access_token: cli.access_token,
        api_base_url: cli.api_base_url,
    };

    match cli.command {
        Commands::Fanout => commands::fanout::run(&connection).await?,
        Commands::Work { strategy, group } => {
            commands::work::run(&connection, strategy, group).await?
        }
        Commands::Reclaim { older_than } => {
            commands::reclaim::run(&connection, &older_than).await?
        }
        Commands::Purge { group, what, yes } => {
            commands::purge::run(&connection, group, what, yes).await?
        }
        Commands::Stats { group } => commands::stats::run(&connection, group).await?,
    }

    Ok(())
}
