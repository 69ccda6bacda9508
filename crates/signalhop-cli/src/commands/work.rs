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
use clap::ValueEnum;
use signalhop::{SchedulingStrategy, SignalGroup, Worker};
use tracing::{info, warn};

use super::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Drain one group up to its batch size
    PerQueue,
    /// Drain all groups in priority order under one budget
    Global,
}

/// Run the `work` command: a single worker invocation.
pub async fn run(connection: &Connection, strategy: StrategyArg, group: SignalGroup) -> Result<()> {
    let config = connection.config()?;
    let dal = connection.dal().await?;

    let strategy = match strategy {
        StrategyArg::PerQueue => SchedulingStrategy::per_queue(group, &config),
        StrategyArg::Global => SchedulingStrategy::global(&config),
    };

    let worker = Worker::with_http_client(dal, config).context("Failed to build worker")?;
    let summary = worker.run(&strategy).await.context("Worker run failed")?;

    for report in &summary.reports {
        let line = format!(
            "task {} ({} signal {} #{} -> hopper {}) attempt {}: {:?}, now {}",
            report.task_id,
            report.group,
            report.signal_id,
            report.task_sub_id,
            report.hopper_id,
            report.attempt,
            report.kind,
            report.task_status.as_str()
        );
        match &report.error {
            Some(error) => warn!("{}: {}", line, error),
            None => info!("{}", line),
        }
    }
    info!("{}", summary.message());

    Ok(())
}
