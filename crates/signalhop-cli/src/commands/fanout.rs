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
use signalhop::FanOut;
use tracing::{info, warn};

use super::Connection;

/// Run the `fanout` command: one sweep over every group.
pub async fn run(connection: &Connection) -> Result<()> {
    let config = connection.config()?;
    let dal = connection.dal().await?;

    let summary = FanOut::new(dal, config)
        .sweep()
        .await
        .context("Fan-out sweep failed")?;

    for group in &summary.groups {
        match &group.error {
            Some(error) => warn!("{}: {}", group.group, error),
            None => info!(
                "{}: {} signal(s) queued, {} task(s) created, {} rejected",
                group.group, group.signals_queued, group.tasks_created, group.signals_rejected
            ),
        }
    }
    info!("{}", summary.message());

    Ok(())
}
