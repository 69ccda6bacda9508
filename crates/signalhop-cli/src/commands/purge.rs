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

//! Implementation of the `purge` command, an operational reset of one group.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use signalhop::SignalGroup;
use tracing::info;

use super::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PurgeTarget {
    Signals,
    Tasks,
    Outcomes,
    All,
}

impl PurgeTarget {
    fn includes(self, other: PurgeTarget) -> bool {
        self == PurgeTarget::All || self == other
    }
}

pub async fn run(connection: &Connection, group: SignalGroup, what: PurgeTarget, yes: bool) -> Result<()> {
    if !yes {
        bail!(
            "Refusing to purge {:?} for group {} without --yes",
            what,
            group
        );
    }

    let dal = connection.dal().await?;

    if what.includes(PurgeTarget::Outcomes) {
        let deleted = dal
            .forwarded_signal()
            .delete_all(group)
            .await
            .context("Failed to delete outcome records")?;
        info!("Deleted {} outcome record(s) from group {}", deleted, group);
    }
    if what.includes(PurgeTarget::Tasks) {
        let deleted = dal
            .delivery_task()
            .delete_all(group)
            .await
            .context("Failed to delete delivery tasks")?;
        info!("Deleted {} delivery task(s) from group {}", deleted, group);
    }
    if what.includes(PurgeTarget::Signals) {
        let deleted = dal
            .signal()
            .delete_all(group)
            .await
            .context("Failed to delete signals")?;
        info!("Deleted {} signal(s) from group {}", deleted, group);
    }

    Ok(())
}
