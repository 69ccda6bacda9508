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
use signalhop::database::universal_types::{current_timestamp, to_rfc3339};
use signalhop::SignalGroup;

use super::Connection;

/// Run the `stats` command, printing counts per status for each group and
/// the state of the rate-limit gate.
pub async fn run(connection: &Connection, group: Option<SignalGroup>) -> Result<()> {
    let dal = connection.dal().await?;
    let groups: Vec<SignalGroup> = match group {
        Some(group) => vec![group],
        None => SignalGroup::ALL.to_vec(),
    };

    for group in groups {
        let signals = dal
            .signal()
            .count_by_status(group)
            .await
            .context("Failed to count signals")?;
        let tasks = dal
            .delivery_task()
            .count_by_status(group)
            .await
            .context("Failed to count delivery tasks")?;

        println!("{}", group);
        println!("  signals:");
        for row in &signals {
            println!("    {:<12}{}", row.status, row.count);
        }
        println!("  tasks:");
        for row in &tasks {
            println!("    {:<12}{}", row.status, row.count);
        }
    }

    let gate = dal
        .rate_limit_status()
        .latest()
        .await
        .context("Failed to read rate-limit status")?;
    match gate {
        Some(status) if status.is_active(current_timestamp()) => {
            let until = status
                .limited_until
                .as_ref()
                .map(to_rfc3339)
                .unwrap_or_default();
            println!("rate limit: active until {}", until);
        }
        _ => println!("rate limit: clear"),
    }

    Ok(())
}
