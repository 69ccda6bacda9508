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

//! Implementation of the `reclaim` command.
//!
//! Moves tasks stuck in `processing` for longer than the given lease back to
//! `failed`, where the normal retry rules pick them up again.

use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use signalhop::database::universal_types::current_timestamp;
use tracing::info;

use super::Connection;

/// Parse a duration string like "10m", "1h", "1h30m" into a chrono::Duration.
///
/// Supported units:
/// - `d` - days
/// - `h` - hours
/// - `m` - minutes
/// - `s` - seconds
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err(anyhow!("Duration string cannot be empty"));
    }

    let mut total = Duration::zero();
    let mut current_num = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            current_num.push(c);
            continue;
        }

        if current_num.is_empty() {
            return Err(anyhow!(
                "Invalid duration format: expected number before '{}'",
                c
            ));
        }

        let num: i64 = current_num
            .parse()
            .with_context(|| format!("Invalid number in duration: {}", current_num))?;
        current_num.clear();

        let duration = match c {
            'd' => Duration::days(num),
            'h' => Duration::hours(num),
            'm' => Duration::minutes(num),
            's' => Duration::seconds(num),
            _ => return Err(anyhow!("Unknown duration unit: '{}'. Use d, h, m, or s", c)),
        };
        total = total + duration;
    }

    if !current_num.is_empty() {
        return Err(anyhow!(
            "Duration '{}' is missing a unit. Use d (days), h (hours), m (minutes), or s (seconds)",
            s
        ));
    }

    if total == Duration::zero() {
        return Err(anyhow!("Duration must be greater than zero"));
    }

    Ok(total)
}

pub async fn run(connection: &Connection, older_than: &str) -> Result<()> {
    let lease = parse_duration(older_than)
        .with_context(|| format!("Invalid duration: '{}'", older_than))?;

    info!("Reclaiming tasks claimed more than {} ago", older_than);

    let dal = connection.dal().await?;
    let reclaimed = dal
        .delivery_task()
        .reclaim_stale(lease, current_timestamp())
        .await
        .context("Failed to reclaim stale tasks")?;

    if reclaimed.is_empty() {
        info!("No tasks with an expired lease");
    }
    for task in &reclaimed {
        info!(
            "Reclaimed task {} ({} signal {} #{}) after {} attempt(s), now {}",
            task.id, task.signal_group, task.signal_id, task.task_sub_id, task.attempts, task.status
        );
    }

    Ok(())
}
