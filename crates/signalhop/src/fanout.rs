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

//! Periodic fan-out sweep.
//!
//! A sweep walks every group in priority order and fans out up to
//! `fanout_batch_size` waiting signals per group, one transaction per
//! signal. A database failure ends that group's sweep but not the others;
//! the failed signal is still `new` and the next sweep retries it.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

use crate::clock::{Clock, SystemClock};
use crate::config::SignalhopConfig;
use crate::dal::{FanOutResult, DAL};
use crate::error::FanOutError;
use crate::models::signal::SignalGroup;

/// Result of sweeping one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupFanOut {
    pub group: String,
    pub signals_queued: usize,
    pub tasks_created: usize,
    pub signals_rejected: usize,
    /// Set when the group was not swept or its sweep stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanOutSummary {
    pub run_id: String,
    pub groups: Vec<GroupFanOut>,
}

impl FanOutSummary {
    pub fn signals_queued(&self) -> usize {
        self.groups.iter().map(|g| g.signals_queued).sum()
    }

    pub fn tasks_created(&self) -> usize {
        self.groups.iter().map(|g| g.tasks_created).sum()
    }

    pub fn signals_rejected(&self) -> usize {
        self.groups.iter().map(|g| g.signals_rejected).sum()
    }

    pub fn message(&self) -> String {
        format!(
            "Run {} completed. Processed {} signals.",
            self.run_id,
            self.signals_queued() + self.signals_rejected()
        )
    }
}

/// Fans stored signals out into delivery tasks.
#[derive(Clone)]
pub struct FanOut {
    dal: DAL,
    config: SignalhopConfig,
    clock: Arc<dyn Clock>,
}

impl FanOut {
    pub fn new(dal: DAL, config: SignalhopConfig) -> Self {
        Self {
            dal,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sweeps every group once.
    pub async fn sweep(&self) -> Result<FanOutSummary, FanOutError> {
        let token = self
            .config
            .access_token()
            .ok_or(FanOutError::MissingCredential)?;
        let run_id = short_run_id();

        let span = info_span!("fanout_run", run_id = %run_id);
        async {
            let mut groups = Vec::with_capacity(SignalGroup::ALL.len());
            for group in SignalGroup::ALL {
                groups.push(self.sweep_group(group, token).await);
            }
            let summary = FanOutSummary { run_id, groups };
            info!(
                signals_queued = summary.signals_queued(),
                tasks_created = summary.tasks_created(),
                signals_rejected = summary.signals_rejected(),
                "Fan-out sweep finished"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn sweep_group(&self, group: SignalGroup, token: &str) -> GroupFanOut {
        let mut result = GroupFanOut {
            group: group.to_string(),
            ..Default::default()
        };

        let targets = self.config.hoppers().targets_for(group);
        if targets.is_empty() {
            error!(group = %group, "No hopper targets configured; skipping group");
            result.error = Some("no hopper targets configured".to_string());
            return result;
        }

        for _ in 0..self.config.fanout_batch_size() {
            let now = self.clock.now();
            match self
                .dal
                .fan_out()
                .fan_out_next(group, targets, token, None, now)
                .await
            {
                Ok(Some(FanOutResult::Queued {
                    signal_id,
                    task_count,
                })) => {
                    info!(group = %group, signal_id, task_count, "Signal queued");
                    metrics::counter!("signalhop_tasks_fanned_out_total", "group" => group.as_str())
                        .increment(task_count as u64);
                    result.signals_queued += 1;
                    result.tasks_created += task_count;
                }
                Ok(Some(FanOutResult::Rejected { signal_id, reason })) => {
                    warn!(group = %group, signal_id, "Stored signal is unreadable, marked as error: {}", reason);
                    result.signals_rejected += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    error!(group = %group, "Fan-out transaction failed: {}", e);
                    result.error = Some(e.to_string());
                    break;
                }
            }
        }

        result
    }

    /// Fans out one specific signal if it is still `new`.
    pub async fn fan_out_signal(
        &self,
        group: SignalGroup,
        signal_id: i64,
    ) -> Result<Option<FanOutResult>, FanOutError> {
        let token = self
            .config
            .access_token()
            .ok_or(FanOutError::MissingCredential)?;
        let targets = self.config.hoppers().targets_for(group);
        Ok(self
            .dal
            .fan_out()
            .fan_out_next(group, targets, token, Some(signal_id), self.clock.now())
            .await?)
    }
}

/// Short random identifier used to correlate log lines of one run.
pub(crate) fn short_run_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
