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

//! Delivery worker.
//!
//! One [`Worker::run`] call is one short-lived invocation: reclaim expired
//! leases, then repeatedly check the rate-limit gate, claim one task and
//! deliver it, until the strategy's budget is spent or nothing is eligible.
//! Invocations share nothing in memory; any number may run at once against
//! the same database.
//!
//! Per task the order of writes is fixed: rate-limit row, then the task
//! status together with its outcome record, in one transaction and only
//! while the claim is still held. The rate-limit row is advisory. A failed
//! record insert is logged and does not undo the status write.

mod strategy;

pub use strategy::{RunPlan, SchedulingStrategy};

use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::clock::{Clock, SystemClock};
use crate::config::{chrono_duration, SignalhopConfig};
use crate::dal::DAL;
use crate::database::universal_types::{to_rfc3339, utc_rfc3339};
use crate::delivery::{
    classify, DeliveryClient, DeliveryKind, DeliveryOutcome, DeliveryRequest,
    HttpDeliveryClient, RateLimitAction,
};
use crate::error::{StoreError, WorkerError};
use crate::fanout::short_run_id;
use crate::models::delivery_task::{DeliveryTask, RetryPolicy, TaskStatus};
use crate::models::forwarded_signal::NewForwardedSignal;
use crate::models::rate_limit::NewRateLimitStatus;
use crate::models::signal::SignalGroup;

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The budget was spent or the queues ran dry after `processed` tasks.
    Completed { processed: usize },
    /// Nothing was eligible on the first claim.
    NoEligibleTasks,
    /// The gate was closed before a claim; `processed` tasks were delivered
    /// earlier in the same invocation.
    RateLimited {
        #[serde(with = "utc_rfc3339")]
        until: NaiveDateTime,
        processed: usize,
    },
}

/// What happened to one claimed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    pub task_id: i64,
    pub group: String,
    pub signal_id: i64,
    pub task_sub_id: i32,
    pub hopper_id: String,
    /// Attempt number of this delivery, starting at 1.
    pub attempt: i32,
    pub kind: DeliveryKind,
    pub http_status: Option<u16>,
    pub task_status: TaskStatus,
    pub error: Option<String>,
    /// False when the outcome record could not be written.
    pub outcome_recorded: bool,
    /// False when the status write was skipped because the claim was lost.
    /// No outcome record is written then either.
    pub status_written: bool,
}

/// Summary returned by every invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub strategy: String,
    pub outcome: RunOutcome,
    /// Tasks moved out of an expired lease at the start of the run.
    pub reclaimed: usize,
    pub reports: Vec<TaskReport>,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.reports.len()
    }

    /// One-line description for HTTP and CLI output.
    pub fn message(&self) -> String {
        match &self.outcome {
            RunOutcome::Completed { processed } => format!(
                "Worker run {} completed. Processed {} task(s).",
                self.run_id, processed
            ),
            RunOutcome::NoEligibleTasks => format!(
                "Worker run {} completed. No eligible tasks found.",
                self.run_id
            ),
            RunOutcome::RateLimited { until, processed: 0 } => format!(
                "Worker run {} skipped: rate limit active until {}.",
                self.run_id,
                to_rfc3339(until)
            ),
            RunOutcome::RateLimited { until, processed } => format!(
                "Worker run {} processed {} task(s), then stopped: rate limit active until {}.",
                self.run_id,
                processed,
                to_rfc3339(until)
            ),
        }
    }
}

/// Claims and delivers tasks.
#[derive(Clone)]
pub struct Worker {
    dal: DAL,
    client: Arc<dyn DeliveryClient>,
    config: SignalhopConfig,
    clock: Arc<dyn Clock>,
}

impl Worker {
    pub fn new(dal: DAL, client: Arc<dyn DeliveryClient>, config: SignalhopConfig) -> Self {
        Self {
            dal,
            client,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// A worker delivering over HTTP with the configured endpoint and timeout.
    pub fn with_http_client(dal: DAL, config: SignalhopConfig) -> Result<Self, WorkerError> {
        let client = HttpDeliveryClient::from_config(&config)
            .map_err(|e| WorkerError::Client(e.to_string()))?;
        Ok(Self::new(dal, Arc::new(client), config))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SignalhopConfig {
        &self.config
    }

    /// Runs one invocation under `strategy`.
    ///
    /// Fails without doing any work when no access token is configured, and
    /// aborts with [`WorkerError::Claim`] when a claim transaction fails.
    /// Delivery, outcome and status-write failures of individual tasks are
    /// recorded in the summary instead.
    pub async fn run(&self, strategy: &SchedulingStrategy) -> Result<RunSummary, WorkerError> {
        if self.config.access_token().is_none() {
            error!("Worker refused to run: no access token configured");
            return Err(WorkerError::MissingCredential);
        }

        let run_id = format!("{}-{}", strategy, short_run_id());
        let span = info_span!("worker_run", run_id = %run_id);
        self.run_inner(run_id, strategy).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: String,
        strategy: &SchedulingStrategy,
    ) -> Result<RunSummary, WorkerError> {
        let plan = strategy.plan();
        let policy = self.config.retry_policy();
        info!(
            groups = ?plan.groups,
            budget = plan.budget,
            "Worker run started"
        );

        let reclaimed = if self.config.reclaim_on_run() {
            match self.reclaim().await {
                Ok(tasks) => tasks.len(),
                Err(e) => {
                    warn!("Lease reclaim failed, continuing: {}", e);
                    0
                }
            }
        } else {
            0
        };

        let mut reports: Vec<TaskReport> = Vec::new();
        let outcome = loop {
            if reports.len() >= plan.budget {
                break RunOutcome::Completed {
                    processed: reports.len(),
                };
            }

            if let Some(until) = self.active_rate_limit().await {
                metrics::counter!("signalhop_worker_gate_skips_total").increment(1);
                info!(until = %to_rfc3339(&until), "Rate limit active, not claiming");
                break RunOutcome::RateLimited {
                    until,
                    processed: reports.len(),
                };
            }

            let Some(task) = self
                .claim_first(&plan.groups, &policy)
                .await
                .map_err(WorkerError::Claim)?
            else {
                break if reports.is_empty() {
                    RunOutcome::NoEligibleTasks
                } else {
                    RunOutcome::Completed {
                        processed: reports.len(),
                    }
                };
            };

            // Deliveries are spaced by the pause; there is none after the
            // last one, so a drained queue ends the run straight away.
            if !reports.is_empty() && !plan.inter_call_delay.is_zero() {
                debug!(
                    task_id = task.id,
                    delay_ms = plan.inter_call_delay.as_millis() as u64,
                    "Pausing before next delivery"
                );
                tokio::time::sleep(plan.inter_call_delay).await;
            }

            reports.push(self.process_task(task).await);
        };

        let summary = RunSummary {
            run_id,
            strategy: strategy.to_string(),
            outcome,
            reclaimed,
            reports,
        };
        info!("{}", summary.message());
        Ok(summary)
    }

    /// The `limited_until` of the current rate-limit row if it still gates
    /// claims. Read failures are logged and treated as "not limited"; the
    /// claim itself is the authoritative check.
    async fn active_rate_limit(&self) -> Option<NaiveDateTime> {
        if !self.config.respect_rate_limit_gate() {
            return None;
        }
        let now = self.clock.now();
        match self.dal.rate_limit_status().latest().await {
            Ok(Some(status)) if status.is_active(now) => status.limited_until,
            Ok(_) => None,
            Err(e) => {
                warn!("Could not read rate-limit status: {}", e);
                None
            }
        }
    }

    /// Claims from the first group in `groups` that has an eligible task.
    async fn claim_first(
        &self,
        groups: &[SignalGroup],
        policy: &RetryPolicy,
    ) -> Result<Option<DeliveryTask>, StoreError> {
        for group in groups {
            let now = self.clock.now();
            if let Some(task) = self.dal.delivery_task().claim_next(*group, policy, now).await? {
                metrics::counter!("signalhop_tasks_claimed_total", "group" => group.as_str())
                    .increment(1);
                debug!(
                    task_id = task.id,
                    group = %group,
                    attempt = task.attempts,
                    "Claimed task"
                );
                return Ok(Some(task));
            }
            debug!(group = %group, "No eligible task");
        }
        Ok(None)
    }

    /// Delivers one claimed task and records everything about the attempt.
    ///
    /// The task must have been returned by a claim; its `attempts` is the
    /// value the status write is guarded by.
    pub async fn process_task(&self, task: DeliveryTask) -> TaskReport {
        let request = DeliveryRequest::for_task(&task);
        debug!(
            task_id = task.id,
            hopper_id = %task.hopper_id,
            exchange = %task.exchange_name,
            "Delivering task"
        );

        let outcome = classify(self.client.send(&request).await);
        let now = self.clock.now();

        metrics::counter!(
            "signalhop_deliveries_total",
            "group" => task.signal_group.clone(),
            "result" => outcome.kind.as_str()
        )
        .increment(1);

        match &outcome.error {
            None => info!(task_id = task.id, "Delivery succeeded"),
            Some(e) => warn!(task_id = task.id, kind = outcome.kind.as_str(), "Delivery failed: {}", e),
        }

        self.record_rate_limit(&outcome, now).await;

        let next_status = outcome.next_task_status();
        let (status_written, outcome_recorded) = match self
            .dal
            .delivery_task()
            .record_outcome(task.attempts, next_status, attempt_record(&task, &outcome, now))
            .await
        {
            Ok(write) => {
                if let Some(e) = &write.record_error {
                    error!(task_id = task.id, "Failed to record delivery outcome: {}", e);
                }
                (write.status_written, write.recorded())
            }
            Err(e) => {
                error!(task_id = task.id, "Failed to write task status: {}", e);
                (false, false)
            }
        };

        TaskReport {
            task_id: task.id,
            group: task.signal_group,
            signal_id: task.signal_id,
            task_sub_id: task.task_sub_id,
            hopper_id: task.hopper_id,
            attempt: task.attempts,
            kind: outcome.kind,
            http_status: outcome.http_status,
            task_status: next_status,
            error: outcome.error,
            outcome_recorded,
            status_written,
        }
    }

    async fn record_rate_limit(&self, outcome: &DeliveryOutcome, now: NaiveDateTime) {
        let window = chrono_duration(self.config.rate_limit_backoff());
        let row = match outcome.rate_limit_action(now, window) {
            RateLimitAction::Set { until } => NewRateLimitStatus::limited(until, now),
            RateLimitAction::Clear => NewRateLimitStatus::cleared(now),
        };
        if let Err(e) = self.dal.rate_limit_status().record(row).await {
            warn!("Failed to record rate-limit status: {}", e);
        }
    }

    /// Moves tasks whose lease expired back to `failed`.
    pub async fn reclaim(&self) -> Result<Vec<DeliveryTask>, WorkerError> {
        let lease = chrono_duration(self.config.lease_timeout());
        let reclaimed = self
            .dal
            .delivery_task()
            .reclaim_stale(lease, self.clock.now())
            .await?;

        for task in &reclaimed {
            warn!(
                task_id = task.id,
                group = %task.signal_group,
                attempts = task.attempts,
                "Reclaimed task with expired lease"
            );
        }
        if !reclaimed.is_empty() {
            metrics::counter!("signalhop_leases_reclaimed_total").increment(reclaimed.len() as u64);
        }
        Ok(reclaimed)
    }
}

/// The outcome record of one delivery attempt. Never carries the access
/// token.
fn attempt_record(
    task: &DeliveryTask,
    outcome: &DeliveryOutcome,
    now: NaiveDateTime,
) -> NewForwardedSignal {
    NewForwardedSignal {
        signal_group: task.signal_group.clone(),
        task_id: task.id,
        signal_id: task.signal_id,
        task_sub_id: task.task_sub_id,
        http_status_code: outcome.http_status.map(i32::from),
        request_payload: task.payload.clone(),
        response_payload: outcome.response.to_string(),
        status: outcome.outcome_status().as_str().to_string(),
        error_message: outcome.error.clone(),
        hopper_id: task.hopper_id.clone(),
        exchange_name: task.exchange_name.clone(),
        created_at: now,
    }
}
