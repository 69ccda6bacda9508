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

//! Delivery Task Model
//!
//! A delivery task is one signal bound to one downstream hopper. The task's
//! state machine and its retry rules live here so the claim query, the
//! worker and the tests all read them from one place.
//!
//! ```text
//!            claim                 2xx
//! pending ─────────► processing ─────────► completed
//!                     │     ▲  │
//!                 429 │     │  │ other failure / lease expired
//!                     ▼     │  ▼
//!            rate_limited ──┴── failed
//!             (after backoff, while attempts < max_attempts)
//! ```

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::database::schema::delivery_tasks;
use crate::database::universal_types::{utc_rfc3339, utc_rfc3339_option};
use crate::error::StoreError;
use crate::models::signal::SignalGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    RateLimited,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::RateLimited,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::RateLimited => "rate_limited",
        }
    }

    /// True when a task in this status with `attempts` claims behind it will
    /// never be claimed again under a limit of `max_attempts`.
    pub fn is_terminal(&self, attempts: i32, max_attempts: i32) -> bool {
        match self {
            TaskStatus::Completed => true,
            TaskStatus::Failed | TaskStatus::RateLimited => attempts >= max_attempts,
            TaskStatus::Pending | TaskStatus::Processing => false,
        }
    }

    /// Whether a task may move from `self` to `next`.
    ///
    /// Every move into `processing` is a claim; every move out of it is an
    /// outcome (or a lease reclaim, which lands in `failed`).
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Failed, Processing)
                | (RateLimited, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, RateLimited)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "rate_limited" => Ok(TaskStatus::RateLimited),
            other => Err(StoreError::InvalidValue {
                kind: "task status",
                value: other.to_string(),
            }),
        }
    }
}

/// Retry limits applied when deciding whether a task can be claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    /// How long a task answered with 429 sits out before it is eligible again.
    pub rate_limit_backoff: chrono::Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_backoff: chrono::Duration::minutes(5),
        }
    }
}

impl RetryPolicy {
    /// The eligibility predicate.
    ///
    /// A task may be claimed when it is pending, when it failed with attempts
    /// to spare, or when it was rate limited, has attempts to spare, and its
    /// last attempt is at least one backoff window old.
    ///
    /// `DeliveryTaskDAL::claim_next` expresses the same rule in SQL.
    pub fn is_eligible(
        &self,
        status: TaskStatus,
        attempts: i32,
        last_attempt_at: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> bool {
        match status {
            TaskStatus::Pending => true,
            TaskStatus::Failed => attempts < self.max_attempts,
            TaskStatus::RateLimited => {
                attempts < self.max_attempts
                    && last_attempt_at.is_some_and(|at| at <= self.backoff_cutoff(now))
            }
            TaskStatus::Processing | TaskStatus::Completed => false,
        }
    }

    /// Rate-limited tasks last attempted at or before this instant are
    /// eligible again.
    pub fn backoff_cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        now.checked_sub_signed(self.rate_limit_backoff)
            .unwrap_or(NaiveDateTime::MIN)
    }

    /// True when the task will never be claimed again.
    pub fn is_exhausted(&self, status: TaskStatus, attempts: i32) -> bool {
        status.is_terminal(attempts, self.max_attempts)
    }
}

/// A row of the `delivery_tasks` table.
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = delivery_tasks)]
pub struct DeliveryTask {
    pub id: i64,
    pub signal_group: String,
    pub signal_id: i64,
    /// 1-based position of this task among the tasks of its signal.
    pub task_sub_id: i32,
    pub hopper_id: String,
    pub exchange_name: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    /// The exact JSON body to POST.
    pub payload: String,
    pub status: String,
    /// Incremented once per claim, never at outcome time.
    pub attempts: i32,
    #[serde(with = "utc_rfc3339")]
    pub created_at: NaiveDateTime,
    #[serde(with = "utc_rfc3339_option")]
    pub last_attempt_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
}

impl DeliveryTask {
    pub fn status(&self) -> Result<TaskStatus, StoreError> {
        self.status.parse()
    }

    pub fn group(&self) -> Result<SignalGroup, StoreError> {
        self.signal_group
            .parse()
            .map_err(|_| StoreError::InvalidValue {
                kind: "signal group",
                value: self.signal_group.clone(),
            })
    }

    pub fn request_body(&self) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = delivery_tasks)]
pub struct NewDeliveryTask {
    pub signal_group: String,
    pub signal_id: i64,
    pub task_sub_id: i32,
    pub hopper_id: String,
    pub exchange_name: String,
    pub access_token: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub created_at: NaiveDateTime,
}

/// Number of tasks of a group currently in one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}
