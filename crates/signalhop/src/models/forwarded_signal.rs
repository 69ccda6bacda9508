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

//! Outcome records: one immutable row per delivery attempt.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::schema::forwarded_signals;
use crate::database::universal_types::utc_rfc3339;

/// Coarse result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "SUCCESS",
            OutcomeStatus::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = forwarded_signals)]
pub struct ForwardedSignal {
    pub id: i64,
    pub signal_group: String,
    pub task_id: i64,
    pub signal_id: i64,
    pub task_sub_id: i32,
    /// Absent when no HTTP response was received.
    pub http_status_code: Option<i32>,
    pub request_payload: String,
    pub response_payload: String,
    pub status: String,
    pub error_message: Option<String>,
    pub hopper_id: String,
    pub exchange_name: String,
    #[serde(with = "utc_rfc3339")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = forwarded_signals)]
pub struct NewForwardedSignal {
    pub signal_group: String,
    pub task_id: i64,
    pub signal_id: i64,
    pub task_sub_id: i32,
    pub http_status_code: Option<i32>,
    pub request_payload: String,
    pub response_payload: String,
    pub status: String,
    pub error_message: Option<String>,
    pub hopper_id: String,
    pub exchange_name: String,
    pub created_at: NaiveDateTime,
}
