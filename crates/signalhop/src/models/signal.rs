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

//! Signal Model
//!
//! A signal is one inbound webhook event, stored verbatim before fan-out.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::database::schema::signals;
use crate::database::universal_types::utc_rfc3339;
use crate::error::{ConfigError, StoreError};

/// Independent partitions of signals, each with its own queue and targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalGroup {
    Default,
    Btc,
    Ai,
}

impl SignalGroup {
    /// All groups, in the reference priority order.
    pub const ALL: [SignalGroup; 3] = [SignalGroup::Default, SignalGroup::Btc, SignalGroup::Ai];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalGroup::Default => "default",
            SignalGroup::Btc => "btc",
            SignalGroup::Ai => "ai",
        }
    }

    /// Resolves an optional group tag, treating absent or unknown tags as
    /// `default`.
    pub fn from_tag(tag: Option<&str>) -> Self {
        tag.and_then(|t| t.trim().parse().ok())
            .unwrap_or(SignalGroup::Default)
    }
}

impl fmt::Display for SignalGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalGroup {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(SignalGroup::Default),
            "btc" => Ok(SignalGroup::Btc),
            "ai" => Ok(SignalGroup::Ai),
            other => Err(ConfigError::UnknownGroup(other.to_string())),
        }
    }
}

/// Lifecycle of a stored signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    New,
    Queued,
    /// The stored payload could not be fanned out and never will be.
    Error,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::New => "new",
            SignalStatus::Queued => "queued",
            SignalStatus::Error => "error",
        }
    }
}

impl FromStr for SignalStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(SignalStatus::New),
            "queued" => Ok(SignalStatus::Queued),
            "error" => Ok(SignalStatus::Error),
            other => Err(StoreError::InvalidValue {
                kind: "signal status",
                value: other.to_string(),
            }),
        }
    }
}

/// A row of the `signals` table.
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = signals)]
pub struct Signal {
    pub id: i64,
    pub signal_group: String,
    /// The inbound document as received, serialized JSON.
    pub raw_data: String,
    pub status: String,
    #[serde(with = "utc_rfc3339")]
    pub received_at: NaiveDateTime,
}

impl Signal {
    pub fn group(&self) -> Result<SignalGroup, StoreError> {
        self.signal_group
            .parse()
            .map_err(|_| StoreError::InvalidValue {
                kind: "signal group",
                value: self.signal_group.clone(),
            })
    }

    pub fn status(&self) -> Result<SignalStatus, StoreError> {
        self.status.parse()
    }

    /// The stored document, parsed.
    pub fn payload(&self) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::from_str(&self.raw_data)?)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = signals)]
pub struct NewSignal {
    pub signal_group: String,
    pub raw_data: String,
    pub status: String,
    pub received_at: NaiveDateTime,
}

impl NewSignal {
    pub fn new(
        group: SignalGroup,
        payload: &serde_json::Value,
        received_at: NaiveDateTime,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            signal_group: group.as_str().to_string(),
            raw_data: serde_json::to_string(payload)?,
            status: SignalStatus::New.as_str().to_string(),
            received_at,
        })
    }
}
