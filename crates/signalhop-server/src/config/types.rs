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

use serde::{Deserialize, Serialize};
use signalhop::HopperTarget;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Environment variable that overrides `database.url`.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// Environment variable that overrides `delivery.access_token`.
pub const ACCESS_TOKEN_ENV: &str = "CRYPTOHOPPER_ACCESS_TOKEN";

/// Contents of `signalhop.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub database: DatabaseConfig,
    pub server: HttpConfig,
    pub delivery: DeliveryConfig,
    pub scheduling: SchedulingConfig,
    /// Replacement target lists, keyed by group name. Groups not listed keep
    /// the built-in targets.
    pub hoppers: BTreeMap<String, Vec<HopperTarget>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
    /// `text` or `json`.
    pub log_format: String,
    /// When set, logs also go to a daily rolling file in this directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_directory: Option<PathBuf>,
    /// Maximum accepted webhook body size in bytes.
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub api_base_url: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub max_attempts: i32,
    pub rate_limit_backoff_secs: u64,
    pub lease_timeout_secs: u64,
    pub reclaim_on_run: bool,
    pub respect_rate_limit_gate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub per_queue_batch_size: usize,
    /// Per-group budgets, keyed by group name.
    pub per_queue_batch_overrides: BTreeMap<String, usize>,
    pub inter_call_delay_secs: u64,
    pub priority: Vec<String>,
    pub fanout_batch_size: usize,
    pub fanout_on_ingest: bool,
}
