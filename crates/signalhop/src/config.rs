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

//! Runtime configuration for fan-out and the delivery worker.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConfigError;
use crate::hoppers::HopperRegistry;
use crate::models::delivery_task::RetryPolicy;
use crate::models::signal::SignalGroup;

/// Base URL of the downstream order API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.cryptohopper.com/v1";

/// Converts a configured duration for timestamp arithmetic, saturating
/// instead of failing on absurdly large values.
pub fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Configuration for signal fan-out and delivery.
///
/// # Construction
///
/// Use [`SignalhopConfig::builder()`] to create a configuration:
///
/// ```rust,ignore
/// let config = SignalhopConfig::builder()
///     .access_token("secret")
///     .max_attempts(5)
///     .inter_call_delay(Duration::from_secs(10))
///     .build();
/// ```
///
/// Or use the default configuration (no access token, so workers refuse to
/// run until one is supplied):
///
/// ```rust,ignore
/// let config = SignalhopConfig::default();
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SignalhopConfig {
    max_attempts: i32,
    rate_limit_backoff: Duration,
    lease_timeout: Duration,
    reclaim_on_run: bool,
    respect_rate_limit_gate: bool,
    per_queue_batch_size: usize,
    per_queue_batch_overrides: HashMap<SignalGroup, usize>,
    inter_call_delay: Duration,
    priority: Vec<SignalGroup>,
    fanout_batch_size: usize,
    fanout_on_ingest: bool,
    api_base_url: String,
    request_timeout: Duration,
    access_token: Option<String>,
    db_pool_size: u32,
    hoppers: HopperRegistry,
}

impl SignalhopConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> SignalhopConfigBuilder {
        SignalhopConfigBuilder::default()
    }

    /// Maximum number of claims a task gets before it is abandoned.
    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    /// How long a throttled task (and the global gate) waits after a 429.
    pub fn rate_limit_backoff(&self) -> Duration {
        self.rate_limit_backoff
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            rate_limit_backoff: chrono_duration(self.rate_limit_backoff),
        }
    }

    /// How long a task may stay `processing` before a sweep reclaims it.
    pub fn lease_timeout(&self) -> Duration {
        self.lease_timeout
    }

    /// Whether each worker invocation starts with a lease reclaim sweep.
    pub fn reclaim_on_run(&self) -> bool {
        self.reclaim_on_run
    }

    /// Whether workers consult the rate-limit status before claiming.
    pub fn respect_rate_limit_gate(&self) -> bool {
        self.respect_rate_limit_gate
    }

    /// Default per-queue task budget.
    pub fn per_queue_batch_size(&self) -> usize {
        self.per_queue_batch_size
    }

    /// Per-queue task budget for `group`, after overrides.
    pub fn batch_size_for(&self, group: SignalGroup) -> usize {
        self.per_queue_batch_overrides
            .get(&group)
            .copied()
            .unwrap_or(self.per_queue_batch_size)
    }

    /// Pause between successive deliveries within one invocation.
    pub fn inter_call_delay(&self) -> Duration {
        self.inter_call_delay
    }

    /// Group order used by the global priority worker.
    pub fn priority(&self) -> &[SignalGroup] {
        &self.priority
    }

    /// Maximum signals per group handled by one fan-out sweep.
    pub fn fanout_batch_size(&self) -> usize {
        self.fanout_batch_size
    }

    /// Whether ingestion fans a signal out right after storing it.
    pub fn fanout_on_ingest(&self) -> bool {
        self.fanout_on_ingest
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Timeout for one delivery HTTP request.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Credential stamped on fanned-out tasks.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Number of database connections in the pool.
    pub fn db_pool_size(&self) -> u32 {
        self.db_pool_size
    }

    pub fn hoppers(&self) -> &HopperRegistry {
        &self.hoppers
    }

    /// Checks the values a builder cannot reject on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::InvalidMaxAttempts);
        }
        if self.per_queue_batch_size == 0
            || self.fanout_batch_size == 0
            || self.per_queue_batch_overrides.values().any(|size| *size == 0)
        {
            return Err(ConfigError::InvalidBatchSize);
        }
        validate_priority(&self.priority)?;
        self.hoppers.validate()
    }
}

/// A priority list must name each group at most once and at least one group.
pub fn validate_priority(priority: &[SignalGroup]) -> Result<(), ConfigError> {
    if priority.is_empty() {
        return Err(ConfigError::EmptyPriority);
    }
    for (index, group) in priority.iter().enumerate() {
        if priority[..index].contains(group) {
            return Err(ConfigError::DuplicatePriority(group.to_string()));
        }
    }
    Ok(())
}

/// Builder for [`SignalhopConfig`].
#[derive(Debug, Clone)]
pub struct SignalhopConfigBuilder {
    config: SignalhopConfig,
}

impl Default for SignalhopConfigBuilder {
    fn default() -> Self {
        Self {
            config: SignalhopConfig {
                max_attempts: 3,
                rate_limit_backoff: Duration::from_secs(5 * 60),
                lease_timeout: Duration::from_secs(10 * 60),
                reclaim_on_run: true,
                respect_rate_limit_gate: true,
                per_queue_batch_size: 30,
                per_queue_batch_overrides: HashMap::from([(SignalGroup::Btc, 1)]),
                inter_call_delay: Duration::from_secs(20),
                priority: SignalGroup::ALL.to_vec(),
                fanout_batch_size: 10,
                fanout_on_ingest: false,
                api_base_url: DEFAULT_API_BASE_URL.to_string(),
                request_timeout: Duration::from_secs(30),
                access_token: None,
                db_pool_size: 10,
                hoppers: HopperRegistry::builtin(),
            },
        }
    }
}

impl SignalhopConfigBuilder {
    pub fn max_attempts(mut self, value: i32) -> Self {
        self.config.max_attempts = value;
        self
    }

    pub fn rate_limit_backoff(mut self, value: Duration) -> Self {
        self.config.rate_limit_backoff = value;
        self
    }

    pub fn lease_timeout(mut self, value: Duration) -> Self {
        self.config.lease_timeout = value;
        self
    }

    pub fn reclaim_on_run(mut self, value: bool) -> Self {
        self.config.reclaim_on_run = value;
        self
    }

    pub fn respect_rate_limit_gate(mut self, value: bool) -> Self {
        self.config.respect_rate_limit_gate = value;
        self
    }

    pub fn per_queue_batch_size(mut self, value: usize) -> Self {
        self.config.per_queue_batch_size = value;
        self
    }

    /// Overrides the per-queue budget of one group.
    pub fn per_queue_batch_override(mut self, group: SignalGroup, value: usize) -> Self {
        self.config.per_queue_batch_overrides.insert(group, value);
        self
    }

    /// Drops all per-group budget overrides.
    pub fn clear_per_queue_batch_overrides(mut self) -> Self {
        self.config.per_queue_batch_overrides.clear();
        self
    }

    pub fn inter_call_delay(mut self, value: Duration) -> Self {
        self.config.inter_call_delay = value;
        self
    }

    pub fn priority(mut self, value: Vec<SignalGroup>) -> Self {
        self.config.priority = value;
        self
    }

    pub fn fanout_batch_size(mut self, value: usize) -> Self {
        self.config.fanout_batch_size = value;
        self
    }

    pub fn fanout_on_ingest(mut self, value: bool) -> Self {
        self.config.fanout_on_ingest = value;
        self
    }

    pub fn api_base_url(mut self, value: impl Into<String>) -> Self {
        self.config.api_base_url = value.into();
        self
    }

    pub fn request_timeout(mut self, value: Duration) -> Self {
        self.config.request_timeout = value;
        self
    }

    pub fn access_token(mut self, value: impl Into<String>) -> Self {
        self.config.access_token = Some(value.into());
        self
    }

    pub fn maybe_access_token(mut self, value: Option<String>) -> Self {
        self.config.access_token = value;
        self
    }

    pub fn db_pool_size(mut self, value: u32) -> Self {
        self.config.db_pool_size = value;
        self
    }

    pub fn hoppers(mut self, value: HopperRegistry) -> Self {
        self.config.hoppers = value;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> SignalhopConfig {
        self.config
    }
}

impl Default for SignalhopConfig {
    fn default() -> Self {
        SignalhopConfigBuilder::default().build()
    }
}
