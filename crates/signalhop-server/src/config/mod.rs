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

//! Server configuration: TOML file, environment substitution and overrides,
//! and conversion into the core [`SignalhopConfig`].

mod defaults;
pub mod error;
pub mod loader;
pub mod types;
pub mod validation;

pub use error::{ConfigError, ValidationError};
pub use loader::ConfigLoader;
pub use types::*;
pub use validation::Validate;

use signalhop::{HopperRegistry, SignalGroup, SignalhopConfig};
use std::time::Duration;

impl ServerConfig {
    /// Builds the core configuration, rejecting unknown group names and
    /// values the core considers invalid.
    pub fn to_signalhop_config(&self) -> Result<SignalhopConfig, ValidationError> {
        let delivery = &self.delivery;
        let scheduling = &self.scheduling;

        let priority = scheduling
            .priority
            .iter()
            .map(|g| g.parse::<SignalGroup>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut hoppers = HopperRegistry::builtin();
        for (group, targets) in &self.hoppers {
            hoppers.set(group.parse::<SignalGroup>()?, targets.clone());
        }

        let mut builder = SignalhopConfig::builder()
            .max_attempts(delivery.max_attempts)
            .rate_limit_backoff(Duration::from_secs(delivery.rate_limit_backoff_secs))
            .lease_timeout(Duration::from_secs(delivery.lease_timeout_secs))
            .reclaim_on_run(delivery.reclaim_on_run)
            .respect_rate_limit_gate(delivery.respect_rate_limit_gate)
            .api_base_url(delivery.api_base_url.clone())
            .request_timeout(Duration::from_secs(delivery.request_timeout_secs))
            .maybe_access_token(delivery.access_token.clone())
            .per_queue_batch_size(scheduling.per_queue_batch_size)
            .clear_per_queue_batch_overrides()
            .inter_call_delay(Duration::from_secs(scheduling.inter_call_delay_secs))
            .priority(priority)
            .fanout_batch_size(scheduling.fanout_batch_size)
            .fanout_on_ingest(scheduling.fanout_on_ingest)
            .db_pool_size(self.database.pool_size)
            .hoppers(hoppers);

        for (group, size) in &scheduling.per_queue_batch_overrides {
            builder = builder.per_queue_batch_override(group.parse::<SignalGroup>()?, *size);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}
