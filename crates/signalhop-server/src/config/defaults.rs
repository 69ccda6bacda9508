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

use crate::config::types::*;
use signalhop::SignalhopConfig;
use std::collections::BTreeMap;

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./signalhop.db".to_string(),
            pool_size: 10,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            log_directory: None,
            body_limit_bytes: 64 * 1024,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        let core = SignalhopConfig::default();
        Self {
            api_base_url: core.api_base_url().to_string(),
            access_token: None,
            request_timeout_secs: core.request_timeout().as_secs(),
            max_attempts: core.max_attempts(),
            rate_limit_backoff_secs: core.rate_limit_backoff().as_secs(),
            lease_timeout_secs: core.lease_timeout().as_secs(),
            reclaim_on_run: core.reclaim_on_run(),
            respect_rate_limit_gate: core.respect_rate_limit_gate(),
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        let core = SignalhopConfig::default();
        let mut per_queue_batch_overrides = BTreeMap::new();
        per_queue_batch_overrides.insert("btc".to_string(), 1);

        Self {
            per_queue_batch_size: core.per_queue_batch_size(),
            per_queue_batch_overrides,
            inter_call_delay_secs: core.inter_call_delay().as_secs(),
            priority: core.priority().iter().map(|g| g.to_string()).collect(),
            fanout_batch_size: core.fanout_batch_size(),
            fanout_on_ingest: core.fanout_on_ingest(),
        }
    }
}
