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

use metrics_exporter_prometheus::PrometheusHandle;
use signalhop::{DeliveryClient, FanOut, SignalhopConfig, Worker, WorkerError, DAL};
use std::sync::Arc;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub dal: DAL,
    pub config: SignalhopConfig,
    pub fan_out: FanOut,
    pub worker: Worker,
    /// Present when a Prometheus recorder was installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// State delivering over HTTP to the configured API.
    pub fn new(dal: DAL, config: SignalhopConfig) -> Result<Self, WorkerError> {
        let worker = Worker::with_http_client(dal.clone(), config.clone())?;
        Ok(Self::from_parts(dal, config, worker))
    }

    /// State delivering through `client`.
    pub fn with_client(dal: DAL, config: SignalhopConfig, client: Arc<dyn DeliveryClient>) -> Self {
        let worker = Worker::new(dal.clone(), client, config.clone());
        Self::from_parts(dal, config, worker)
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    fn from_parts(dal: DAL, config: SignalhopConfig, worker: Worker) -> Self {
        Self {
            fan_out: FanOut::new(dal.clone(), config.clone()),
            dal,
            config,
            worker,
            metrics: None,
        }
    }
}
