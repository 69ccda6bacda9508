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

//! Outbound calls to the downstream order API.
//!
//! The worker only talks to a [`DeliveryClient`]. Production uses
//! [`HttpDeliveryClient`]; tests substitute a scripted implementation.

pub mod classify;

pub use classify::{classify, DeliveryKind, DeliveryOutcome, RateLimitAction};

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use std::time::Duration;
use tracing::debug;

use crate::config::SignalhopConfig;
use crate::error::DeliveryError;
use crate::models::delivery_task::DeliveryTask;

/// Header carrying the downstream credential.
pub const ACCESS_TOKEN_HEADER: &str = "access-token";

/// One POST to one hopper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    pub hopper_id: String,
    pub access_token: String,
    /// Serialized JSON body, sent byte for byte.
    pub body: String,
}

impl DeliveryRequest {
    pub fn for_task(task: &DeliveryTask) -> Self {
        Self {
            hopper_id: task.hopper_id.clone(),
            access_token: task.access_token.clone(),
            body: task.payload.clone(),
        }
    }
}

/// Status and raw body of a downstream reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// Performs one delivery. Any HTTP status is an `Ok` reply; `Err` means no
/// reply was received.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send(&self, request: &DeliveryRequest) -> Result<HttpReply, DeliveryError>;
}

/// [`DeliveryClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpDeliveryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDeliveryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        url::Url::parse(base_url)
            .map_err(|e| DeliveryError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::InvalidEndpoint(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &SignalhopConfig) -> Result<Self, DeliveryError> {
        Self::new(config.api_base_url(), config.request_timeout())
    }

    /// `{base}/hopper/{id}/order`
    pub fn endpoint(&self, hopper_id: &str) -> String {
        format!("{}/hopper/{}/order", self.base_url, hopper_id)
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn send(&self, request: &DeliveryRequest) -> Result<HttpReply, DeliveryError> {
        let url = self.endpoint(&request.hopper_id);
        let token = HeaderValue::from_str(&request.access_token)
            .map_err(|e| DeliveryError::Transport(format!("Invalid access token header: {}", e)))?;

        debug!(url = %url, "Sending delivery request");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCESS_TOKEN_HEADER, token)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| DeliveryError::Transport(format!("Failed to read response body: {}", e)))?;

        Ok(HttpReply { status, body })
    }
}
