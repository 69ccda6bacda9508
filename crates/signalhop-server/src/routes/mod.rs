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

//! Router construction and the query parsing shared by handlers.

pub mod health;
pub mod inspect;
pub mod jobs;
pub mod webhook;

use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use signalhop::SignalGroup;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

pub const DEFAULT_LIMIT: i64 = 20;
pub const DEFAULT_FORWARDED_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 500;

/// Query string accepted by the listing and admin endpoints.
///
/// Everything is taken as text so a malformed value falls back to a
/// default instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
pub struct GroupQuery {
    pub group: Option<String>,
    pub limit: Option<String>,
    pub id: Option<String>,
}

impl GroupQuery {
    /// Unknown or missing group tags resolve to `default`.
    pub fn group(&self) -> SignalGroup {
        SignalGroup::from_tag(self.group.as_deref())
    }

    /// Group for a destructive request. Unknown tags are rejected; a missing
    /// tag means `default`.
    pub fn strict_group(&self) -> Result<SignalGroup, ApiError> {
        match self.group.as_deref() {
            None => Ok(SignalGroup::Default),
            Some(raw) => parse_group(raw),
        }
    }

    /// Group for a request that clears a whole table. The tag must be given
    /// and known.
    pub fn required_group(&self) -> Result<SignalGroup, ApiError> {
        match self.group.as_deref() {
            None => Err(ApiError::bad_request(
                "Query parameter 'group' is required to delete a whole group",
            )),
            Some(raw) => parse_group(raw),
        }
    }

    pub fn limit(&self, default: i64) -> i64 {
        parse_limit(self.limit.as_deref(), default)
    }
}

fn parse_group(raw: &str) -> Result<SignalGroup, ApiError> {
    raw.parse::<SignalGroup>()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

/// Parses a page size. Non-numeric or non-positive values give `default`;
/// anything above [`MAX_LIMIT`] is capped.
pub fn parse_limit(raw: Option<&str>, default: i64) -> i64 {
    match raw.and_then(|r| r.trim().parse::<i64>().ok()) {
        Some(n) if n > 0 => n.min(MAX_LIMIT),
        _ => default,
    }
}

pub fn build_router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route(
            "/api/webhook",
            post(webhook::ingest_signal).get(inspect::list_signals),
        )
        .route("/api/webhook/{group}", post(webhook::ingest_signal_for_group))
        .route(
            "/api/signals",
            get(inspect::list_signals).delete(inspect::delete_signals),
        )
        .route(
            "/api/queue",
            get(inspect::list_tasks).delete(inspect::delete_tasks),
        )
        .route(
            "/api/forwarded",
            get(inspect::list_forwarded).delete(inspect::delete_forwarded),
        )
        .route("/api/hoppers", get(inspect::list_hoppers))
        .route(
            "/api/cron/queue-new-signals",
            get(jobs::queue_new_signals).post(jobs::queue_new_signals),
        )
        .route(
            "/api/worker/process-queue",
            get(jobs::process_queue).post(jobs::process_queue),
        )
        .route(
            "/api/worker/process-global-queue",
            get(jobs::process_global_queue).post(jobs::process_global_queue),
        )
        .route(
            "/api/worker/reclaim",
            get(jobs::reclaim).post(jobs::reclaim),
        )
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
