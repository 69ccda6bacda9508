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

//! Trigger endpoints called on a fixed interval by an external scheduler.
//!
//! Each call does at most its configured amount of work and returns a
//! summary. A worker run can take minutes because of the pause between
//! deliveries; callers should set their timeout accordingly.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use signalhop::{FanOutError, SchedulingStrategy, SignalGroup, WorkerError};

use crate::error::ApiError;
use crate::state::AppState;

const MISSING_TOKEN: &str = "Server misconfiguration: CRYPTOHOPPER_ACCESS_TOKEN is not set";

#[derive(Debug, Default, Deserialize)]
pub struct WorkerQuery {
    pub group: Option<String>,
}

pub async fn queue_new_signals(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let summary = state.fan_out.sweep().await.map_err(|e| match e {
        FanOutError::MissingCredential => ApiError::misconfigured(MISSING_TOKEN),
        other => ApiError::internal("Fan-out sweep failed", other),
    })?;

    Ok(Json(json!({
        "success": true,
        "message": summary.message(),
        "summary": summary,
    })))
}

/// Runs the per-queue strategy for `?group`, `default` when omitted.
pub async fn process_queue(
    State(state): State<AppState>,
    Query(query): Query<WorkerQuery>,
) -> Result<Json<Value>, ApiError> {
    let group = match query.group.as_deref() {
        None => SignalGroup::Default,
        Some(raw) => raw
            .parse::<SignalGroup>()
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
    };

    let strategy = SchedulingStrategy::per_queue(group, state.worker.config());
    run(&state, &strategy).await
}

pub async fn process_global_queue(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let strategy = SchedulingStrategy::global(state.worker.config());
    run(&state, &strategy).await
}

pub async fn reclaim(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let reclaimed = state
        .worker
        .reclaim()
        .await
        .map_err(|e| ApiError::internal("Lease reclaim failed", e))?;

    let task_ids: Vec<i64> = reclaimed.iter().map(|t| t.id).collect();
    Ok(Json(json!({
        "success": true,
        "message": format!("Reclaimed {} task(s) with expired leases", task_ids.len()),
        "reclaimed": task_ids.len(),
        "taskIds": task_ids,
    })))
}

async fn run(state: &AppState, strategy: &SchedulingStrategy) -> Result<Json<Value>, ApiError> {
    let summary = state.worker.run(strategy).await.map_err(|e| match e {
        WorkerError::MissingCredential => ApiError::misconfigured(MISSING_TOKEN),
        other => ApiError::internal("Worker run failed", other),
    })?;

    Ok(Json(json!({
        "success": true,
        "message": summary.message(),
        "summary": summary,
    })))
}
