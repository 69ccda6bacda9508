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

//! Signal ingestion.
//!
//! The group comes from the path segment, then the `group` query parameter,
//! then the body's own `group` field. Malformed bodies are rejected with 400
//! before anything is written.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::{json, Value};
use signalhop::dal::FanOutResult;
use signalhop::database::universal_types::current_timestamp;
use signalhop::ingest::{ingest, IngestReceipt};
use signalhop::InboundSignal;
use tracing::warn;

use super::GroupQuery;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn ingest_signal(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    store(&state, &body, query.group.as_deref()).await
}

pub async fn ingest_signal_for_group(
    State(state): State<AppState>,
    Path(group): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    store(&state, &body, Some(&group)).await
}

async fn store(state: &AppState, body: &[u8], group_hint: Option<&str>) -> Result<Json<Value>, ApiError> {
    let inbound = InboundSignal::parse(body, group_hint).map_err(|e| {
        warn!("Rejected inbound signal: {}", e);
        ApiError::bad_request(e.to_string())
    })?;

    let receipt = ingest(&state.dal, &state.config, inbound, current_timestamp())
        .await
        .map_err(|e| {
            if e.is_rejection() {
                ApiError::bad_request(e.to_string())
            } else {
                ApiError::internal("Failed to store signal", e)
            }
        })?;

    Ok(Json(receipt_body(&receipt)))
}

fn receipt_body(receipt: &IngestReceipt) -> Value {
    let queued_tasks = match &receipt.fan_out {
        Some(FanOutResult::Queued { task_count, .. }) => Some(*task_count),
        _ => None,
    };

    json!({
        "success": true,
        "message": "Signal stored",
        "savedSignalId": receipt.signal.id,
        "group": receipt.signal.signal_group,
        "queuedTasks": queued_tasks,
    })
}
