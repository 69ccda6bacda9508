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

//! Read and reset endpoints over one group's tables.

use axum::extract::{Query, State};
use axum::Json;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

use super::{GroupQuery, DEFAULT_FORWARDED_LIMIT, DEFAULT_LIMIT};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_signals(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> Result<Json<Value>, ApiError> {
    let group = query.group();
    let limit = query.limit(DEFAULT_LIMIT);

    let signals = state
        .dal
        .signal()
        .list_recent(group, limit)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch signals", e))?;
    let counts = state
        .dal
        .signal()
        .count_by_status(group)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch signals", e))?;

    Ok(Json(json!({
        "success": true,
        "group": group,
        "signals": signals,
        "counts": counts,
        "pagination": { "limit": limit },
    })))
}

/// Deletes one signal when `id` is given, otherwise every signal of the
/// group. Clearing a whole group needs an explicit `group`.
pub async fn delete_signals(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> Result<Json<Value>, ApiError> {
    let signals = state.dal.signal();

    let (group, deleted) = match query.id.as_deref() {
        Some(raw) => {
            let group = query.strict_group()?;
            let id = raw
                .trim()
                .parse::<i64>()
                .map_err(|_| ApiError::bad_request(format!("Invalid signal id '{}'", raw)))?;
            (group, signals.delete_by_id(group, id).await)
        }
        None => {
            let group = query.required_group()?;
            (group, signals.delete_all(group).await)
        }
    };
    let deleted = deleted.map_err(|e| ApiError::internal("Failed to delete signals", e))?;

    info!(group = %group, deleted, "Deleted signals");
    Ok(Json(json!({
        "success": true,
        "message": format!("Deleted {} signal(s) from group {}", deleted, group),
        "deleted": deleted,
    })))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> Result<Json<Value>, ApiError> {
    let group = query.group();
    let limit = query.limit(DEFAULT_LIMIT);
    let tasks_dal = state.dal.delivery_task();

    let tasks = tasks_dal
        .list_recent(group, limit)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch queue", e))?;
    let counts = tasks_dal
        .count_by_status(group)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch queue", e))?;

    Ok(Json(json!({
        "success": true,
        "group": group,
        "tasks": tasks,
        "counts": counts,
        "pagination": { "limit": limit },
    })))
}

pub async fn delete_tasks(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> Result<Json<Value>, ApiError> {
    let group = query.required_group()?;
    let deleted = state
        .dal
        .delivery_task()
        .delete_all(group)
        .await
        .map_err(|e| ApiError::internal("Failed to clear queue", e))?;

    info!(group = %group, deleted, "Cleared delivery queue");
    Ok(Json(json!({
        "success": true,
        "message": format!("Deleted {} task(s) from group {}", deleted, group),
        "deleted": deleted,
    })))
}

pub async fn list_forwarded(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> Result<Json<Value>, ApiError> {
    let group = query.group();
    let limit = query.limit(DEFAULT_FORWARDED_LIMIT);

    let records = state
        .dal
        .forwarded_signal()
        .list_recent(group, limit)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch forwarded signals", e))?;

    Ok(Json(json!({
        "success": true,
        "group": group,
        "forwarded": records,
        "pagination": { "limit": limit },
    })))
}

pub async fn delete_forwarded(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> Result<Json<Value>, ApiError> {
    let group = query.required_group()?;
    let deleted = state
        .dal
        .forwarded_signal()
        .delete_all(group)
        .await
        .map_err(|e| ApiError::internal("Failed to clear forwarded signals", e))?;

    info!(group = %group, deleted, "Cleared forwarded signals");
    Ok(Json(json!({
        "success": true,
        "message": format!("Deleted {} forwarded record(s) from group {}", deleted, group),
        "deleted": deleted,
    })))
}

pub async fn list_hoppers(State(state): State<AppState>) -> Json<Value> {
    let hoppers: BTreeMap<_, _> = state
        .config
        .hoppers()
        .iter()
        .map(|(group, targets)| (group.as_str(), targets.to_vec()))
        .collect();

    Json(json!({
        "success": true,
        "hoppers": hoppers,
    }))
}
