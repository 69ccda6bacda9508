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

//! Transactional fan-out of one signal into its delivery tasks.
//!
//! Each call handles exactly one signal inside one transaction: the signal
//! row is locked, one task per hopper target is inserted, and the signal is
//! flipped to `queued`. If any insert fails the transaction rolls back, no
//! task for the signal survives, and the signal stays `new` for the next
//! sweep.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use tracing::warn;

use super::DAL;
use crate::database::schema::{delivery_tasks, signals};
use crate::error::StoreError;
use crate::hoppers::HopperTarget;
use crate::models::delivery_task::{NewDeliveryTask, TaskStatus};
use crate::models::signal::{Signal, SignalGroup, SignalStatus};

/// What happened to the signal a fan-out call picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanOutResult {
    /// Tasks were created and the signal is now `queued`.
    Queued { signal_id: i64, task_count: usize },
    /// The stored payload is not valid JSON; the signal is now `error`.
    Rejected { signal_id: i64, reason: String },
}

impl FanOutResult {
    pub fn signal_id(&self) -> i64 {
        match self {
            FanOutResult::Queued { signal_id, .. } | FanOutResult::Rejected { signal_id, .. } => {
                *signal_id
            }
        }
    }
}

/// Builds the delivery task rows for one signal, numbered from 1 in target
/// order. Every task carries a copy of the signal payload as its body.
pub fn build_delivery_tasks(
    signal: &Signal,
    payload: &serde_json::Value,
    targets: &[HopperTarget],
    access_token: &str,
    now: NaiveDateTime,
) -> Vec<NewDeliveryTask> {
    let body = payload.to_string();
    targets
        .iter()
        .enumerate()
        .map(|(index, target)| NewDeliveryTask {
            signal_group: signal.signal_group.clone(),
            signal_id: signal.id,
            task_sub_id: index as i32 + 1,
            hopper_id: target.id.clone(),
            exchange_name: target.exchange.clone(),
            access_token: access_token.to_string(),
            payload: body.clone(),
            status: TaskStatus::Pending.as_str().to_string(),
            attempts: 0,
            created_at: now,
        })
        .collect()
}

/// Id bounds selecting either one signal or every signal.
fn id_range(only_signal: Option<i64>) -> (i64, i64) {
    match only_signal {
        Some(id) => (id, id),
        None => (i64::MIN, i64::MAX),
    }
}

#[derive(Clone)]
pub struct FanOutDAL<'a> {
    dal: &'a DAL,
}

impl<'a> FanOutDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Fans out the oldest `new` signal of `group`, or the signal with id
    /// `only_signal` if it is still `new`.
    ///
    /// Returns `Ok(None)` when no matching signal is waiting. Signals locked
    /// by a concurrent fan-out are skipped rather than waited on.
    ///
    /// With no `targets` nothing is touched and `Ok(None)` is returned: the
    /// signal stays `new` until the group has targets again.
    pub async fn fan_out_next(
        &self,
        group: SignalGroup,
        targets: &[HopperTarget],
        access_token: &str,
        only_signal: Option<i64>,
        now: NaiveDateTime,
    ) -> Result<Option<FanOutResult>, StoreError> {
        if targets.is_empty() {
            warn!(group = %group, "No hopper targets for group; leaving signals new");
            return Ok(None);
        }

        let targets = targets.to_vec();
        let access_token = access_token.to_string();
        crate::dal::dispatch_backend!(
            self.dal.backend(),
            self.fan_out_next_postgres(group, targets, access_token, only_signal, now)
                .await,
            self.fan_out_next_sqlite(group, targets, access_token, only_signal, now)
                .await
        )
    }

    #[cfg(feature = "postgres")]
    async fn fan_out_next_postgres(
        &self,
        group: SignalGroup,
        targets: Vec<HopperTarget>,
        access_token: String,
        only_signal: Option<i64>,
        now: NaiveDateTime,
    ) -> Result<Option<FanOutResult>, StoreError> {
        use diesel::connection::Connection;

        let conn = self.dal.database.get_postgres_connection().await?;
        let (min_id, max_id) = id_range(only_signal);

        let result = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let candidate: Option<Signal> = signals::table
                        .filter(signals::signal_group.eq(group.as_str()))
                        .filter(signals::status.eq(SignalStatus::New.as_str()))
                        .filter(signals::id.between(min_id, max_id))
                        .order((signals::received_at.asc(), signals::id.asc()))
                        .select(Signal::as_select())
                        .for_update()
                        .skip_locked()
                        .first(conn)
                        .optional()?;

                    let Some(signal) = candidate else {
                        return Ok(None);
                    };

                    let payload = match serde_json::from_str::<serde_json::Value>(&signal.raw_data)
                    {
                        Ok(payload) => payload,
                        Err(e) => {
                            diesel::update(signals::table.find(signal.id))
                                .set(signals::status.eq(SignalStatus::Error.as_str()))
                                .execute(conn)?;
                            return Ok(Some(FanOutResult::Rejected {
                                signal_id: signal.id,
                                reason: e.to_string(),
                            }));
                        }
                    };

                    let rows = build_delivery_tasks(&signal, &payload, &targets, &access_token, now);
                    for row in &rows {
                        diesel::insert_into(delivery_tasks::table)
                            .values(row)
                            .execute(conn)?;
                    }

                    diesel::update(signals::table.find(signal.id))
                        .set(signals::status.eq(SignalStatus::Queued.as_str()))
                        .execute(conn)?;

                    Ok(Some(FanOutResult::Queued {
                        signal_id: signal.id,
                        task_count: rows.len(),
                    }))
                })
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(result)
    }

    #[cfg(feature = "sqlite")]
    async fn fan_out_next_sqlite(
        &self,
        group: SignalGroup,
        targets: Vec<HopperTarget>,
        access_token: String,
        only_signal: Option<i64>,
        now: NaiveDateTime,
    ) -> Result<Option<FanOutResult>, StoreError> {
        let conn = self.dal.database.get_sqlite_connection().await?;
        let (min_id, max_id) = id_range(only_signal);

        // No row locks on SQLite: BEGIN IMMEDIATE takes the write lock before
        // the select so two sweeps cannot pick the same signal.
        let result = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    let candidate: Option<Signal> = signals::table
                        .filter(signals::signal_group.eq(group.as_str()))
                        .filter(signals::status.eq(SignalStatus::New.as_str()))
                        .filter(signals::id.between(min_id, max_id))
                        .order((signals::received_at.asc(), signals::id.asc()))
                        .select(Signal::as_select())
                        .first(conn)
                        .optional()?;

                    let Some(signal) = candidate else {
                        return Ok(None);
                    };

                    let payload = match serde_json::from_str::<serde_json::Value>(&signal.raw_data)
                    {
                        Ok(payload) => payload,
                        Err(e) => {
                            diesel::update(signals::table.find(signal.id))
                                .set(signals::status.eq(SignalStatus::Error.as_str()))
                                .execute(conn)?;
                            return Ok(Some(FanOutResult::Rejected {
                                signal_id: signal.id,
                                reason: e.to_string(),
                            }));
                        }
                    };

                    let rows = build_delivery_tasks(&signal, &payload, &targets, &access_token, now);
                    for row in &rows {
                        diesel::insert_into(delivery_tasks::table)
                            .values(row)
                            .execute(conn)?;
                    }

                    diesel::update(signals::table.find(signal.id))
                        .set(signals::status.eq(SignalStatus::Queued.as_str()))
                        .execute(conn)?;

                    Ok(Some(FanOutResult::Queued {
                        signal_id: signal.id,
                        task_count: rows.len(),
                    }))
                })
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(result)
    }
}
