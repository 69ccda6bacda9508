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

//! Data access for delivery tasks.
//!
//! Tasks only change state in two places: a claim (see [`claiming`]) and an
//! outcome write ([`DeliveryTaskDAL::record_outcome`]). Each claim ends with
//! exactly one outcome record, written either by the outcome write or by a
//! lease reclaim. Everything else here is creation, inspection and
//! administrative removal.

mod claiming;

pub use claiming::RECLAIM_BATCH_LIMIT;

use diesel::prelude::*;
use tracing::warn;

use super::DAL;
use crate::database::schema::{delivery_tasks, forwarded_signals};
use crate::error::StoreError;
use crate::models::delivery_task::{DeliveryTask, NewDeliveryTask, StatusCount, TaskStatus};
use crate::models::forwarded_signal::NewForwardedSignal;
use crate::models::signal::SignalGroup;

/// What [`DeliveryTaskDAL::record_outcome`] managed to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeWrite {
    /// False when the claim had been lost; nothing was written.
    pub status_written: bool,
    /// Set when the status was written but the outcome record was not.
    pub record_error: Option<String>,
}

impl OutcomeWrite {
    fn claim_lost() -> Self {
        Self {
            status_written: false,
            record_error: None,
        }
    }

    /// Whether the attempt's outcome record was appended.
    pub fn recorded(&self) -> bool {
        self.status_written && self.record_error.is_none()
    }
}

#[derive(Clone)]
pub struct DeliveryTaskDAL<'a> {
    dal: &'a DAL,
}

impl<'a> DeliveryTaskDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn create(&self, new_task: NewDeliveryTask) -> Result<DeliveryTask, StoreError> {
        let task = interact!(self.dal, |conn| {
            diesel::insert_into(delivery_tasks::table)
                .values(&new_task)
                .returning(DeliveryTask::as_returning())
                .get_result::<DeliveryTask>(conn)
        });
        Ok(task)
    }

    pub async fn get(&self, id: i64) -> Result<Option<DeliveryTask>, StoreError> {
        let task = interact!(self.dal, |conn| {
            delivery_tasks::table
                .find(id)
                .select(DeliveryTask::as_select())
                .first::<DeliveryTask>(conn)
                .optional()
        });
        Ok(task)
    }

    /// Most recently created tasks of a group, newest first.
    pub async fn list_recent(
        &self,
        group: SignalGroup,
        limit: i64,
    ) -> Result<Vec<DeliveryTask>, StoreError> {
        let rows = interact!(self.dal, |conn| {
            delivery_tasks::table
                .filter(delivery_tasks::signal_group.eq(group.as_str()))
                .order((delivery_tasks::created_at.desc(), delivery_tasks::id.desc()))
                .limit(limit)
                .select(DeliveryTask::as_select())
                .load::<DeliveryTask>(conn)
        });
        Ok(rows)
    }

    /// All tasks fanned out from one signal, by sub id.
    pub async fn list_for_signal(
        &self,
        group: SignalGroup,
        signal_id: i64,
    ) -> Result<Vec<DeliveryTask>, StoreError> {
        let rows = interact!(self.dal, |conn| {
            delivery_tasks::table
                .filter(delivery_tasks::signal_group.eq(group.as_str()))
                .filter(delivery_tasks::signal_id.eq(signal_id))
                .order(delivery_tasks::task_sub_id.asc())
                .select(DeliveryTask::as_select())
                .load::<DeliveryTask>(conn)
        });
        Ok(rows)
    }

    pub async fn count_by_status(&self, group: SignalGroup) -> Result<Vec<StatusCount>, StoreError> {
        let rows = interact!(self.dal, |conn| {
            delivery_tasks::table
                .filter(delivery_tasks::signal_group.eq(group.as_str()))
                .group_by(delivery_tasks::status)
                .select((delivery_tasks::status, diesel::dsl::count_star()))
                .order(delivery_tasks::status.asc())
                .load::<(String, i64)>(conn)
        });
        Ok(rows
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect())
    }

    /// Writes the outcome of a delivery attempt: the new task status and the
    /// attempt's outcome record, in one transaction.
    ///
    /// Both writes only apply while the task (`record.task_id`) is still
    /// `processing` with the attempt count observed at claim time. A task
    /// whose lease was reclaimed (and possibly claimed again) in the meantime
    /// already has the outcome record for that claim; it is left untouched
    /// and no record is appended.
    ///
    /// The record is inserted under a savepoint: if only the insert fails,
    /// the status write still commits and the failure is reported in
    /// [`OutcomeWrite::record_error`].
    pub async fn record_outcome(
        &self,
        claimed_attempts: i32,
        status: TaskStatus,
        record: NewForwardedSignal,
    ) -> Result<OutcomeWrite, StoreError> {
        if !TaskStatus::Processing.can_transition_to(status) {
            return Err(StoreError::InvalidValue {
                kind: "task outcome status",
                value: status.as_str().to_string(),
            });
        }

        let id = record.task_id;
        let write = interact!(self.dal, |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                let updated = diesel::update(
                    delivery_tasks::table
                        .filter(delivery_tasks::id.eq(record.task_id))
                        .filter(delivery_tasks::attempts.eq(claimed_attempts))
                        .filter(delivery_tasks::status.eq(TaskStatus::Processing.as_str())),
                )
                .set((
                    delivery_tasks::status.eq(status.as_str()),
                    delivery_tasks::error_message.eq(record.error_message.as_deref()),
                ))
                .execute(conn)?;

                if updated != 1 {
                    return Ok(OutcomeWrite::claim_lost());
                }

                let inserted = conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    diesel::insert_into(forwarded_signals::table)
                        .values(&record)
                        .execute(conn)
                });
                Ok(OutcomeWrite {
                    status_written: true,
                    record_error: inserted.err().map(|e| e.to_string()),
                })
            })
        });

        if !write.status_written {
            warn!(
                task_id = id,
                claimed_attempts,
                "Outcome not applied: task is no longer held by this claim"
            );
        }
        Ok(write)
    }

    pub async fn delete_all(&self, group: SignalGroup) -> Result<usize, StoreError> {
        let deleted = interact!(self.dal, |conn| {
            diesel::delete(
                delivery_tasks::table.filter(delivery_tasks::signal_group.eq(group.as_str())),
            )
            .execute(conn)
        });
        Ok(deleted)
    }
}
