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

//! Task claiming and lease reclaim.
//!
//! A claim selects the oldest eligible task of a group and marks it
//! `processing` in one short transaction; the HTTP call happens after the
//! transaction commits. On PostgreSQL concurrent claimants skip each other's
//! locked rows. SQLite has no row locks, so the claim takes the database
//! write lock up front and claimants are serialized.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use super::DeliveryTaskDAL;
use crate::database::schema::{delivery_tasks, forwarded_signals};
use crate::database::universal_types::to_rfc3339;
use crate::error::StoreError;
use crate::models::delivery_task::{DeliveryTask, RetryPolicy, TaskStatus};
use crate::models::forwarded_signal::{NewForwardedSignal, OutcomeStatus};
use crate::models::signal::SignalGroup;

/// Upper bound on tasks moved by one reclaim sweep.
pub const RECLAIM_BATCH_LIMIT: i64 = 500;

/// SQL form of [`RetryPolicy::is_eligible`].
macro_rules! eligible_for_claim {
    ($max_attempts:expr, $backoff_cutoff:expr) => {
        delivery_tasks::status
            .eq(TaskStatus::Pending.as_str())
            .or(delivery_tasks::status
                .eq(TaskStatus::Failed.as_str())
                .and(delivery_tasks::attempts.lt($max_attempts)))
            .or(delivery_tasks::status
                .eq(TaskStatus::RateLimited.as_str())
                .and(delivery_tasks::attempts.lt($max_attempts))
                .and(
                    delivery_tasks::last_attempt_at
                        .assume_not_null()
                        .le($backoff_cutoff),
                ))
    };
}

fn lease_expired_message(lease_timeout: chrono::Duration) -> String {
    format!(
        "Lease expired after {}s without a recorded outcome",
        lease_timeout.num_seconds()
    )
}

/// The outcome record appended for a task whose lease expired.
fn lease_expired_record(
    task: &DeliveryTask,
    message: &str,
    now: NaiveDateTime,
) -> NewForwardedSignal {
    let response = serde_json::json!({
        "lease_expired": true,
        "claimed_at": task.last_attempt_at.as_ref().map(to_rfc3339),
        "attempts": task.attempts,
    });
    NewForwardedSignal {
        signal_group: task.signal_group.clone(),
        task_id: task.id,
        signal_id: task.signal_id,
        task_sub_id: task.task_sub_id,
        http_status_code: None,
        request_payload: task.payload.clone(),
        response_payload: response.to_string(),
        status: OutcomeStatus::Failure.as_str().to_string(),
        error_message: Some(message.to_string()),
        hopper_id: task.hopper_id.clone(),
        exchange_name: task.exchange_name.clone(),
        created_at: now,
    }
}

fn into_failed(mut task: DeliveryTask, message: &str) -> DeliveryTask {
    task.status = TaskStatus::Failed.as_str().to_string();
    task.error_message = Some(message.to_string());
    task
}

impl<'a> DeliveryTaskDAL<'a> {
    /// Claims the oldest eligible task of `group`.
    ///
    /// The claimed task comes back already marked `processing`, with its
    /// attempt count incremented and `last_attempt_at` set to `now`. Returns
    /// `Ok(None)` when nothing is eligible. Any failure rolls the claim back
    /// and leaves the task untouched.
    pub async fn claim_next(
        &self,
        group: SignalGroup,
        policy: &RetryPolicy,
        now: NaiveDateTime,
    ) -> Result<Option<DeliveryTask>, StoreError> {
        let policy = *policy;
        crate::dal::dispatch_backend!(
            self.dal.backend(),
            self.claim_next_postgres(group, policy, now).await,
            self.claim_next_sqlite(group, policy, now).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn claim_next_postgres(
        &self,
        group: SignalGroup,
        policy: RetryPolicy,
        now: NaiveDateTime,
    ) -> Result<Option<DeliveryTask>, StoreError> {
        use diesel::connection::Connection;

        let conn = self.dal.database.get_postgres_connection().await?;
        let max_attempts = policy.max_attempts;
        let backoff_cutoff = policy.backoff_cutoff(now);

        let claimed = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let candidate: Option<i64> = delivery_tasks::table
                        .filter(delivery_tasks::signal_group.eq(group.as_str()))
                        .filter(eligible_for_claim!(max_attempts, backoff_cutoff))
                        .order((delivery_tasks::created_at.asc(), delivery_tasks::id.asc()))
                        .select(delivery_tasks::id)
                        .for_update()
                        .skip_locked()
                        .first(conn)
                        .optional()?;

                    let Some(task_id) = candidate else {
                        return Ok(None);
                    };

                    let task = diesel::update(delivery_tasks::table.find(task_id))
                        .set((
                            delivery_tasks::status.eq(TaskStatus::Processing.as_str()),
                            delivery_tasks::attempts.eq(delivery_tasks::attempts + 1),
                            delivery_tasks::last_attempt_at.eq(Some(now)),
                        ))
                        .returning(DeliveryTask::as_returning())
                        .get_result::<DeliveryTask>(conn)?;

                    Ok(Some(task))
                })
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(claimed)
    }

    #[cfg(feature = "sqlite")]
    async fn claim_next_sqlite(
        &self,
        group: SignalGroup,
        policy: RetryPolicy,
        now: NaiveDateTime,
    ) -> Result<Option<DeliveryTask>, StoreError> {
        let conn = self.dal.database.get_sqlite_connection().await?;
        let max_attempts = policy.max_attempts;
        let backoff_cutoff = policy.backoff_cutoff(now);

        // BEGIN IMMEDIATE takes the write lock before the select, closing the
        // window between choosing a task and marking it processing.
        let claimed = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    let candidate: Option<i64> = delivery_tasks::table
                        .filter(delivery_tasks::signal_group.eq(group.as_str()))
                        .filter(eligible_for_claim!(max_attempts, backoff_cutoff))
                        .order((delivery_tasks::created_at.asc(), delivery_tasks::id.asc()))
                        .select(delivery_tasks::id)
                        .first(conn)
                        .optional()?;

                    let Some(task_id) = candidate else {
                        return Ok(None);
                    };

                    let task = diesel::update(delivery_tasks::table.find(task_id))
                        .set((
                            delivery_tasks::status.eq(TaskStatus::Processing.as_str()),
                            delivery_tasks::attempts.eq(delivery_tasks::attempts + 1),
                            delivery_tasks::last_attempt_at.eq(Some(now)),
                        ))
                        .returning(DeliveryTask::as_returning())
                        .get_result::<DeliveryTask>(conn)?;

                    Ok(Some(task))
                })
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(claimed)
    }

    /// Moves tasks stuck in `processing` for longer than `lease_timeout` to
    /// `failed`, appending a FAILURE outcome record for each.
    ///
    /// Such a task was claimed by a worker that never wrote an outcome. From
    /// `failed` it follows the normal retry rules. Returns the tasks as they
    /// are after the sweep.
    pub async fn reclaim_stale(
        &self,
        lease_timeout: chrono::Duration,
        now: NaiveDateTime,
    ) -> Result<Vec<DeliveryTask>, StoreError> {
        crate::dal::dispatch_backend!(
            self.dal.backend(),
            self.reclaim_stale_postgres(lease_timeout, now).await,
            self.reclaim_stale_sqlite(lease_timeout, now).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn reclaim_stale_postgres(
        &self,
        lease_timeout: chrono::Duration,
        now: NaiveDateTime,
    ) -> Result<Vec<DeliveryTask>, StoreError> {
        use diesel::connection::Connection;

        let conn = self.dal.database.get_postgres_connection().await?;
        let expired_before = now
            .checked_sub_signed(lease_timeout)
            .unwrap_or(NaiveDateTime::MIN);
        let message = lease_expired_message(lease_timeout);

        let reclaimed = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let stale: Vec<DeliveryTask> = delivery_tasks::table
                        .filter(delivery_tasks::status.eq(TaskStatus::Processing.as_str()))
                        .filter(
                            delivery_tasks::last_attempt_at
                                .assume_not_null()
                                .le(expired_before),
                        )
                        .order(delivery_tasks::id.asc())
                        .limit(RECLAIM_BATCH_LIMIT)
                        .select(DeliveryTask::as_select())
                        .for_update()
                        .skip_locked()
                        .load(conn)?;

                    let mut reclaimed = Vec::with_capacity(stale.len());
                    for task in stale {
                        diesel::update(delivery_tasks::table.find(task.id))
                            .set((
                                delivery_tasks::status.eq(TaskStatus::Failed.as_str()),
                                delivery_tasks::error_message.eq(Some(message.as_str())),
                            ))
                            .execute(conn)?;
                        diesel::insert_into(forwarded_signals::table)
                            .values(&lease_expired_record(&task, &message, now))
                            .execute(conn)?;
                        reclaimed.push(into_failed(task, &message));
                    }
                    Ok(reclaimed)
                })
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(reclaimed)
    }

    #[cfg(feature = "sqlite")]
    async fn reclaim_stale_sqlite(
        &self,
        lease_timeout: chrono::Duration,
        now: NaiveDateTime,
    ) -> Result<Vec<DeliveryTask>, StoreError> {
        let conn = self.dal.database.get_sqlite_connection().await?;
        let expired_before = now
            .checked_sub_signed(lease_timeout)
            .unwrap_or(NaiveDateTime::MIN);
        let message = lease_expired_message(lease_timeout);

        let reclaimed = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    let stale: Vec<DeliveryTask> = delivery_tasks::table
                        .filter(delivery_tasks::status.eq(TaskStatus::Processing.as_str()))
                        .filter(
                            delivery_tasks::last_attempt_at
                                .assume_not_null()
                                .le(expired_before),
                        )
                        .order(delivery_tasks::id.asc())
                        .limit(RECLAIM_BATCH_LIMIT)
                        .select(DeliveryTask::as_select())
                        .load(conn)?;

                    let mut reclaimed = Vec::with_capacity(stale.len());
                    for task in stale {
                        diesel::update(delivery_tasks::table.find(task.id))
                            .set((
                                delivery_tasks::status.eq(TaskStatus::Failed.as_str()),
                                delivery_tasks::error_message.eq(Some(message.as_str())),
                            ))
                            .execute(conn)?;
                        diesel::insert_into(forwarded_signals::table)
                            .values(&lease_expired_record(&task, &message, now))
                            .execute(conn)?;
                        reclaimed.push(into_failed(task, &message));
                    }
                    Ok(reclaimed)
                })
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(reclaimed)
    }
}
