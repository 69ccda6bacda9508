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

//! Data access for outcome records.
//!
//! Outcome records are append-only. There is no update operation here on
//! purpose; the only removal is the administrative purge of a whole group.

use diesel::prelude::*;

use super::DAL;
use crate::database::schema::forwarded_signals;
use crate::error::StoreError;
use crate::models::forwarded_signal::{ForwardedSignal, NewForwardedSignal};
use crate::models::signal::SignalGroup;

#[derive(Clone)]
pub struct ForwardedSignalDAL<'a> {
    dal: &'a DAL,
}

impl<'a> ForwardedSignalDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn create(&self, record: NewForwardedSignal) -> Result<ForwardedSignal, StoreError> {
        let row = interact!(self.dal, |conn| {
            diesel::insert_into(forwarded_signals::table)
                .values(&record)
                .returning(ForwardedSignal::as_returning())
                .get_result::<ForwardedSignal>(conn)
        });
        Ok(row)
    }

    /// Most recent outcome records of a group, newest first.
    pub async fn list_recent(
        &self,
        group: SignalGroup,
        limit: i64,
    ) -> Result<Vec<ForwardedSignal>, StoreError> {
        let rows = interact!(self.dal, |conn| {
            forwarded_signals::table
                .filter(forwarded_signals::signal_group.eq(group.as_str()))
                .order((
                    forwarded_signals::created_at.desc(),
                    forwarded_signals::id.desc(),
                ))
                .limit(limit)
                .select(ForwardedSignal::as_select())
                .load::<ForwardedSignal>(conn)
        });
        Ok(rows)
    }

    /// Every outcome record of one task, oldest first.
    pub async fn list_for_task(&self, task_id: i64) -> Result<Vec<ForwardedSignal>, StoreError> {
        let rows = interact!(self.dal, |conn| {
            forwarded_signals::table
                .filter(forwarded_signals::task_id.eq(task_id))
                .order(forwarded_signals::id.asc())
                .select(ForwardedSignal::as_select())
                .load::<ForwardedSignal>(conn)
        });
        Ok(rows)
    }

    pub async fn count_for_task(&self, task_id: i64) -> Result<i64, StoreError> {
        let count = interact!(self.dal, |conn| {
            forwarded_signals::table
                .filter(forwarded_signals::task_id.eq(task_id))
                .count()
                .get_result::<i64>(conn)
        });
        Ok(count)
    }

    pub async fn delete_all(&self, group: SignalGroup) -> Result<usize, StoreError> {
        let deleted = interact!(self.dal, |conn| {
            diesel::delete(
                forwarded_signals::table.filter(forwarded_signals::signal_group.eq(group.as_str())),
            )
            .execute(conn)
        });
        Ok(deleted)
    }
}
