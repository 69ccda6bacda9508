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

//! Data access for stored inbound signals.

use diesel::prelude::*;

use super::DAL;
use crate::database::schema::signals;
use crate::error::StoreError;
use crate::models::delivery_task::StatusCount;
use crate::models::signal::{NewSignal, Signal, SignalGroup};

#[derive(Clone)]
pub struct SignalDAL<'a> {
    dal: &'a DAL,
}

impl<'a> SignalDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Stores one inbound signal and returns the stored row.
    pub async fn create(&self, new_signal: NewSignal) -> Result<Signal, StoreError> {
        let signal = interact!(self.dal, |conn| {
            diesel::insert_into(signals::table)
                .values(&new_signal)
                .returning(Signal::as_returning())
                .get_result::<Signal>(conn)
        });
        Ok(signal)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Signal>, StoreError> {
        let signal = interact!(self.dal, |conn| {
            signals::table
                .find(id)
                .select(Signal::as_select())
                .first::<Signal>(conn)
                .optional()
        });
        Ok(signal)
    }

    /// Most recently received signals of a group, newest first.
    pub async fn list_recent(
        &self,
        group: SignalGroup,
        limit: i64,
    ) -> Result<Vec<Signal>, StoreError> {
        let rows = interact!(self.dal, |conn| {
            signals::table
                .filter(signals::signal_group.eq(group.as_str()))
                .order((signals::received_at.desc(), signals::id.desc()))
                .limit(limit)
                .select(Signal::as_select())
                .load::<Signal>(conn)
        });
        Ok(rows)
    }

    pub async fn count_by_status(&self, group: SignalGroup) -> Result<Vec<StatusCount>, StoreError> {
        let rows = interact!(self.dal, |conn| {
            signals::table
                .filter(signals::signal_group.eq(group.as_str()))
                .group_by(signals::status)
                .select((signals::status, diesel::dsl::count_star()))
                .order(signals::status.asc())
                .load::<(String, i64)>(conn)
        });
        Ok(rows
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect())
    }

    /// Deletes one signal of a group. Returns the number of rows removed.
    ///
    /// Delivery tasks already fanned out from the signal are left alone.
    pub async fn delete_by_id(&self, group: SignalGroup, id: i64) -> Result<usize, StoreError> {
        let deleted = interact!(self.dal, |conn| {
            diesel::delete(
                signals::table
                    .filter(signals::signal_group.eq(group.as_str()))
                    .filter(signals::id.eq(id)),
            )
            .execute(conn)
        });
        Ok(deleted)
    }

    pub async fn delete_all(&self, group: SignalGroup) -> Result<usize, StoreError> {
        let deleted = interact!(self.dal, |conn| {
            diesel::delete(signals::table.filter(signals::signal_group.eq(group.as_str())))
                .execute(conn)
        });
        Ok(deleted)
    }
}
