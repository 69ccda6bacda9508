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

//! Rate-limit status timeline.
//!
//! Rows are only ever appended; the row with the highest id is the current
//! state. Appending avoids two workers racing on an update of one row.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use crate::database::schema::rate_limit_status;
use crate::database::universal_types::{utc_rfc3339, utc_rfc3339_option};

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = rate_limit_status)]
pub struct RateLimitStatus {
    pub id: i64,
    pub is_limited: bool,
    #[serde(with = "utc_rfc3339_option")]
    pub limited_until: Option<NaiveDateTime>,
    #[serde(with = "utc_rfc3339")]
    pub recorded_at: NaiveDateTime,
}

impl RateLimitStatus {
    /// True while the downstream API is known to be throttling us.
    pub fn is_active(&self, now: NaiveDateTime) -> bool {
        self.is_limited && self.limited_until.is_some_and(|until| until > now)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = rate_limit_status)]
pub struct NewRateLimitStatus {
    pub is_limited: bool,
    pub limited_until: Option<NaiveDateTime>,
    pub recorded_at: NaiveDateTime,
}

impl NewRateLimitStatus {
    pub fn limited(until: NaiveDateTime, now: NaiveDateTime) -> Self {
        Self {
            is_limited: true,
            limited_until: Some(until),
            recorded_at: now,
        }
    }

    pub fn cleared(now: NaiveDateTime) -> Self {
        Self {
            is_limited: false,
            limited_until: None,
            recorded_at: now,
        }
    }
}
