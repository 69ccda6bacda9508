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

use diesel::prelude::*;

use super::DAL;
use crate::database::schema::rate_limit_status;
use crate::error::StoreError;
use crate::models::rate_limit::{NewRateLimitStatus, RateLimitStatus};

#[derive(Clone)]
pub struct RateLimitStatusDAL<'a> {
    dal: &'a DAL,
}

impl<'a> RateLimitStatusDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Appends a new rate-limit state. The newest row wins.
    pub async fn record(&self, status: NewRateLimitStatus) -> Result<RateLimitStatus, StoreError> {
        let row = interact!(self.dal, |conn| {
            diesel::insert_into(rate_limit_status::table)
                .values(&status)
                .returning(RateLimitStatus::as_returning())
                .get_result::<RateLimitStatus>(conn)
        });
        Ok(row)
    }

    pub async fn latest(&self) -> Result<Option<RateLimitStatus>, StoreError> {
        let row = interact!(self.dal, |conn| {
            rate_limit_status::table
                .order(rate_limit_status::id.desc())
                .select(RateLimitStatus::as_select())
                .first::<RateLimitStatus>(conn)
                .optional()
        });
        Ok(row)
    }
}
