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

//! Timestamp handling shared by both backends.
//!
//! Every timestamp column is a diesel `Timestamp` holding naive UTC. The
//! application writes them itself instead of relying on column defaults:
//! PostgreSQL would otherwise store server time, and SQLite stores
//! `Timestamp` as text, so all values must come from one formatter for
//! comparisons in `WHERE` clauses to order correctly.
//!
//! Values are truncated to microseconds because that is what PostgreSQL
//! keeps; a value read back must equal the value written.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

/// Current UTC time with microsecond precision.
pub fn current_timestamp() -> NaiveDateTime {
    truncate_to_micros(Utc::now().naive_utc())
}

pub fn truncate_to_micros(ts: NaiveDateTime) -> NaiveDateTime {
    ts.trunc_subsecs(6)
}

/// Renders a stored naive timestamp as an RFC 3339 UTC string.
pub fn to_rfc3339(ts: &NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(*ts, Utc).to_rfc3339()
}

pub fn from_rfc3339(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc).naive_utc())
}

/// Serde adapter rendering `NaiveDateTime` fields as RFC 3339 UTC.
pub mod utc_rfc3339 {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::to_rfc3339(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::from_rfc3339(&raw).map_err(serde::de::Error::custom)
    }
}

/// Same as [`utc_rfc3339`] for nullable columns.
pub mod utc_rfc3339_option {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_some(&super::to_rfc3339(ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => super::from_rfc3339(&raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
