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

//! Diesel schema shared by the PostgreSQL and SQLite backends.
//!
//! The column types are chosen so one definition maps onto both sets of
//! migrations: `BIGSERIAL`/`INTEGER PRIMARY KEY` as `BigInt`, `TIMESTAMP`
//! as `Timestamp` (text on SQLite), `BOOLEAN` as `Bool`.

diesel::table! {
    signals (id) {
        id -> BigInt,
        signal_group -> Text,
        raw_data -> Text,
        status -> Text,
        received_at -> Timestamp,
    }
}

diesel::table! {
    delivery_tasks (id) {
        id -> BigInt,
        signal_group -> Text,
        signal_id -> BigInt,
        task_sub_id -> Integer,
        hopper_id -> Text,
        exchange_name -> Text,
        access_token -> Text,
        payload -> Text,
        status -> Text,
        attempts -> Integer,
        created_at -> Timestamp,
        last_attempt_at -> Nullable<Timestamp>,
        error_message -> Nullable<Text>,
    }
}

diesel::table! {
    forwarded_signals (id) {
        id -> BigInt,
        signal_group -> Text,
        task_id -> BigInt,
        signal_id -> BigInt,
        task_sub_id -> Integer,
        http_status_code -> Nullable<Integer>,
        request_payload -> Text,
        response_payload -> Text,
        status -> Text,
        error_message -> Nullable<Text>,
        hopper_id -> Text,
        exchange_name -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    rate_limit_status (id) {
        id -> BigInt,
        is_limited -> Bool,
        limited_until -> Nullable<Timestamp>,
        recorded_at -> Timestamp,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    signals,
    delivery_tasks,
    forwarded_signals,
    rate_limit_status,
);
