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

//! Error types for the signal store, fan-out, delivery and worker layers.
//!
//! Errors are grouped by the stage that raises them. Storage failures are
//! always [`StoreError`]; the higher layers wrap it so a caller can tell a
//! claim failure from an ingestion failure without inspecting messages.

use thiserror::Error;

/// Failures raised by the database layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The pool could not hand out a connection, or the blocking
    /// interaction with it was aborted.
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Failed to serialize stored payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Unable to detect database backend from URL '{url}'")]
    UnsupportedBackend { url: String },

    #[error("Invalid database URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Stored value '{value}' is not a valid {kind}")]
    InvalidValue { kind: &'static str, value: String },
}

/// Reasons an inbound signal is rejected before anything is written.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("Signal payload missing required fields: order_type, coin")]
    MissingFields,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// True when the caller sent a bad body, as opposed to a storage failure.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, IngestError::Store(_))
    }
}

/// Failures talking to the downstream order API.
///
/// These never escape a worker invocation: the worker turns them into a
/// FAILURE outcome record for the task being delivered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("{0}")]
    Transport(String),

    #[error("Invalid delivery endpoint: {0}")]
    InvalidEndpoint(String),
}

#[derive(Debug, Error)]
pub enum FanOutError {
    #[error("CRYPTOHOPPER_ACCESS_TOKEN is not configured; refusing to fan out signals")]
    MissingCredential,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("CRYPTOHOPPER_ACCESS_TOKEN is not configured; refusing to run worker")]
    MissingCredential,

    #[error("Failed to build delivery client: {0}")]
    Client(String),

    /// The claim transaction failed and was rolled back.
    #[error("Claim failed: {0}")]
    Claim(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Invalid values handed to [`crate::SignalhopConfig`] or a strategy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1")]
    InvalidMaxAttempts,

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("priority list must name at least one group")]
    EmptyPriority,

    #[error("priority list names group '{0}' more than once")]
    DuplicatePriority(String),

    #[error("unknown signal group '{0}'")]
    UnknownGroup(String),

    #[error("hopper target for group '{group}' has an empty id")]
    EmptyHopperId { group: String },
}
