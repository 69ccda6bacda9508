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

//! # Signalhop
//!
//! Signalhop takes trading signals from a webhook, fans each one out into one
//! delivery task per configured downstream hopper, and delivers those tasks to
//! a rate-limited HTTP API with bounded retries.
//!
//! The database is the only coordination point. Any number of worker
//! invocations may run at once; each one claims tasks through a short
//! transaction that skips rows locked by its peers, performs the HTTP call
//! outside of any lock, then records the outcome.
//!
//! ## Flow
//!
//! ```text
//! webhook ──► signals (new) ──fan-out──► delivery_tasks (pending) ──claim──► processing
//!                                   │                                   │
//!                                   └─► signals (queued)                └─► HTTP POST ──► forwarded_signals
//!                                                                               └──────► task status
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use signalhop::{Database, DAL, SignalhopConfig, Worker, SchedulingStrategy};
//!
//! let database = Database::try_new("sqlite:///var/lib/signalhop/queue.db", 1)?;
//! database.run_migrations().await?;
//! let dal = DAL::new(database);
//!
//! let config = SignalhopConfig::builder().access_token("secret").build();
//! let worker = Worker::with_http_client(dal, config.clone())?;
//! let summary = worker.run(&SchedulingStrategy::global(&config)).await?;
//! println!("{}", summary.message());
//! ```
//!
//! ## Backends
//!
//! Both PostgreSQL and SQLite are supported behind the `postgres` and
//! `sqlite` features. On PostgreSQL the claim uses `FOR UPDATE SKIP LOCKED`;
//! SQLite has no row locks, so claims take the write lock up front with
//! `BEGIN IMMEDIATE` and are serialized.

#[cfg(not(any(feature = "postgres", feature = "sqlite")))]
compile_error!("at least one of the `postgres` or `sqlite` features must be enabled");

pub mod clock;
pub mod config;
pub mod dal;
pub mod database;
pub mod delivery;
pub mod error;
pub mod fanout;
pub mod hoppers;
pub mod ingest;
pub mod models;
pub mod worker;

pub use clock::{Clock, SystemClock};
pub use config::{SignalhopConfig, SignalhopConfigBuilder};
pub use dal::DAL;
pub use database::{BackendType, Database};
pub use delivery::{DeliveryClient, HttpDeliveryClient};
pub use error::{
    ConfigError, DeliveryError, FanOutError, IngestError, StoreError, WorkerError,
};
pub use fanout::{FanOut, FanOutSummary};
pub use hoppers::{HopperRegistry, HopperTarget};
pub use ingest::InboundSignal;
pub use models::delivery_task::{RetryPolicy, TaskStatus};
pub use models::signal::{SignalGroup, SignalStatus};
pub use worker::{RunOutcome, RunSummary, SchedulingStrategy, Worker};
