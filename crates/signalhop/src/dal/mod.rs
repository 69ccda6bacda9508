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

//! Unified Data Access Layer with runtime backend selection
//!
//! Every DAL operation dispatches on the backend detected when the
//! [`Database`] was created. Plain reads and writes are written once and
//! expanded for each backend by [`interact!`]; the operations whose locking
//! differs (claiming, fan-out, lease reclaim) have one function per backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use signalhop::dal::DAL;
//! use signalhop::database::Database;
//!
//! let dal = DAL::new(Database::try_new("postgres://localhost/signalhop", 10)?);
//! let recent = dal.signal().list_recent(SignalGroup::Default, 20).await?;
//! ```

use crate::database::{AnyPool, BackendType, Database};

/// Selects the expression for the active backend.
macro_rules! dispatch_backend {
    ($backend:expr, $pg:expr, $sqlite:expr) => {
        match $backend {
            #[cfg(feature = "postgres")]
            $crate::database::BackendType::Postgres => $pg,
            #[cfg(feature = "sqlite")]
            $crate::database::BackendType::Sqlite => $sqlite,
        }
    };
}

/// Runs a blocking diesel closure on a pooled connection of whichever
/// backend is active, yielding the closure's `Ok` value.
///
/// The body is expanded once per backend, so it must only use query DSL
/// that both backends support. Captured values are moved into the closure.
macro_rules! interact {
    ($dal:expr, |$conn:ident| $body:expr) => {
        dispatch_backend!(
            $dal.backend(),
            {
                let conn = $dal.database.get_postgres_connection().await?;
                conn.interact(move |$conn| $body)
                    .await
                    .map_err(|e| $crate::error::StoreError::ConnectionPool(e.to_string()))??
            },
            {
                let conn = $dal.database.get_sqlite_connection().await?;
                conn.interact(move |$conn| $body)
                    .await
                    .map_err(|e| $crate::error::StoreError::ConnectionPool(e.to_string()))??
            }
        )
    };
}

pub(crate) use dispatch_backend;
pub(crate) use interact;

pub mod delivery_task;
pub mod fan_out;
pub mod forwarded_signal;
pub mod rate_limit_status;
pub mod signal;

pub use delivery_task::{DeliveryTaskDAL, OutcomeWrite};
pub use fan_out::{FanOutDAL, FanOutResult};
pub use forwarded_signal::ForwardedSignalDAL;
pub use rate_limit_status::RateLimitStatusDAL;
pub use signal::SignalDAL;

/// The unified Data Access Layer.
///
/// `DAL` is `Clone`; clones share the underlying pool.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        DAL { database }
    }

    pub fn backend(&self) -> BackendType {
        self.database.backend()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn pool(&self) -> AnyPool {
        self.database.pool()
    }

    pub fn signal(&self) -> SignalDAL {
        SignalDAL::new(self)
    }

    pub fn fan_out(&self) -> FanOutDAL {
        FanOutDAL::new(self)
    }

    pub fn delivery_task(&self) -> DeliveryTaskDAL {
        DeliveryTaskDAL::new(self)
    }

    pub fn forwarded_signal(&self) -> ForwardedSignalDAL {
        ForwardedSignalDAL::new(self)
    }

    pub fn rate_limit_status(&self) -> RateLimitStatusDAL {
        RateLimitStatusDAL::new(self)
    }
}
