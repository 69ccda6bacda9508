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

use crate::config::{types::*, ValidationError};
use signalhop::BackendType;

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = self.database.validate() {
            errors.push(e);
        }
        if let Err(e) = self.server.validate() {
            errors.push(e);
        }
        if let Err(e) = self.delivery.validate() {
            errors.push(e);
        }
        // Scheduling and hopper values are checked by the core builder.
        if let Err(e) = self.to_signalhop_config() {
            errors.push(e);
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple { errors }),
        }
    }
}

impl Validate for DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        BackendType::from_url(&self.url).map_err(|e| ValidationError::InvalidDatabaseUrl {
            message: e.to_string(),
        })?;

        if self.pool_size == 0 || self.pool_size > 100 {
            return Err(ValidationError::InvalidPoolSize {
                size: self.pool_size,
            });
        }

        Ok(())
    }
}

impl Validate for HttpConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.log_level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ValidationError::InvalidLogLevel {
                    level: self.log_level.clone(),
                });
            }
        }

        match self.log_format.to_lowercase().as_str() {
            "text" | "json" => {}
            _ => {
                return Err(ValidationError::InvalidLogFormat {
                    format: self.log_format.clone(),
                });
            }
        }

        if self.port == 0 {
            return Err(ValidationError::InvalidValue {
                field: "server.port",
                message: "HTTP port cannot be 0".to_string(),
            });
        }

        if self.bind_address.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "server.bind_address",
                message: "HTTP bind address cannot be empty".to_string(),
            });
        }

        if self.body_limit_bytes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "server.body_limit_bytes",
                message: "must be positive".to_string(),
            });
        }

        Ok(())
    }
}

impl Validate for DeliveryConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "delivery.request_timeout_secs",
                message: "must be positive".to_string(),
            });
        }

        if self.lease_timeout_secs <= self.request_timeout_secs {
            return Err(ValidationError::InvalidValue {
                field: "delivery.lease_timeout_secs",
                message: format!(
                    "{}s must exceed the request timeout of {}s",
                    self.lease_timeout_secs, self.request_timeout_secs
                ),
            });
        }

        Ok(())
    }
}
