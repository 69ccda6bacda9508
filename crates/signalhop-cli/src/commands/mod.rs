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

pub mod fanout;
pub mod purge;
pub mod reclaim;
pub mod stats;
pub mod work;

use anyhow::{Context, Result};
use signalhop::{Database, SignalhopConfig, SignalhopConfigBuilder, DAL};

// CLI commands run one at a time.
const CLI_POOL_SIZE: u32 = 4;

/// Connection settings shared by every command.
pub struct Connection {
    pub database_url: String,
    pub access_token: Option<String>,
    pub api_base_url: Option<String>,
}

impl Connection {
    /// Opens the database and brings its schema up to date.
    pub async fn dal(&self) -> Result<DAL> {
        let database = Database::try_new(&self.database_url, CLI_POOL_SIZE)
            .context("Failed to connect to database")?;
        database
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
        Ok(DAL::new(database))
    }

    pub fn config_builder(&self) -> SignalhopConfigBuilder {
        let builder = SignalhopConfig::builder().maybe_access_token(self.access_token.clone());
        match &self.api_base_url {
            Some(url) => builder.api_base_url(url.clone()),
            None => builder,
        }
    }

    pub fn config(&self) -> Result<SignalhopConfig> {
        let config = self.config_builder().build();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}
