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

use crate::config::types::{ACCESS_TOKEN_ENV, DATABASE_URL_ENV};
use crate::config::{ConfigError, ServerConfig};
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "SIGNALHOP_CONFIG";

pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths
    pub fn new() -> Self {
        let mut search_paths = vec![PathBuf::from("./signalhop.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("signalhop").join("config.toml"));
        }

        search_paths.push(PathBuf::from("/etc/signalhop/config.toml"));

        Self { search_paths }
    }

    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Load configuration from the given file, `SIGNALHOP_CONFIG`, or the
    /// first search path that exists, then apply environment overrides.
    ///
    /// When no file is named and none is found, built-in defaults are used.
    pub fn load_config(&self, config_file: Option<&Path>) -> Result<ServerConfig, ConfigError> {
        let config_path = match config_file {
            Some(path) => Some(path.to_path_buf()),
            None => env::var(CONFIG_PATH_ENV)
                .ok()
                .map(PathBuf::from)
                .or_else(|| self.find_config_file()),
        };

        let mut config = match config_path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                self.load_config_from_file(&path)?
            }
            None => {
                info!("No configuration file found; using defaults");
                ServerConfig::default()
            }
        };

        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_config_from_file(&self, path: &Path) -> Result<ServerConfig, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let substituted = substitute_env_vars(&content)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") | None => Ok(toml::from_str::<ServerConfig>(&substituted)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat {
                extension: ext.to_string(),
            }),
        }
    }

    /// Find the first existing configuration file in search paths
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .find(|path| path.is_file())
            .cloned()
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// `DATABASE_URL` and `CRYPTOHOPPER_ACCESS_TOKEN` win over the file.
pub fn apply_env_overrides(config: &mut ServerConfig) {
    if let Some(url) = non_empty_env(DATABASE_URL_ENV) {
        debug!("Database URL taken from {}", DATABASE_URL_ENV);
        config.database.url = url;
    }
    if let Some(token) = non_empty_env(ACCESS_TOKEN_ENV) {
        debug!("Access token taken from {}", ACCESS_TOKEN_ENV);
        config.delivery.access_token = Some(token);
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Substitute `${VAR}`, `${VAR:-default}` and `${VAR:?message}`.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::EnvSubstitutionError(e.to_string()))?;

    let mut result = String::with_capacity(content.len());
    let mut last_end = 0;
    for cap in re.captures_iter(content) {
        let (Some(full), Some(expr)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        result.push_str(&content[last_end..full.start()]);
        result.push_str(&process_var_expression(expr.as_str())?);
        last_end = full.end();
    }
    result.push_str(&content[last_end..]);

    Ok(result)
}

fn process_var_expression(expr: &str) -> Result<String, ConfigError> {
    if let Some((var_name, default_value)) = expr.split_once(":-") {
        Ok(env::var(var_name).unwrap_or_else(|_| default_value.to_string()))
    } else if let Some((var_name, error_msg)) = expr.split_once(":?") {
        env::var(var_name).map_err(|_| {
            ConfigError::EnvSubstitutionError(format!(
                "Required environment variable '{}' is not set: {}",
                var_name, error_msg
            ))
        })
    } else {
        env::var(expr).map_err(|_| {
            ConfigError::EnvSubstitutionError(format!(
                "Required environment variable '{}' is not set",
                expr
            ))
        })
    }
}
