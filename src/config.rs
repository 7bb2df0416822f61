// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Process-level settings read from the environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine_core::constants::config::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_HTTP_TIMEOUT_SECS, ENV_CONFIG_PATH, ENV_ENABLED,
    ENV_HTTP_TIMEOUT_SECS, ENV_LOG_FORMAT, ENV_LOG_LEVEL,
};
use crate::utils::paths::expand_home;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Master switch; `false` overrides `settings.enabled` in every policy
    pub enabled: bool,
    pub policy_path: Option<PathBuf>,
    pub log_level: String,
    pub log_format: String, // "json" or "text"
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            enabled: env::var(ENV_ENABLED)
                .map(|v| parse_switch(&v))
                .unwrap_or(true),
            policy_path: Self::policy_path_from_env(),
            log_level: env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string()),
            log_format: env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| "text".to_string()),
            http_timeout: Duration::from_secs(
                env::var(ENV_HTTP_TIMEOUT_SECS)
                    .ok()
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
        }
    }

    /// `$LILITH_SCAN_CONFIG_PATH` if set, else `~/.lilith-scan/security.yaml`.
    pub fn policy_path_from_env() -> Option<PathBuf> {
        match env::var(ENV_CONFIG_PATH) {
            Ok(p) if !p.trim().is_empty() => Some(PathBuf::from(expand_home(p.trim()))),
            _ => default_policy_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            policy_path: default_policy_path(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

pub fn default_policy_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn parse_switch(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "off" | "no" | "disabled"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_switch() {
        assert!(!parse_switch("false"));
        assert!(!parse_switch(" OFF "));
        assert!(!parse_switch("0"));
        assert!(parse_switch("true"));
        assert!(parse_switch("1"));
    }

    #[test]
    fn test_default_path_under_home() {
        let path = default_policy_path().unwrap();
        assert!(path.ends_with(".lilith-scan/security.yaml"));
    }
}
