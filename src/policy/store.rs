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

//! Configuration store.
//!
//! Holds the active `Configuration` as an `Arc` behind a lock that is only
//! taken to clone or replace the pointer. Readers take one snapshot per call
//! and keep it for the whole call; a reload never mutates a published
//! snapshot, it builds a new one off to the side and swaps it in.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine_core::constants::policy::EMBEDDED_SOURCE;
use crate::engine_core::errors::ConfigError;
use crate::policy::raw::RawDocument;
use crate::policy::snapshot::Configuration;

/// Where the user file path comes from on reload.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSource {
    Fixed(Option<PathBuf>),
    /// Re-resolved from the environment on every reload
    Environment,
}

pub struct ConfigStore {
    default_yaml: String,
    path_source: PathSource,
    user_path: RwLock<Option<PathBuf>>,
    current: RwLock<Arc<Configuration>>,
    /// Serialises writers so generations are handed out in order
    reload_lock: Mutex<()>,
    reloads: AtomicU64,
}

impl ConfigStore {
    /// Build the first generation from `default_yaml` with the optional user
    /// file layered on top. A missing user file is not an error.
    pub fn load(default_yaml: &str, user_path: Option<&Path>) -> Result<Self, ConfigError> {
        let user_path = user_path.map(Path::to_path_buf);
        Self::build_store(
            default_yaml,
            PathSource::Fixed(user_path.clone()),
            user_path,
        )
    }

    /// Build from the embedded default and the user file named by the
    /// process configuration. Reloads re-read the path override unless the
    /// caller replaced the path after reading the environment.
    pub fn from_env(config: &Config) -> Result<Self, ConfigError> {
        let path_source = if config.policy_path == Config::policy_path_from_env() {
            PathSource::Environment
        } else {
            PathSource::Fixed(config.policy_path.clone())
        };
        Self::build_store(
            crate::policy::DEFAULT_POLICY_YAML,
            path_source,
            config.policy_path.clone(),
        )
    }

    fn build_store(
        default_yaml: &str,
        path_source: PathSource,
        user_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let initial = build_configuration(default_yaml, user_path.as_deref(), 1)?;
        info!(
            generation = initial.generation,
            rules = initial.rules.len(),
            user_file = ?user_path,
            "policy loaded"
        );

        Ok(Self {
            default_yaml: default_yaml.to_string(),
            path_source,
            user_path: RwLock::new(user_path),
            current: RwLock::new(Arc::new(initial)),
            reload_lock: Mutex::new(()),
            reloads: AtomicU64::new(0),
        })
    }

    /// The active snapshot.
    pub fn current(&self) -> Arc<Configuration> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rebuild from the default and the user file and swap it in.
    ///
    /// On any error the active snapshot is left untouched.
    pub fn reload(&self) -> Result<Arc<Configuration>, ConfigError> {
        let _guard = self
            .reload_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let user_path = match &self.path_source {
            PathSource::Fixed(path) => path.clone(),
            PathSource::Environment => Config::policy_path_from_env(),
        };
        let next_generation = self.current().generation + 1;

        let built = match build_configuration(&self.default_yaml, user_path.as_deref(), next_generation)
        {
            Ok(cfg) => Arc::new(cfg),
            Err(e) => {
                warn!(error = %e, "policy reload rejected; keeping the active configuration");
                return Err(e);
            }
        };

        *self
            .user_path
            .write()
            .unwrap_or_else(PoisonError::into_inner) = user_path;
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = built.clone();
        self.reloads.fetch_add(1, Ordering::Relaxed);

        info!(
            generation = built.generation,
            fingerprint = %built.fingerprint,
            rules = built.rules.len(),
            "policy reloaded"
        );
        Ok(built)
    }

    /// User file of the active generation, if any.
    pub fn user_path(&self) -> Option<PathBuf> {
        self.user_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }
}

/// Read the user policy document. `Ok(None)` when the file does not exist.
pub fn read_user_document(path: &Path) -> Result<Option<RawDocument>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => RawDocument::from_yaml(&text, &path.display().to_string()).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Merge `user_path` over `default_yaml` and validate the result.
pub fn build_configuration(
    default_yaml: &str,
    user_path: Option<&Path>,
    generation: u64,
) -> Result<Configuration, ConfigError> {
    let base = RawDocument::from_yaml(default_yaml, EMBEDDED_SOURCE)?;

    let merged = match user_path {
        Some(path) => match read_user_document(path)? {
            Some(user) => base.layer(&user),
            None => {
                debug!(path = %path.display(), "no user policy file, using the default");
                base
            }
        },
        None => base,
    };

    Configuration::build(&merged, generation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DEFAULT: &str = r#"
version: "1.0"
settings:
  default_action: allow
rules:
  aws-key:
    patterns: [{regex: "AKIA[0-9A-Z]{16}"}]
    action: block
"#;

    #[test]
    fn test_missing_user_file_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(DEFAULT, Some(&dir.path().join("absent.yaml"))).unwrap();
        let cfg = store.current();
        assert_eq!(cfg.generation, 1);
        assert_eq!(cfg.rules.len(), 1);
    }

    #[test]
    fn test_broken_embedded_default_is_an_error() {
        assert!(ConfigStore::load("rules: [", None).is_err());
    }

    #[test]
    fn test_reload_increments_generation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "settings:\n  default_action: warn").unwrap();

        let store = ConfigStore::load(DEFAULT, Some(file.path())).unwrap();
        let first = store.current();

        let second = store.reload().unwrap();
        assert_eq!(second.generation, first.generation + 1);
        assert_eq!(store.reload_count(), 1);
        assert_eq!(first.fingerprint, second.fingerprint);
    }

    #[test]
    fn test_failed_reload_keeps_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "settings:\n  default_action: warn").unwrap();
        let store = ConfigStore::load(DEFAULT, Some(file.path())).unwrap();
        let before = store.current();

        std::fs::write(file.path(), "rules:\n  bad:\n    patterns: [{regex: \"(\"}]\n").unwrap();
        let err = store.reload().unwrap_err();
        assert_eq!(err.key_path(), Some("rules.bad.patterns[0].regex"));

        let after = store.current();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(store.reload_count(), 0);
    }

    #[test]
    fn test_unreadable_user_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be read as a file
        let err = ConfigStore::load(DEFAULT, Some(dir.path())).err().unwrap();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
