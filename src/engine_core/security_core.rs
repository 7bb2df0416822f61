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

//! Security Core.
//!
//! The entry point every tool goes through. It owns the configuration store,
//! the evaluation counters and the audit logger, and applies the process
//! master switch. It knows nothing about files or sockets; `operations`
//! builds the I/O wrappers on top of it.
//!
//! Each public check takes exactly one snapshot from the store. The `*_in`
//! variants accept a snapshot so that a caller combining several checks can
//! evaluate all of them against the same generation.

use serde::Serialize;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::config::Config;
use crate::engine::access::AccessController;
use crate::engine::evaluator::{EngineStats, RuleEngine};
use crate::engine_core::audit::AuditLogger;
use crate::engine_core::errors::{ConfigError, SecurityError};
use crate::engine_core::models::{Decision, SourceContext};
use crate::policy::{ConfigStore, ConfigWatcher, Configuration};

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub analyses: u64,
    pub pattern_evaluations: u64,
    pub reloads: u64,
    pub generation: u64,
}

pub struct SecurityCore {
    store: Arc<ConfigStore>,
    master_enabled: bool,
    stats: EngineStats,
    audit: AuditLogger,
    watcher: Mutex<Option<ConfigWatcher>>,
}

impl SecurityCore {
    pub fn new(store: Arc<ConfigStore>, master_enabled: bool) -> Self {
        if !master_enabled {
            info!("lilith-scan disabled by environment; every check will allow");
        }
        Self {
            store,
            master_enabled,
            stats: EngineStats::default(),
            audit: AuditLogger::new(),
            watcher: Mutex::new(None),
        }
    }

    /// Build from the environment: embedded default, user file, master switch.
    /// Starts the file watcher when the policy asks for `auto_reload`.
    pub fn from_env(config: &Config) -> Result<Self, ConfigError> {
        let store = Arc::new(ConfigStore::from_env(config)?);
        let core = Self::new(store, config.enabled);
        if core.current().settings.auto_reload {
            core.start_watcher();
        }
        Ok(core)
    }

    /// Isolated instance over a single policy document, with no user file.
    pub fn from_policy_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let store = Arc::new(ConfigStore::load(yaml, None)?);
        Ok(Self::new(store, true))
    }

    /// Start the background reload thread if it is not already running.
    /// Returns whether a watcher is active afterwards.
    pub fn start_watcher(&self) -> bool {
        let mut slot = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = ConfigWatcher::spawn(self.store.clone());
        }
        slot.is_some()
    }

    pub fn stop_watcher(&self) {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// The active snapshot.
    pub fn current(&self) -> Arc<Configuration> {
        self.store.current()
    }

    pub fn reload(&self) -> Result<Arc<Configuration>, ConfigError> {
        self.store.reload()
    }

    /// False when either the environment or the snapshot switches the engine off.
    pub fn is_enabled_in(&self, config: &Configuration) -> bool {
        self.master_enabled && config.settings.enabled
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            analyses: self.stats.analyses.load(Ordering::Relaxed),
            pattern_evaluations: self.stats.pattern_evaluations.load(Ordering::Relaxed),
            reloads: self.store.reload_count(),
            generation: self.store.current().generation,
        }
    }

    /// Analyse text content on behalf of a tool.
    pub fn analyse_content(&self, content: &str, source: &SourceContext) -> Decision {
        let config = self.current();
        self.analyse_content_in(&config, content, source)
    }

    pub fn analyse_content_in(
        &self,
        config: &Configuration,
        content: &str,
        source: &SourceContext,
    ) -> Decision {
        self.analyse_bytes_in(config, content.as_bytes(), source)
            .unwrap_or_else(Decision::unscanned)
    }

    /// Analyse raw bytes. `None` for content that was not scanned.
    pub fn analyse_bytes(&self, content: &[u8], source: &SourceContext) -> Option<Decision> {
        let config = self.current();
        self.analyse_bytes_in(&config, content, source)
    }

    pub fn analyse_bytes_in(
        &self,
        config: &Configuration,
        content: &[u8],
        source: &SourceContext,
    ) -> Option<Decision> {
        if !self.is_enabled_in(config) {
            return Some(Decision::disabled());
        }

        let decision =
            RuleEngine::analyse_bytes_from(config, content, source.domain.as_deref(), &self.stats);
        match &decision {
            Some(d) => self.audit.decision("analyse", source, d),
            None => debug!(tool = %source.tool, len = content.len(), "content skipped"),
        }
        decision
    }

    pub fn check_file_access(&self, path: impl AsRef<Path>) -> Result<(), SecurityError> {
        let config = self.current();
        self.check_file_access_in(&config, path.as_ref(), &SourceContext::default())
    }

    pub fn check_file_access_in(
        &self,
        config: &Configuration,
        path: &Path,
        source: &SourceContext,
    ) -> Result<(), SecurityError> {
        if !self.is_enabled_in(config) {
            return Ok(());
        }
        AccessController::check_file_access(config, path).inspect_err(|e| {
            self.audit.denied("file_access", source, e);
        })
    }

    pub fn check_domain(&self, host: &str) -> Result<Decision, SecurityError> {
        let config = self.current();
        self.check_domain_in(&config, host, &SourceContext::default())
    }

    pub fn check_domain_in(
        &self,
        config: &Configuration,
        host: &str,
        source: &SourceContext,
    ) -> Result<Decision, SecurityError> {
        if !self.is_enabled_in(config) {
            return Ok(Decision::disabled());
        }
        match AccessController::check_domain(config, host) {
            Ok(decision) => {
                if !decision.is_allow() {
                    self.audit.decision("domain", source, &decision);
                }
                Ok(decision)
            }
            Err(e) => {
                self.audit.denied("domain", source, &e);
                Err(e)
            }
        }
    }
}
