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

//! Access control for filesystem paths and network hosts.
//!
//! Path lists use shell-style globs (`~` expanded, `**` crosses directories).
//! Host lists use exact names, `*.example.com` (the domain and every
//! subdomain) or `*` (everything). Both are compiled once per configuration
//! generation.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::debug;

use crate::engine_core::constants::ids;
use crate::engine_core::errors::{ConfigError, SecurityError};
use crate::engine_core::models::{stable_id, Action, Decision};
use crate::policy::Configuration;
use crate::utils::paths;

/// Compiled list of path globs.
#[derive(Debug, Clone)]
pub struct PathList {
    set: GlobSet,
    /// Glob index in `set` -> index of the pattern it came from
    owners: Vec<usize>,
    patterns: Vec<String>,
}

impl PathList {
    pub fn compile(key_path: &str, patterns: &[String]) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        let mut owners = Vec::new();

        for (i, raw) in patterns.iter().enumerate() {
            let key = format!("{}[{}]", key_path, i);
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(ConfigError::invalid(key, "empty path pattern"));
            }
            let expanded = paths::expand_home(trimmed);

            // A pattern naming a directory also covers everything below it
            let mut variants = vec![expanded.clone()];
            if !expanded.ends_with("/**") {
                variants.push(format!("{}/**", expanded.trim_end_matches('/')));
            }

            for variant in variants {
                let glob = GlobBuilder::new(&variant)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| ConfigError::invalid(key.clone(), e.to_string()))?;
                builder.add(glob);
                owners.push(i);
            }
        }

        let set = builder
            .build()
            .map_err(|e| ConfigError::invalid(key_path, e.to_string()))?;

        Ok(Self {
            set,
            owners,
            patterns: patterns.to_vec(),
        })
    }

    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
            owners: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /// First pattern, in declared order, matching `path`.
    pub fn first_match(&self, path: &Path) -> Option<&str> {
        self.set
            .matches(path)
            .into_iter()
            .filter_map(|glob| self.owners.get(glob).copied())
            .min()
            .map(|i| self.patterns[i].as_str())
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostMatcher {
    Any,
    Exact(String),
    /// `*.base`: matches `base` itself and every subdomain of it
    Subtree(String),
}

impl HostMatcher {
    fn matches(&self, host: &str) -> bool {
        match self {
            HostMatcher::Any => true,
            HostMatcher::Exact(name) => host == name,
            HostMatcher::Subtree(base) => {
                host == base
                    || (host.len() > base.len()
                        && host.ends_with(base.as_str())
                        && host.as_bytes()[host.len() - base.len() - 1] == b'.')
            }
        }
    }
}

/// Compiled list of host patterns.
#[derive(Debug, Clone, Default)]
pub struct HostList {
    entries: Vec<(String, HostMatcher)>,
}

impl HostList {
    pub fn compile(key_path: &str, patterns: &[String]) -> Result<Self, ConfigError> {
        let mut entries = Vec::with_capacity(patterns.len());
        for (i, raw) in patterns.iter().enumerate() {
            let key = format!("{}[{}]", key_path, i);
            let matcher = parse_host_pattern(raw).map_err(|reason| ConfigError::invalid(key, reason))?;
            entries.push((raw.trim().to_string(), matcher));
        }
        Ok(Self { entries })
    }

    /// Append one pattern, reporting errors under `key`.
    pub fn push(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let matcher = parse_host_pattern(raw).map_err(|reason| ConfigError::invalid(key, reason))?;
        self.entries.push((raw.trim().to_string(), matcher));
        Ok(())
    }

    /// First pattern, in declared order, matching `host`.
    pub fn first_match(&self, host: &str) -> Option<&str> {
        let host = normalise_host(host);
        self.entries
            .iter()
            .find(|(_, m)| m.matches(&host))
            .map(|(p, _)| p.as_str())
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    /// Patterns present in both lists, compared after normalisation.
    pub fn overlap<'a>(&'a self, other: &HostList) -> Vec<&'a str> {
        self.entries
            .iter()
            .filter(|(_, m)| other.entries.iter().any(|(_, o)| o == m))
            .map(|(p, _)| p.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalise_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn parse_host_pattern(raw: &str) -> Result<HostMatcher, String> {
    let pattern = normalise_host(raw);
    if pattern.is_empty() {
        return Err("empty host pattern".to_string());
    }
    if pattern == "*" {
        return Ok(HostMatcher::Any);
    }

    let (base, subtree) = match pattern.strip_prefix("*.") {
        Some(rest) => (rest, true),
        None => (pattern.as_str(), false),
    };

    let valid = !base.is_empty()
        && base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
        && !base.starts_with('.')
        && !base.contains("..");
    if !valid {
        return Err(format!(
            "'{}' is not a valid host pattern (expected 'host', '*.domain' or '*')",
            raw.trim()
        ));
    }

    Ok(if subtree {
        HostMatcher::Subtree(base.to_string())
    } else {
        HostMatcher::Exact(base.to_string())
    })
}

/// Path and host checks against one configuration snapshot.
pub struct AccessController;

impl AccessController {
    /// Denied paths win over allowed paths; anything unlisted is allowed.
    ///
    /// Both the lexical path and, when it exists, the symlink-resolved path are
    /// checked, so a link cannot be used to reach a denied location.
    pub fn check_file_access(config: &Configuration, path: &Path) -> Result<(), SecurityError> {
        let variants = paths::canonical_variants(path);

        for candidate in &variants {
            if let Some(pattern) = config.access.denied_paths.first_match(candidate) {
                let id = stable_id(ids::PATH_DENIED, &[pattern]);
                return Err(SecurityError::AccessDenied {
                    message: format!(
                        "Security Block [ID: {}]: access to {} is denied by path rule '{}'. \
                         This is an access control policy and cannot be overridden; \
                         the user can change it in the lilith-scan configuration.",
                        id,
                        path.display(),
                        pattern
                    ),
                    id,
                    target: candidate.display().to_string(),
                });
            }
        }

        if let Some(pattern) = variants
            .iter()
            .find_map(|c| config.access.allowed_paths.first_match(c))
        {
            debug!(path = %path.display(), pattern, "path explicitly allowed");
        }

        Ok(())
    }

    /// Trusted hosts are allowed, then denied hosts block, then the
    /// configured default action applies.
    pub fn check_domain(config: &Configuration, host: &str) -> Result<Decision, SecurityError> {
        let normalised = normalise_host(host);

        if let Some(pattern) = config.access.trusted_domains.first_match(&normalised) {
            return Ok(Decision::allow(stable_id(ids::DOMAIN_TRUSTED, &[pattern])));
        }

        if let Some(pattern) = config.access.denied_domains.first_match(&normalised) {
            let id = stable_id(ids::DOMAIN_DENIED, &[pattern]);
            return Err(SecurityError::DomainDenied {
                message: format!(
                    "Security Block [ID: {}]: access to domain {} is denied by rule '{}'. \
                     This is an access control policy and cannot be overridden; \
                     the user can change it in the lilith-scan configuration.",
                    id, normalised, pattern
                ),
                id,
                host: normalised,
            });
        }

        let action = config.settings.default_action;
        let id = stable_id(ids::DOMAIN_DEFAULT, &[action.as_str()]);
        match action {
            Action::Allow => Ok(Decision::allow(id)),
            Action::Warn => Ok(Decision::new(
                Action::Warn,
                id,
                format!("domain {} is not in the trusted list", normalised),
            )),
            Action::Block => Err(SecurityError::DomainDenied {
                message: format!(
                    "Security Block [ID: {}]: domain {} is not trusted and the default action is block",
                    id, normalised
                ),
                id,
                host: normalised,
            }),
        }
    }

    pub fn is_trusted(config: &Configuration, host: &str) -> bool {
        config.access.trusted_domains.first_match(host).is_some()
    }
}
