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

//! Validated, immutable configuration generations.
//!
//! A `Configuration` is only ever constructed through `Configuration::build`,
//! which checks every value and compiles every pattern. Once built it is
//! shared read-only behind an `Arc`.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::engine::access::{HostList, PathList};
use crate::engine::pattern_matcher::{
    CompiledPattern, CompiledRule, MatchLogic, PatternKind, RuleExceptions,
};
use crate::engine_core::constants::policy::SCHEMA_VERSION;
use crate::engine_core::errors::ConfigError;
use crate::engine_core::models::{stable_id, Action, SizeExceededBehaviour};
use crate::policy::raw::{RawDocument, RawPattern, RawRule, RawSettings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub enabled: bool,
    pub default_action: Action,
    pub auto_reload: bool,
    pub case_sensitive: bool,
    pub max_content_size: u64,
    pub max_scan_size: u64,
    pub size_exceeded_behaviour: SizeExceededBehaviour,
    pub enable_base64_scanning: bool,
    pub max_base64_decoded_size: u64,
    pub scan_trusted_domains: bool,
    /// Bytes of content the entropy patterns look at
    pub max_entropy_size: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_action: Action::Allow,
            auto_reload: false,
            case_sensitive: false,
            max_content_size: 1_048_576,
            max_scan_size: 524_288,
            size_exceeded_behaviour: SizeExceededBehaviour::Warn,
            enable_base64_scanning: false,
            max_base64_decoded_size: 65_536,
            scan_trusted_domains: true,
            max_entropy_size: 65_536,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessLists {
    pub allowed_paths: PathList,
    pub denied_paths: PathList,
    pub denied_domains: HostList,
    pub trusted_domains: HostList,
}

/// One generation of the active policy.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub version: String,
    pub settings: Settings,
    pub access: AccessLists,
    /// In evaluation order
    pub rules: Vec<CompiledRule>,
    /// Monotonic per store; 0 for configurations built outside a store
    pub generation: u64,
    /// Hex SHA-256 of the merged document
    pub fingerprint: String,
}

impl Configuration {
    pub fn build(doc: &RawDocument, generation: u64) -> Result<Self, ConfigError> {
        let version = doc.version.clone().unwrap_or_default();
        if version != SCHEMA_VERSION {
            warn!(
                found = %version,
                expected = SCHEMA_VERSION,
                "policy version differs from the version this build understands"
            );
        }

        let settings = build_settings(doc.settings.as_ref())?;

        let empty = Vec::new();
        let ac = doc.access_control.as_ref();
        let access = AccessLists {
            allowed_paths: PathList::compile(
                "access_control.allowed_paths",
                ac.and_then(|a| a.allowed_paths.as_ref()).unwrap_or(&empty),
            )?,
            denied_paths: PathList::compile(
                "access_control.denied_paths",
                ac.and_then(|a| a.denied_paths.as_ref()).unwrap_or(&empty),
            )?,
            denied_domains: HostList::compile(
                "access_control.denied_domains",
                ac.and_then(|a| a.denied_domains.as_ref()).unwrap_or(&empty),
            )?,
            trusted_domains: HostList::compile(
                "trusted_domains",
                doc.trusted_domains.as_ref().unwrap_or(&empty),
            )?,
        };

        for pattern in access.trusted_domains.overlap(&access.denied_domains) {
            warn!(
                pattern,
                "host pattern is both trusted and denied; trusted takes precedence"
            );
        }

        let mut rules = Vec::new();
        if let Some(map) = &doc.rules {
            for (name, raw) in map.iter() {
                rules.push(build_rule(name, raw, &settings)?);
            }
        }

        let canonical = doc.to_yaml()?;
        let fingerprint = hex::encode(Sha256::digest(canonical.as_bytes()));

        Ok(Self {
            version,
            settings,
            access,
            rules,
            generation,
            fingerprint,
        })
    }

    pub fn rule(&self, name: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn enabled_rule_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }
}

fn positive(key: &str, value: Option<i64>, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) if v > 0 => Ok(v as u64),
        Some(v) => Err(ConfigError::invalid(
            key,
            format!("must be a positive number of bytes, got {}", v),
        )),
    }
}

fn build_settings(raw: Option<&RawSettings>) -> Result<Settings, ConfigError> {
    let defaults = Settings::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };

    let default_action = match &raw.default_action {
        Some(s) => s
            .parse::<Action>()
            .map_err(|e| ConfigError::invalid("settings.default_action", e))?,
        None => defaults.default_action,
    };
    let size_exceeded_behaviour = match &raw.size_exceeded_behaviour {
        Some(s) => s
            .parse::<SizeExceededBehaviour>()
            .map_err(|e| ConfigError::invalid("settings.size_exceeded_behaviour", e))?,
        None => defaults.size_exceeded_behaviour,
    };

    Ok(Settings {
        enabled: raw.enabled.unwrap_or(defaults.enabled),
        default_action,
        auto_reload: raw.auto_reload.unwrap_or(defaults.auto_reload),
        case_sensitive: raw.case_sensitive.unwrap_or(defaults.case_sensitive),
        max_content_size: positive(
            "settings.max_content_size",
            raw.max_content_size,
            defaults.max_content_size,
        )?,
        max_scan_size: positive(
            "settings.max_scan_size",
            raw.max_scan_size,
            defaults.max_scan_size,
        )?,
        size_exceeded_behaviour,
        enable_base64_scanning: raw
            .enable_base64_scanning
            .unwrap_or(defaults.enable_base64_scanning),
        max_base64_decoded_size: positive(
            "settings.max_base64_decoded_size",
            raw.max_base64_decoded_size,
            defaults.max_base64_decoded_size,
        )?,
        scan_trusted_domains: raw
            .scan_trusted_domains
            .unwrap_or(defaults.scan_trusted_domains),
        max_entropy_size: positive(
            "settings.max_entropy_size",
            raw.max_entropy_size,
            defaults.max_entropy_size,
        )?,
    })
}

fn pattern_source(key: &str, raw: &RawPattern) -> Result<(PatternKind, String), ConfigError> {
    let criteria = [
        (PatternKind::Regex, raw.regex.clone()),
        (PatternKind::Literal, raw.literal.clone()),
        (PatternKind::Contains, raw.contains.clone()),
        (PatternKind::StartsWith, raw.starts_with.clone()),
        (PatternKind::EndsWith, raw.ends_with.clone()),
        (PatternKind::FilePath, raw.file_path.clone()),
        (PatternKind::Url, raw.url.clone()),
        (PatternKind::Glob, raw.glob.clone()),
        (PatternKind::Entropy, raw.entropy.map(|t| t.to_string())),
    ];
    let mut present = criteria
        .into_iter()
        .filter_map(|(kind, value)| value.map(|v| (kind, v)));

    match (present.next(), present.next()) {
        (Some((kind, source)), None) => {
            if source.is_empty() {
                Err(ConfigError::invalid(
                    format!("{}.{}", key, kind.as_str()),
                    "empty pattern",
                ))
            } else {
                Ok((kind, source))
            }
        }
        (None, _) => Err(ConfigError::invalid(
            key,
            format!("pattern needs one of {}", kind_list()),
        )),
        (Some(_), Some(_)) => Err(ConfigError::invalid(
            key,
            format!("pattern must have exactly one of {}", kind_list()),
        )),
    }
}

fn kind_list() -> String {
    PatternKind::ALL
        .iter()
        .map(PatternKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_exceptions(key: &str, raw: Option<&Vec<String>>) -> Result<RuleExceptions, ConfigError> {
    let mut exceptions = RuleExceptions::default();
    for (i, entry) in raw.into_iter().flatten().enumerate() {
        if entry.trim() == "trusted_domains" {
            exceptions.trusted_domains = true;
        } else {
            exceptions
                .hosts
                .push(&format!("{}.exceptions[{}]", key, i), entry)?;
        }
    }
    Ok(exceptions)
}

fn build_rule(name: &str, raw: &RawRule, settings: &Settings) -> Result<CompiledRule, ConfigError> {
    let key = format!("rules.{}", name);
    if name.trim().is_empty() {
        return Err(ConfigError::invalid("rules", "rule names must not be empty"));
    }

    let action = match &raw.action {
        Some(s) => s
            .parse::<Action>()
            .map_err(|e| ConfigError::invalid(format!("{}.action", key), e))?,
        None => Action::Warn,
    };

    if raw.patterns.is_empty() {
        return Err(ConfigError::invalid(
            format!("{}.patterns", key),
            "rule has no patterns",
        ));
    }

    let mut patterns = Vec::with_capacity(raw.patterns.len());
    for (i, p) in raw.patterns.iter().enumerate() {
        let pkey = format!("{}.patterns[{}]", key, i);
        let (kind, source) = pattern_source(&pkey, p)?;
        let compiled = CompiledPattern::compile(kind, &source, settings)
            .map_err(|e| ConfigError::invalid(format!("{}.{}", pkey, kind.as_str()), e.to_string()))?;
        patterns.push(compiled);
    }

    let logic = match raw.logic.as_deref().map(str::trim) {
        None | Some("any") => MatchLogic::Any,
        Some("all") => MatchLogic::All,
        Some(other) => {
            return Err(ConfigError::invalid(
                format!("{}.logic", key),
                format!("unknown logic '{}', expected any or all", other),
            ))
        }
    };
    let exceptions = build_exceptions(&key, raw.exceptions.as_ref())?;
    if raw.options.is_some() {
        warn!(rule = name, "rule options are not interpreted and will be ignored");
    }

    let mut id_parts: Vec<&str> = vec![action.as_str()];
    if logic == MatchLogic::All {
        id_parts.push("all");
    }
    for p in &patterns {
        id_parts.push(p.kind.as_str());
        id_parts.push(&p.source);
    }
    let id = stable_id(name, &id_parts);

    let template = raw
        .message
        .as_deref()
        .or(raw.description.as_deref())
        .unwrap_or_default();
    let message = render_message(template, name, &id, action);

    Ok(CompiledRule {
        name: name.to_string(),
        id,
        action,
        message,
        enabled: raw.enabled.unwrap_or(true),
        decode_base64: raw.decode_base64.unwrap_or(false),
        logic,
        exceptions,
        severity: raw.severity.clone(),
        patterns,
    })
}

/// Substitute `{rule}`, `{id}` and `{action}`, or produce the standard line
/// when the rule has no message.
pub fn render_message(template: &str, rule: &str, id: &str, action: Action) -> String {
    if template.trim().is_empty() {
        let label = match action {
            Action::Block => "Block",
            Action::Warn => "Warning",
            Action::Allow => "Notice",
        };
        return format!("Security {} [ID: {}]: rule '{}' matched", label, id, rule);
    }
    template
        .replace("{rule}", rule)
        .replace("{id}", id)
        .replace("{action}", action.as_str())
}
