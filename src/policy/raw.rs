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

//! Policy documents as written by humans.
//!
//! Every field is optional so that a user file can name only what it changes.
//! `RawDocument::layer` folds a user document over the embedded default; the
//! result is then validated into a `Configuration` by `policy::snapshot`.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::engine_core::errors::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct RawDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "schema", schemars(with = "Option<serde_json::Value>"))]
    pub metadata: Option<serde_yaml_ng::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<RawSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_control: Option<RawAccessControl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<RuleMap>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct RawSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_reload: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_content_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_scan_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_exceeded_behaviour: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_base64_scanning: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_base64_decoded_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_trusted_domains: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entropy_size: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct RawAccessControl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "deny_files")]
    pub denied_paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "deny_domains")]
    pub denied_domains: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RawRule {
    #[serde(default)]
    pub patterns: Vec<RawPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Older policy files describe the rule instead of giving a message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_base64: Option<bool>,
    /// `any` (default) or `all`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<String>,
    /// `trusted_domains` or host patterns whose content the rule skips
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exceptions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Accepted for compatibility; not interpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "schema", schemars(with = "Option<serde_json::Value>"))]
    pub options: Option<serde_yaml_ng::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RawPattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_with: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_with: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,
    /// Shannon entropy threshold in bits per character
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f64>,
}

/// Rules keyed by name, in document order.
///
/// Order is the evaluation priority, so a plain `HashMap` will not do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleMap(Vec<(String, RawRule)>);

impl RuleMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, name: &str) -> Option<&RawRule> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace the rule with the same name in place, or append.
    pub fn upsert(&mut self, name: String, rule: RawRule) {
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = rule,
            None => self.0.push((name, rule)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawRule)> {
        self.0.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, RawRule)> for RuleMap {
    fn from_iter<T: IntoIterator<Item = (String, RawRule)>>(iter: T) -> Self {
        let mut map = RuleMap::new();
        for (name, rule) in iter {
            map.upsert(name, rule);
        }
        map
    }
}

impl Serialize for RuleMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, rule) in &self.0 {
            map.serialize_entry(name, rule)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RuleMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RuleMapVisitor;

        impl<'de> Visitor<'de> for RuleMapVisitor {
            type Value = RuleMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of rule name to rule")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<RuleMap, E> {
                Ok(RuleMap::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RuleMap, A::Error> {
                let mut rules = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, rule)) = access.next_entry::<String, RawRule>()? {
                    if rules.iter().any(|(n, _): &(String, RawRule)| *n == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate rule name '{}'",
                            name
                        )));
                    }
                    rules.push((name, rule));
                }
                Ok(RuleMap(rules))
            }
        }

        deserializer.deserialize_map(RuleMapVisitor)
    }
}

#[cfg(feature = "schema")]
impl schemars::JsonSchema for RuleMap {
    fn schema_name() -> String {
        "RuleMap".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        <std::collections::BTreeMap<String, RawRule>>::json_schema(gen)
    }
}

impl RawDocument {
    /// Parse a policy document. Blank or comment-only input is an empty document.
    pub fn from_yaml(text: &str, source_name: &str) -> Result<Self, ConfigError> {
        let has_content = text
            .lines()
            .map(str::trim)
            .any(|l| !l.is_empty() && !l.starts_with('#') && l != "---");
        if !has_content {
            return Ok(Self::default());
        }

        serde_yaml_ng::from_str(text).map_err(|e| ConfigError::Parse {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml_ng::to_string(self).map_err(|e| ConfigError::Parse {
            source_name: "merged policy".to_string(),
            message: e.to_string(),
        })
    }

    /// Layer `user` over `self`.
    ///
    /// Top-level sections the user omits are inherited. `settings` and
    /// `access_control` merge per key. A user rule replaces the default rule of
    /// the same name entirely and keeps its position; new user rules are
    /// appended in the order the user wrote them.
    pub fn layer(&self, user: &RawDocument) -> RawDocument {
        let settings = match (&self.settings, &user.settings) {
            (Some(base), Some(over)) => Some(base.layer(over)),
            (base, over) => over.clone().or_else(|| base.clone()),
        };

        let access_control = match (&self.access_control, &user.access_control) {
            (Some(base), Some(over)) => Some(RawAccessControl {
                allowed_paths: over
                    .allowed_paths
                    .clone()
                    .or_else(|| base.allowed_paths.clone()),
                denied_paths: over
                    .denied_paths
                    .clone()
                    .or_else(|| base.denied_paths.clone()),
                denied_domains: over
                    .denied_domains
                    .clone()
                    .or_else(|| base.denied_domains.clone()),
            }),
            (base, over) => over.clone().or_else(|| base.clone()),
        };

        let rules = match (&self.rules, &user.rules) {
            (Some(base), Some(over)) => {
                let mut merged = base.clone();
                for (name, rule) in over.iter() {
                    merged.upsert(name.to_string(), rule.clone());
                }
                Some(merged)
            }
            (base, over) => over.clone().or_else(|| base.clone()),
        };

        RawDocument {
            version: user.version.clone().or_else(|| self.version.clone()),
            metadata: user.metadata.clone().or_else(|| self.metadata.clone()),
            settings,
            access_control,
            trusted_domains: user
                .trusted_domains
                .clone()
                .or_else(|| self.trusted_domains.clone()),
            rules,
        }
    }
}

impl RawSettings {
    fn layer(&self, over: &RawSettings) -> RawSettings {
        RawSettings {
            enabled: over.enabled.or(self.enabled),
            default_action: over
                .default_action
                .clone()
                .or_else(|| self.default_action.clone()),
            auto_reload: over.auto_reload.or(self.auto_reload),
            case_sensitive: over.case_sensitive.or(self.case_sensitive),
            max_content_size: over.max_content_size.or(self.max_content_size),
            max_scan_size: over.max_scan_size.or(self.max_scan_size),
            size_exceeded_behaviour: over
                .size_exceeded_behaviour
                .clone()
                .or_else(|| self.size_exceeded_behaviour.clone()),
            enable_base64_scanning: over.enable_base64_scanning.or(self.enable_base64_scanning),
            max_base64_decoded_size: over
                .max_base64_decoded_size
                .or(self.max_base64_decoded_size),
            scan_trusted_domains: over.scan_trusted_domains.or(self.scan_trusted_domains),
            max_entropy_size: over.max_entropy_size.or(self.max_entropy_size),
        }
    }
}

/// JSON schema of the policy document.
#[cfg(feature = "schema")]
pub fn schema_json() -> String {
    let schema = schemars::schema_for!(RawDocument);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
