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

//! Comparison of a user policy against the embedded default.

use serde::Serialize;
use serde_yaml_ng::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::policy::raw::{RawDocument, RawSettings};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingChange {
    pub key: String,
    pub user: String,
    pub default: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigDiff {
    /// `(user, default)` when they differ
    pub version: Option<(String, String)>,
    pub user_only_rules: Vec<String>,
    pub default_only_rules: Vec<String>,
    /// Present in both with a different definition
    pub changed_rules: Vec<String>,
    pub changed_settings: Vec<SettingChange>,
    /// Settings keys the default has and the user file does not
    pub new_settings: Vec<String>,
}

impl ConfigDiff {
    pub fn between(default: &RawDocument, user: &RawDocument) -> Self {
        let mut diff = ConfigDiff::default();

        let user_version = user.version.clone().unwrap_or_default();
        let default_version = default.version.clone().unwrap_or_default();
        if user.version.is_some() && user_version != default_version {
            diff.version = Some((user_version, default_version));
        }

        if let Some(user_rules) = &user.rules {
            for (name, rule) in user_rules.iter() {
                match default.rules.as_ref().and_then(|d| d.get(name)) {
                    None => diff.user_only_rules.push(name.to_string()),
                    Some(base) if base != rule => diff.changed_rules.push(name.to_string()),
                    Some(_) => {}
                }
            }
        }
        if let Some(default_rules) = &default.rules {
            for name in default_rules.names() {
                let in_user = user.rules.as_ref().is_some_and(|u| u.contains(name));
                if !in_user {
                    diff.default_only_rules.push(name.to_string());
                }
            }
        }

        let user_settings = settings_map(user.settings.as_ref());
        let default_settings = settings_map(default.settings.as_ref());
        for (key, default_value) in &default_settings {
            match user_settings.get(key) {
                Some(user_value) if user_value != default_value => {
                    diff.changed_settings.push(SettingChange {
                        key: key.clone(),
                        user: render(user_value),
                        default: render(default_value),
                    })
                }
                Some(_) => {}
                None => diff.new_settings.push(key.clone()),
            }
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.version.is_none()
            && self.user_only_rules.is_empty()
            && self.default_only_rules.is_empty()
            && self.changed_rules.is_empty()
            && self.changed_settings.is_empty()
            && self.new_settings.is_empty()
    }
}

fn settings_map(settings: Option<&RawSettings>) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    let Some(settings) = settings else {
        return out;
    };
    if let Ok(Value::Mapping(map)) = serde_yaml_ng::to_value(settings) {
        for (k, v) in map {
            if let Value::String(key) = k {
                out.insert(key, v);
            }
        }
    }
    out
}

fn render(value: &Value) -> String {
    serde_yaml_ng::to_string(value)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

impl fmt::Display for ConfigDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No differences from the default policy.");
        }

        if let Some((user, default)) = &self.version {
            writeln!(f, "Version: user {} / default {}", user, default)?;
        }

        let sections: [(&str, &Vec<String>); 3] = [
            ("Rules only in your file (custom)", &self.user_only_rules),
            ("Rules only in the default (new or not overridden)", &self.default_only_rules),
            ("Rules overriding a default rule with changes", &self.changed_rules),
        ];
        for (title, names) in sections {
            if names.is_empty() {
                continue;
            }
            writeln!(f, "{} ({}):", title, names.len())?;
            for name in names {
                writeln!(f, "  - {}", name)?;
            }
        }

        if !self.changed_settings.is_empty() {
            writeln!(f, "Settings that differ ({}):", self.changed_settings.len())?;
            for change in &self.changed_settings {
                writeln!(
                    f,
                    "  - {}: yours = {}, default = {}",
                    change.key, change.user, change.default
                )?;
            }
        }

        if !self.new_settings.is_empty() {
            writeln!(f, "Settings in the default missing from your file ({}):", self.new_settings.len())?;
            for key in &self.new_settings {
                writeln!(f, "  - {}", key)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: &str = r#"
version: "1.0"
settings:
  default_action: allow
  max_scan_size: 1000
rules:
  a:
    patterns: [{regex: x}]
    action: warn
  b:
    patterns: [{regex: y}]
    action: block
"#;

    #[test]
    fn test_reports_every_category() {
        let default = RawDocument::from_yaml(DEFAULT, "default").unwrap();
        let user = RawDocument::from_yaml(
            r#"
version: "0.9"
settings:
  default_action: warn
rules:
  a:
    patterns: [{regex: x}]
    action: block
  mine:
    patterns: [{literal: z}]
"#,
            "user",
        )
        .unwrap();

        let diff = ConfigDiff::between(&default, &user);
        assert_eq!(diff.version, Some(("0.9".to_string(), "1.0".to_string())));
        assert_eq!(diff.user_only_rules, vec!["mine"]);
        assert_eq!(diff.default_only_rules, vec!["b"]);
        assert_eq!(diff.changed_rules, vec!["a"]);
        assert_eq!(diff.changed_settings.len(), 1);
        assert_eq!(diff.changed_settings[0].key, "default_action");
        assert_eq!(diff.new_settings, vec!["max_scan_size"]);

        let text = diff.to_string();
        assert!(text.contains("mine"));
        assert!(text.contains("yours = warn, default = allow"));
    }

    #[test]
    fn test_identical_documents_have_no_diff() {
        let default = RawDocument::from_yaml(DEFAULT, "default").unwrap();
        let diff = ConfigDiff::between(&default, &default);
        assert!(diff.is_empty());
        assert!(diff.to_string().contains("No differences"));
    }
}
