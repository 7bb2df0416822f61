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

//! Domain models for lilith-scan.
//!
//! Pure data structures for actions, decisions and call context. Free of I/O.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::engine_core::constants::ids;

/// Outcome of a policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Warn,
    Block,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Warn => "warn",
            Action::Block => "block",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Action::Allow),
            "warn" => Ok(Action::Warn),
            "block" => Ok(Action::Block),
            // Older policy files grade their actions more finely
            "ignore" => Ok(Action::Allow),
            "notify" | "warn_high" => Ok(Action::Warn),
            other => Err(format!(
                "unknown action '{}' (expected allow, warn or block)",
                other
            )),
        }
    }
}

/// What to do with content larger than `max_scan_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeExceededBehaviour {
    /// Treat as not scanned (Allow)
    Skip,
    Warn,
    Block,
}

impl SizeExceededBehaviour {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeExceededBehaviour::Skip => "skip",
            SizeExceededBehaviour::Warn => "warn",
            SizeExceededBehaviour::Block => "block",
        }
    }
}

impl FromStr for SizeExceededBehaviour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            // "allow" is what older policy files call it
            "skip" | "allow" => Ok(SizeExceededBehaviour::Skip),
            "warn" => Ok(SizeExceededBehaviour::Warn),
            "block" => Ok(SizeExceededBehaviour::Block),
            other => Err(format!(
                "unknown size_exceeded_behaviour '{}' (expected skip, warn or block)",
                other
            )),
        }
    }
}

/// Per-call attribution supplied by the calling tool. Never used for matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContext {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Host the content came from; rule exceptions are checked against it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl SourceContext {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            url: None,
            domain: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// URL if known, otherwise the tool name.
    pub fn source_label(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.tool)
    }
}

/// Result of content analysis or an access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub id: String,
    pub message: String,
    /// Name of the rule that fired, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

impl Decision {
    pub fn new(action: Action, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action,
            id: id.into(),
            message: message.into(),
            rule: None,
            severity: None,
        }
    }

    pub fn allow(id: impl Into<String>) -> Self {
        Self::new(Action::Allow, id, String::new())
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    pub fn with_severity(mut self, severity: Option<String>) -> Self {
        self.severity = severity;
        self
    }

    pub fn is_allow(&self) -> bool {
        self.action == Action::Allow
    }

    pub fn is_block(&self) -> bool {
        self.action == Action::Block
    }

    /// Line for tools to prepend to their output when the decision is a warning.
    pub fn warning_notice(&self) -> String {
        match self.action {
            Action::Warn => format!("Security Warning [ID: {}]: {}", self.id, self.message),
            Action::Allow | Action::Block => String::new(),
        }
    }

    /// Engine switched off: everything is allowed without evaluation.
    pub fn disabled() -> Self {
        Self::allow(ids::ENGINE_DISABLED)
    }

    /// Content was not eligible for scanning (empty, binary, oversized with skip).
    pub fn unscanned() -> Self {
        Self::allow(ids::UNSCANNED)
    }
}

/// Derive a stable identifier `<prefix>-<8 hex>` from the given parts.
///
/// The same parts always produce the same id, across processes and reloads.
pub fn stable_id(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    for part in parts {
        hasher.update([0u8]);
        hasher.update(part.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!("{}-{}", prefix, &digest[..ids::HASH_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse() {
        assert_eq!("BLOCK".parse::<Action>(), Ok(Action::Block));
        assert_eq!(" warn ".parse::<Action>(), Ok(Action::Warn));
        assert_eq!("warn_high".parse::<Action>(), Ok(Action::Warn));
        assert_eq!("ignore".parse::<Action>(), Ok(Action::Allow));
        assert!("explode".parse::<Action>().is_err());
    }

    #[test]
    fn test_size_behaviour_accepts_legacy_allow() {
        assert_eq!(
            "allow".parse::<SizeExceededBehaviour>(),
            Ok(SizeExceededBehaviour::Skip)
        );
        assert!("ignore".parse::<SizeExceededBehaviour>().is_err());
    }

    #[test]
    fn test_stable_id_is_deterministic() {
        let a = stable_id("aws-key", &["block", "AKIA[0-9A-Z]{16}"]);
        let b = stable_id("aws-key", &["block", "AKIA[0-9A-Z]{16}"]);
        let c = stable_id("aws-key", &["warn", "AKIA[0-9A-Z]{16}"]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("aws-key-"));
        assert_eq!(a.len(), "aws-key-".len() + ids::HASH_LEN);
    }

    #[test]
    fn test_warning_notice_only_for_warn() {
        let warn = Decision::new(Action::Warn, "x-1", "careful");
        assert_eq!(warn.warning_notice(), "Security Warning [ID: x-1]: careful");
        assert!(Decision::unscanned().warning_notice().is_empty());
    }
}
