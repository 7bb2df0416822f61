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

//! Rule evaluation engine.
//!
//! `RuleEngine` runs the classifier, then every enabled rule in declared
//! order, and reduces the first match to a `Decision`. Everything it reads
//! comes from one `Configuration` snapshot supplied by the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::engine::classifier::{ContentClassifier, Eligibility};
use crate::engine::pattern_matcher::{CompiledRule, PatternMatcher, ScanContext};
use crate::engine_core::constants::ids;
use crate::engine_core::models::{stable_id, Action, Decision};
use crate::policy::Configuration;

/// Counters shared by every analysis through one engine instance.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub analyses: AtomicU64,
    /// One per regex execution
    pub pattern_evaluations: AtomicU64,
}

pub struct RuleEngine;

impl RuleEngine {
    /// Analyse raw bytes. `None` when the content is not scanned at all
    /// (empty, binary, or oversized with `skip`).
    pub fn analyse_bytes(
        config: &Configuration,
        content: &[u8],
        stats: &EngineStats,
    ) -> Option<Decision> {
        Self::analyse_bytes_from(config, content, None, stats)
    }

    /// As `analyse_bytes`, for content fetched from `domain`. Rules whose
    /// exceptions cover the domain are skipped.
    pub fn analyse_bytes_from(
        config: &Configuration,
        content: &[u8],
        domain: Option<&str>,
        stats: &EngineStats,
    ) -> Option<Decision> {
        stats.analyses.fetch_add(1, Ordering::Relaxed);

        if !config.settings.enabled {
            return Some(Decision::disabled());
        }

        match ContentClassifier::classify(content, &config.settings) {
            Eligibility::Scan => {}
            Eligibility::Skip(reason) => {
                debug!(?reason, len = content.len(), "content not scanned");
                return None;
            }
            Eligibility::Decided(decision) => return Some(decision),
        }

        // The classifier has already checked the sample; the tail may still
        // hold invalid sequences
        let text = String::from_utf8_lossy(content);
        Some(Self::run_rules(config, &text, domain, stats))
    }

    /// Analyse text. Always yields a decision; unscanned content is Allow.
    pub fn analyse(config: &Configuration, content: &str, stats: &EngineStats) -> Decision {
        Self::analyse_bytes(config, content.as_bytes(), stats).unwrap_or_else(Decision::unscanned)
    }

    fn run_rules(
        config: &Configuration,
        text: &str,
        domain: Option<&str>,
        stats: &EngineStats,
    ) -> Decision {
        let mut scan = ScanContext::new(&stats.pattern_evaluations);
        if config.settings.enable_base64_scanning {
            scan = scan.with_base64(config.settings.max_base64_decoded_size as usize);
        }

        for rule in &config.rules {
            if let Some(host) = domain.filter(|host| excepted(config, rule, host)) {
                debug!(rule = %rule.name, host, "rule skipped for excepted source");
                continue;
            }
            if let Some(index) = PatternMatcher::evaluate(rule, text, &scan) {
                debug!(
                    rule = %rule.name,
                    pattern = index,
                    action = %rule.action,
                    "rule matched"
                );
                return Decision::new(rule.action, rule.id.clone(), rule.message.clone())
                    .with_rule(rule.name.clone())
                    .with_severity(rule.severity.clone());
            }
        }

        let action = config.settings.default_action;
        let id = stable_id(ids::DEFAULT_ACTION, &[action.as_str()]);
        match action {
            Action::Allow => Decision::allow(id),
            Action::Warn | Action::Block => Decision::new(
                action,
                id.clone(),
                format!(
                    "Security {} [ID: {}]: no rule matched and the default action is {}",
                    if action == Action::Block { "Block" } else { "Warning" },
                    id,
                    action
                ),
            ),
        }
    }
}

fn excepted(config: &Configuration, rule: &CompiledRule, host: &str) -> bool {
    let exceptions = &rule.exceptions;
    (exceptions.trusted_domains && config.access.trusted_domains.first_match(host).is_some())
        || exceptions.hosts.first_match(host).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::raw::RawDocument;

    fn config(yaml: &str) -> Configuration {
        Configuration::build(&RawDocument::from_yaml(yaml, "test").unwrap(), 1).unwrap()
    }

    const TWO_RULES: &str = r#"
rules:
  first:
    patterns: [{regex: "secret"}]
    action: warn
  second:
    patterns: [{regex: "secret"}]
    action: block
"#;

    #[test]
    fn test_first_matching_rule_wins() {
        let cfg = config(TWO_RULES);
        let stats = EngineStats::default();
        let d = RuleEngine::analyse(&cfg, "a secret", &stats);
        assert_eq!(d.action, Action::Warn);
        assert_eq!(d.id, cfg.rules[0].id);
        assert_eq!(d.rule.as_deref(), Some("first"));
        // The second rule was never run
        assert_eq!(stats.pattern_evaluations.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_default_action_when_nothing_matches() {
        let cfg = config("settings:\n  default_action: warn\nrules: {}\n");
        let d = RuleEngine::analyse(&cfg, "plain text", &EngineStats::default());
        assert_eq!(d.action, Action::Warn);
        assert!(d.id.starts_with("default-action-"));
    }

    #[test]
    fn test_disabled_settings_short_circuit() {
        let cfg = config(&format!("settings:\n  enabled: false\n{}", TWO_RULES));
        let stats = EngineStats::default();
        let d = RuleEngine::analyse(&cfg, "a secret", &stats);
        assert_eq!(d, Decision::disabled());
        assert_eq!(stats.pattern_evaluations.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_binary_is_unscanned() {
        let cfg = config(TWO_RULES);
        let stats = EngineStats::default();
        let d = RuleEngine::analyse_bytes(&cfg, &[0xFF, 0xD8, 0xFF, 0xE0], &stats);
        assert!(d.is_none());
        assert_eq!(stats.pattern_evaluations.load(Ordering::Relaxed), 0);
        assert_eq!(stats.analyses.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_base64_scanning_respects_setting() {
        let rules = r#"
rules:
  injection:
    patterns: [{contains: "ignore previous instructions"}]
    action: block
    decode_base64: true
"#;
        let payload = "aWdub3JlIHByZXZpb3VzIGluc3RydWN0aW9ucw==";

        let off = config(rules);
        assert!(RuleEngine::analyse(&off, payload, &EngineStats::default()).is_allow());

        let on = config(&format!("settings:\n  enable_base64_scanning: true\n{}", rules));
        assert!(RuleEngine::analyse(&on, payload, &EngineStats::default()).is_block());
    }

    const EXCEPTED: &str = r#"
trusted_domains: ["docs.example.com"]
rules:
  secret:
    patterns: [{regex: "secret"}]
    action: block
    severity: critical
    exceptions: [trusted_domains, "*.internal.test"]
"#;

    #[test]
    fn test_exceptions_skip_rule_for_listed_sources() {
        let cfg = config(EXCEPTED);
        let stats = EngineStats::default();
        let body = b"a secret";

        let trusted = RuleEngine::analyse_bytes_from(&cfg, body, Some("docs.example.com"), &stats);
        assert!(trusted.unwrap().is_allow());
        let listed = RuleEngine::analyse_bytes_from(&cfg, body, Some("ci.internal.test"), &stats);
        assert!(listed.unwrap().is_allow());
        assert_eq!(stats.pattern_evaluations.load(Ordering::Relaxed), 0);

        let other = RuleEngine::analyse_bytes_from(&cfg, body, Some("evil.test"), &stats).unwrap();
        assert!(other.is_block());
        assert_eq!(other.severity.as_deref(), Some("critical"));
    }

    #[test]
    fn test_exceptions_do_not_apply_without_a_source() {
        let cfg = config(EXCEPTED);
        assert!(RuleEngine::analyse(&cfg, "a secret", &EngineStats::default()).is_block());
    }
}
