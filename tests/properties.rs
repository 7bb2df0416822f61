use lilith_scan::engine::evaluator::{EngineStats, RuleEngine};
use lilith_scan::policy::raw::RawDocument;
use lilith_scan::policy::Configuration;
use proptest::prelude::*;
use std::sync::atomic::Ordering;

fn config(yaml: &str) -> Configuration {
    Configuration::build(&RawDocument::from_yaml(yaml, "proptest").unwrap(), 1).unwrap()
}

const RULES: &str = r#"
settings:
  default_action: warn
  enable_base64_scanning: true
rules:
  digits:
    patterns: [{regex: "[0-9]{4}"}]
    action: block
  vowels:
    patterns: [{regex: "[aeiou]{3}"}]
    action: warn
  marker:
    patterns: [{contains: "zz"}]
    action: allow
    decode_base64: true
"#;

proptest! {
    #[test]
    fn test_analysis_is_deterministic(content in "\\PC{0,200}") {
        let cfg = config(RULES);
        let stats = EngineStats::default();

        let first = RuleEngine::analyse(&cfg, &content, &stats);
        for _ in 0..3 {
            let again = RuleEngine::analyse(&cfg, &content, &stats);
            prop_assert_eq!(&first, &again);
        }
    }

    #[test]
    fn test_earlier_rule_wins_when_both_match(prefix in "[a-z ]{0,20}", suffix in "[a-z ]{0,20}") {
        let cfg = config(
            r#"
rules:
  a:
    patterns: [{literal: "needle"}]
    action: warn
  b:
    patterns: [{regex: "need(le)?"}]
    action: block
"#,
        );
        let content = format!("{}needle{}", prefix, suffix);
        let decision = RuleEngine::analyse(&cfg, &content, &EngineStats::default());
        prop_assert_eq!(decision.id, cfg.rules[0].id.clone());
    }

    #[test]
    fn test_oversized_content_runs_no_pattern(extra in 0usize..256) {
        let cfg = config(
            r#"
settings:
  max_scan_size: 128
  size_exceeded_behaviour: warn
rules:
  anything:
    patterns: [{regex: "."}]
    action: block
"#,
        );
        let stats = EngineStats::default();
        let content = "a".repeat(128 + extra);

        let decision = RuleEngine::analyse(&cfg, &content, &stats);
        prop_assert!(decision.id.starts_with("size-limit-"));
        prop_assert_eq!(stats.pattern_evaluations.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let cfg = config(RULES);
        let _ = RuleEngine::analyse_bytes(&cfg, &bytes, &EngineStats::default());
    }
}
