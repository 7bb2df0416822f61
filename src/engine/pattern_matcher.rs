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

//! Compiled rules and their evaluation against text.

use globset::{GlobBuilder, GlobMatcher};
use regex::{Regex, RegexBuilder};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::engine::access::HostList;
use crate::engine::decoder;
use crate::engine_core::constants::entropy::{MIN_LINE_LEN, MIN_WORD_LEN};
use crate::engine_core::constants::policy::REGEX_SIZE_LIMIT;
use crate::engine_core::models::Action;
use crate::policy::Settings;
use crate::utils::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Regex,
    Literal,
    Contains,
    StartsWith,
    EndsWith,
    FilePath,
    Url,
    Glob,
    Entropy,
}

impl PatternKind {
    pub const ALL: [PatternKind; 9] = [
        PatternKind::Regex,
        PatternKind::Literal,
        PatternKind::Contains,
        PatternKind::StartsWith,
        PatternKind::EndsWith,
        PatternKind::FilePath,
        PatternKind::Url,
        PatternKind::Glob,
        PatternKind::Entropy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Regex => "regex",
            PatternKind::Literal => "literal",
            PatternKind::Contains => "contains",
            PatternKind::StartsWith => "starts_with",
            PatternKind::EndsWith => "ends_with",
            PatternKind::FilePath => "file_path",
            PatternKind::Url => "url",
            PatternKind::Glob => "glob",
            PatternKind::Entropy => "entropy",
        }
    }
}

#[derive(Error, Debug)]
pub enum PatternError {
    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Glob(#[from] globset::Error),

    #[error("entropy threshold must be a positive number, got '{0}'")]
    Threshold(String),
}

#[derive(Debug, Clone)]
enum Matcher {
    Regex(Regex),
    /// Tested against every word and every trimmed line
    Glob(GlobMatcher),
    /// Lowercased needle searched for in each URL found in the text
    Url { needle: String, extractor: Regex },
    /// Shannon entropy threshold over words and lines in the first `window` bytes
    Entropy { threshold: f64, window: usize },
}

/// One pattern, compiled once for the lifetime of its configuration.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub kind: PatternKind,
    pub source: String,
    matcher: Matcher,
}

impl CompiledPattern {
    /// `settings.case_sensitive` applies to `regex` patterns only. `literal`
    /// and `file_path` are always exact; `contains`, `starts_with`,
    /// `ends_with` and `url` always ignore case.
    pub fn compile(kind: PatternKind, source: &str, settings: &Settings) -> Result<Self, PatternError> {
        let matcher = match kind {
            PatternKind::Regex => Matcher::Regex(build_regex(source, !settings.case_sensitive)?),
            PatternKind::Literal => Matcher::Regex(build_regex(&regex::escape(source), false)?),
            PatternKind::Contains => Matcher::Regex(build_regex(&regex::escape(source), true)?),
            PatternKind::StartsWith => {
                Matcher::Regex(build_regex(&format!(r"\A{}", regex::escape(source)), true)?)
            }
            PatternKind::EndsWith => {
                Matcher::Regex(build_regex(&format!(r"{}\z", regex::escape(source)), true)?)
            }
            PatternKind::FilePath => {
                Matcher::Regex(build_regex(&file_path_expression(source), false)?)
            }
            PatternKind::Url => Matcher::Url {
                needle: source.to_ascii_lowercase(),
                extractor: build_regex(r#"https?://[^\s<>"]+"#, true)?,
            },
            PatternKind::Glob => Matcher::Glob(
                GlobBuilder::new(source)
                    .literal_separator(true)
                    .build()?
                    .compile_matcher(),
            ),
            PatternKind::Entropy => {
                let threshold = source
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|t| t.is_finite() && *t > 0.0)
                    .ok_or_else(|| PatternError::Threshold(source.to_string()))?;
                Matcher::Entropy {
                    threshold,
                    window: usize::try_from(settings.max_entropy_size).unwrap_or(usize::MAX),
                }
            }
        };

        Ok(Self {
            kind,
            source: source.to_string(),
            matcher,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        match &self.matcher {
            Matcher::Regex(regex) => regex.is_match(text),
            Matcher::Glob(glob) => {
                text.split_whitespace().any(|word| glob.is_match(word))
                    || text.lines().map(str::trim).any(|line| glob.is_match(line))
            }
            Matcher::Url { needle, extractor } => extractor
                .find_iter(text)
                .any(|url| url.as_str().to_ascii_lowercase().contains(needle.as_str())),
            Matcher::Entropy { threshold, window } => high_entropy(text, *threshold, *window),
        }
    }
}

fn build_regex(expr: &str, insensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(expr)
        .case_insensitive(insensitive)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
}

/// Spellings a home-relative path takes in scripts and logs.
fn file_path_variants(path: &str) -> Vec<String> {
    let mut variants = vec![path.to_string()];
    if let Some(rest) = path.strip_prefix("~/") {
        variants.push(format!("$HOME/{}", rest));
        variants.push(format!("${{HOME}}/{}", rest));
        variants.push(format!("/home/*/{}", rest));
        variants.push(format!("/Users/*/{}", rest));
        let expanded = paths::expand_home(path);
        if expanded != path {
            variants.push(expanded);
        }
    }
    if path.contains("$HOME") {
        variants.push(path.replace("$HOME", "~"));
    }
    if path.contains("${HOME}") {
        variants.push(path.replace("${HOME}", "~"));
        variants.push(path.replace("${HOME}", "$HOME"));
    }
    variants
}

/// `*` stands for one path segment; everything else is literal.
fn file_path_expression(path: &str) -> String {
    let alternatives: Vec<String> = file_path_variants(path)
        .iter()
        .map(|variant| {
            variant
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"[^/\s]*")
        })
        .collect();
    format!("(?:{})", alternatives.join("|"))
}

/// Shannon entropy of `s` in bits per character.
pub fn shannon_entropy(s: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in s.chars() {
        *counts.entry(c).or_default() += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / n;
            -p * p.log2()
        })
        .sum()
}

fn high_entropy(text: &str, threshold: f64, window: usize) -> bool {
    let mut end = text.len().min(window);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let sample = &text[..end];

    sample
        .split_whitespace()
        .any(|word| word.len() > MIN_WORD_LEN && shannon_entropy(word) >= threshold)
        || sample
            .lines()
            .map(str::trim)
            .any(|line| line.len() > MIN_LINE_LEN && shannon_entropy(line) >= threshold)
}

/// How a rule combines its patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchLogic {
    /// Any one pattern is enough
    #[default]
    Any,
    /// Every pattern must match
    All,
}

/// Sources a rule does not apply to.
#[derive(Debug, Clone, Default)]
pub struct RuleExceptions {
    /// Skip the rule for content coming from any trusted domain
    pub trusted_domains: bool,
    pub hosts: HostList,
}

impl RuleExceptions {
    pub fn is_empty(&self) -> bool {
        !self.trusted_domains && self.hosts.is_empty()
    }
}

/// A validated rule ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub name: String,
    /// `<name>-<8 hex>`, stable while name, action and patterns are unchanged
    pub id: String,
    pub action: Action,
    /// Message with `{rule}`, `{id}` and `{action}` already substituted
    pub message: String,
    pub enabled: bool,
    pub decode_base64: bool,
    pub logic: MatchLogic,
    pub exceptions: RuleExceptions,
    /// Free-form label carried into decisions
    pub severity: Option<String>,
    pub patterns: Vec<CompiledPattern>,
}

/// Per-call evaluation state shared by every rule in one analysis.
///
/// Decoded base64 payloads are computed lazily, at most once per call.
pub struct ScanContext<'a> {
    evaluations: &'a AtomicU64,
    base64_cap: Option<usize>,
    decoded: OnceCell<Vec<String>>,
}

impl<'a> ScanContext<'a> {
    pub fn new(evaluations: &'a AtomicU64) -> Self {
        Self {
            evaluations,
            base64_cap: None,
            decoded: OnceCell::new(),
        }
    }

    /// Allow rules that ask for it to see decoded base64 payloads, each at
    /// most `max_decoded` bytes.
    pub fn with_base64(mut self, max_decoded: usize) -> Self {
        self.base64_cap = Some(max_decoded);
        self
    }

    fn decoded(&self, content: &str) -> &[String] {
        match self.base64_cap {
            Some(cap) => self
                .decoded
                .get_or_init(|| decoder::decode_embedded(content, cap)),
            None => &[],
        }
    }

    fn run(&self, pattern: &CompiledPattern, text: &str) -> bool {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        pattern.is_match(text)
    }
}

pub struct PatternMatcher;

impl PatternMatcher {
    /// Index of the deciding pattern when `rule` matches `content`.
    ///
    /// For `any` rules that is the first matching pattern in declared order;
    /// for `all` rules it is the last pattern. A disabled rule never matches
    /// and runs no pattern.
    pub fn evaluate(rule: &CompiledRule, content: &str, scan: &ScanContext<'_>) -> Option<usize> {
        if !rule.enabled {
            return None;
        }

        match rule.logic {
            MatchLogic::Any => rule
                .patterns
                .iter()
                .position(|pattern| Self::hits(rule, pattern, content, scan)),
            MatchLogic::All => rule
                .patterns
                .iter()
                .all(|pattern| Self::hits(rule, pattern, content, scan))
                .then(|| rule.patterns.len().saturating_sub(1)),
        }
    }

    fn hits(rule: &CompiledRule, pattern: &CompiledPattern, content: &str, scan: &ScanContext<'_>) -> bool {
        if scan.run(pattern, content) {
            return true;
        }
        rule.decode_base64
            && scan
                .decoded(content)
                .iter()
                .any(|decoded| scan.run(pattern, decoded))
    }
}
