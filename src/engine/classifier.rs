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

//! Cheap scan-eligibility checks, run before any pattern.

use crate::engine_core::constants::classifier::{MAX_NON_PRINTABLE_PERCENT, SAMPLE_SIZE};
use crate::engine_core::constants::ids;
use crate::engine_core::models::{stable_id, Action, Decision, SizeExceededBehaviour};
use crate::policy::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    Binary,
    Oversized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Run the rules
    Scan,
    /// Not scanned; treated as Allow
    Skip(SkipReason),
    /// Oversized content with a configured Warn or Block outcome
    Decided(Decision),
}

pub struct ContentClassifier;

impl ContentClassifier {
    pub fn classify(content: &[u8], settings: &Settings) -> Eligibility {
        if content.is_empty() {
            return Eligibility::Skip(SkipReason::Empty);
        }
        if Self::looks_binary(content) {
            return Eligibility::Skip(SkipReason::Binary);
        }

        let len = content.len() as u64;
        if len >= settings.max_scan_size {
            let behaviour = settings.size_exceeded_behaviour;
            let action = match behaviour {
                SizeExceededBehaviour::Skip => return Eligibility::Skip(SkipReason::Oversized),
                SizeExceededBehaviour::Warn => Action::Warn,
                SizeExceededBehaviour::Block => Action::Block,
            };
            let id = stable_id(ids::SIZE_LIMIT, &[behaviour.as_str()]);
            let message = format!(
                "content size ({} bytes) exceeds max_scan_size limit ({} bytes)",
                len, settings.max_scan_size
            );
            return Eligibility::Decided(Decision::new(action, id, message));
        }

        Eligibility::Scan
    }

    pub fn should_scan(content: &[u8], settings: &Settings) -> bool {
        matches!(Self::classify(content, settings), Eligibility::Scan)
    }

    /// Inspect the leading sample for NUL bytes, invalid UTF-8 or too many
    /// control characters.
    pub fn looks_binary(content: &[u8]) -> bool {
        let sample = &content[..content.len().min(SAMPLE_SIZE)];

        if sample.contains(&0) {
            return true;
        }

        if let Err(e) = std::str::from_utf8(sample) {
            // A multi-byte character cut by the sample boundary is fine
            let cut_at_boundary = e.error_len().is_none() && content.len() > sample.len();
            if !cut_at_boundary {
                return true;
            }
        }

        let non_printable = sample
            .iter()
            .filter(|&&b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c)) || b == 0x7f)
            .count();
        non_printable * 100 > sample.len() * MAX_NON_PRINTABLE_PERCENT
    }

    /// Media types whose bodies are never scanned.
    pub fn is_binary_content_type(content_type: &str) -> bool {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        mime == "application/octet-stream"
            || mime == "application/pdf"
            || mime.starts_with("image/")
            || mime.starts_with("video/")
            || mime.starts_with("audio/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_scan: u64, behaviour: SizeExceededBehaviour) -> Settings {
        Settings {
            max_scan_size: max_scan,
            size_exceeded_behaviour: behaviour,
            ..Settings::default()
        }
    }

    #[test]
    fn test_empty_and_binary_skipped() {
        let s = Settings::default();
        assert_eq!(
            ContentClassifier::classify(b"", &s),
            Eligibility::Skip(SkipReason::Empty)
        );
        assert_eq!(
            ContentClassifier::classify(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10], &s),
            Eligibility::Skip(SkipReason::Binary)
        );
        assert!(ContentClassifier::looks_binary(b"text\0with nul"));
    }

    #[test]
    fn test_control_character_threshold() {
        let mut mostly_text = vec![b'a'; 95];
        mostly_text.extend_from_slice(&[0x01; 5]);
        assert!(!ContentClassifier::looks_binary(&mostly_text));

        let mut noisy = vec![b'a'; 80];
        noisy.extend_from_slice(&[0x01; 20]);
        assert!(ContentClassifier::looks_binary(&noisy));
    }

    #[test]
    fn test_multibyte_char_split_by_sample_is_text() {
        let mut content = vec![b'a'; SAMPLE_SIZE - 1];
        content.extend_from_slice("é and more".as_bytes());
        assert!(!ContentClassifier::looks_binary(&content));
    }

    #[test]
    fn test_size_boundary_is_inclusive() {
        let s = settings(10, SizeExceededBehaviour::Block);
        assert_eq!(ContentClassifier::classify(b"123456789", &s), Eligibility::Scan);

        match ContentClassifier::classify(b"1234567890", &s) {
            Eligibility::Decided(d) => {
                assert_eq!(d.action, Action::Block);
                assert!(d.id.starts_with("size-limit-"));
            }
            other => panic!("expected a decision, got {:?}", other),
        }
    }

    #[test]
    fn test_size_skip_and_warn() {
        let skip = settings(4, SizeExceededBehaviour::Skip);
        assert_eq!(
            ContentClassifier::classify(b"too long", &skip),
            Eligibility::Skip(SkipReason::Oversized)
        );

        let warn = settings(4, SizeExceededBehaviour::Warn);
        assert!(matches!(
            ContentClassifier::classify(b"too long", &warn),
            Eligibility::Decided(Decision { action: Action::Warn, .. })
        ));
    }

    #[test]
    fn test_content_types() {
        assert!(ContentClassifier::is_binary_content_type("image/png"));
        assert!(ContentClassifier::is_binary_content_type("Application/PDF; charset=binary"));
        assert!(!ContentClassifier::is_binary_content_type("text/html; charset=utf-8"));
        assert!(!ContentClassifier::is_binary_content_type("application/json"));
    }
}
