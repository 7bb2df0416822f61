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

//! Text helpers for presenting scanned content.

const NEWLINE_WINDOW: usize = 1000;
const SPACE_WINDOW: usize = 100;

/// Cut `s` to at most `max_bytes`, preferring a natural break.
///
/// The cut lands on the last newline within 1000 bytes of the limit, else on
/// the last space within 100 bytes, else at the limit. A UTF-8 character is
/// never split.
pub fn truncate_at_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let head = &s[..end];

    if let Some(pos) = head.rfind('\n') {
        if end - pos <= NEWLINE_WINDOW {
            return &head[..pos];
        }
    }
    if let Some(pos) = head.rfind(' ') {
        if end - pos <= SPACE_WINDOW {
            return &head[..pos];
        }
    }
    head
}

/// Render bytes for a caller, capped at `max_bytes`.
///
/// Invalid UTF-8 is replaced lossily and a truncation marker is appended when
/// the content was cut.
pub fn display_text(content: &[u8], max_bytes: usize) -> String {
    let text = String::from_utf8_lossy(content);
    let cut = truncate_at_boundary(&text, max_bytes);
    if cut.len() < text.len() {
        format!("{}\n[... truncated, {} bytes total]", cut, content.len())
    } else {
        cut.to_string()
    }
}
