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

//! lilith-scan constants - single source of truth for defaults and limits.

/// Configuration Environment Variables
pub mod config {
    pub const ENV_ENABLED: &str = "LILITH_SCAN_ENABLED";
    pub const ENV_CONFIG_PATH: &str = "LILITH_SCAN_CONFIG_PATH";
    pub const ENV_LOG_LEVEL: &str = "LILITH_SCAN_LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LILITH_SCAN_LOG_FORMAT";
    pub const ENV_HTTP_TIMEOUT_SECS: &str = "LILITH_SCAN_HTTP_TIMEOUT_SECS";

    /// Directory under the user's home holding the user policy
    pub const CONFIG_DIR_NAME: &str = ".lilith-scan";
    pub const CONFIG_FILE_NAME: &str = "security.yaml";

    pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
}

/// Policy schema
pub mod policy {
    /// Schema version this build understands; mismatches only warn
    pub const SCHEMA_VERSION: &str = "1.0";

    /// Source name used in parse errors for the compiled-in document
    pub const EMBEDDED_SOURCE: &str = "embedded default policy";

    /// Compiled regex size cap per pattern
    pub const REGEX_SIZE_LIMIT: usize = 1 << 20;
}

/// Content classification
pub mod classifier {
    /// Leading bytes inspected to decide text vs binary
    pub const SAMPLE_SIZE: usize = 512;
    /// Maximum share of non-printable bytes in the sample, in percent
    pub const MAX_NON_PRINTABLE_PERCENT: usize = 10;
}

/// Base64 payload decoding
pub mod entropy {
    /// Words must be longer than this to be scored
    pub const MIN_WORD_LEN: usize = 20;
    /// Trimmed lines must be longer than this to be scored
    pub const MIN_LINE_LEN: usize = 40;
}

pub mod http {
    /// Redirect hops followed by the safe HTTP wrappers
    pub const MAX_REDIRECTS: usize = 10;
    /// Content type sent with a POST body unless the caller sets one
    pub const DEFAULT_POST_CONTENT_TYPE: &str = "application/json";
}

pub mod base64 {
    pub const MIN_TOKEN_LEN: usize = 16;
    pub const MAX_DEPTH: usize = 3;
}

/// Decision identifiers that are not tied to a configured rule
pub mod ids {
    pub const DEFAULT_ACTION: &str = "default-action";
    pub const ENGINE_DISABLED: &str = "engine-disabled";
    pub const UNSCANNED: &str = "unscanned";
    pub const SIZE_LIMIT: &str = "size-limit";
    pub const PATH_DENIED: &str = "path-denied";
    pub const DOMAIN_DENIED: &str = "domain-denied";
    pub const DOMAIN_DEFAULT: &str = "domain-default";
    pub const DOMAIN_TRUSTED: &str = "domain-trusted";

    /// Hex characters of the SHA-256 digest appended to ids
    pub const HASH_LEN: usize = 8;
}

/// Watcher
pub mod watcher {
    /// Quiet period before a burst of file events triggers one reload
    pub const DEBOUNCE_MS: u64 = 250;
}
