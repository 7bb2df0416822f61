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

//! Error types.
//!
//! `ConfigError` covers policy loading, `SecurityError` carries Block
//! decisions, and `OperationError` wraps both plus plain I/O and HTTP
//! failures. An I/O failure is never reported as a block.

use std::path::PathBuf;
use thiserror::Error;

/// Problems found while loading or validating a policy document.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document is not valid YAML or does not fit the schema
    #[error("failed to parse {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// A value is present but not acceptable
    #[error("{key_path}: {reason}")]
    Invalid { key_path: String, reason: String },

    /// The user configuration file exists but could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn invalid(key_path: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key_path: key_path.into(),
            reason: reason.into(),
        }
    }

    /// Dotted path of the offending key, when the error is tied to one.
    pub fn key_path(&self) -> Option<&str> {
        match self {
            ConfigError::Invalid { key_path, .. } => Some(key_path),
            _ => None,
        }
    }
}

/// A Block decision surfaced as an error value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("{message}")]
    AccessDenied {
        id: String,
        target: String,
        message: String,
    },

    #[error("{message}")]
    DomainDenied {
        id: String,
        host: String,
        message: String,
    },

    #[error("{message}")]
    ContentBlocked { id: String, message: String },
}

impl SecurityError {
    /// Stable identifier of the decision that produced this block.
    pub fn id(&self) -> &str {
        match self {
            SecurityError::AccessDenied { id, .. }
            | SecurityError::DomainDenied { id, .. }
            | SecurityError::ContentBlocked { id, .. } => id,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SecurityError::AccessDenied { message, .. }
            | SecurityError::DomainDenied { message, .. }
            | SecurityError::ContentBlocked { message, .. } => message,
        }
    }
}

/// Errors returned by the `Safe*` wrappers in `operations`.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),
}

impl OperationError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OperationError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the failure is a policy decision rather than an I/O problem.
    pub fn is_security_block(&self) -> bool {
        matches!(self, OperationError::Security(_))
    }

    pub fn security_id(&self) -> Option<&str> {
        match self {
            OperationError::Security(e) => Some(e.id()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_error_conversion() {
        let sec = SecurityError::ContentBlocked {
            id: "aws-key-1a2b3c4d".to_string(),
            message: "blocked".to_string(),
        };
        let op: OperationError = sec.into();

        assert!(op.is_security_block());
        assert_eq!(op.security_id(), Some("aws-key-1a2b3c4d"));
    }

    #[test]
    fn test_io_error_is_not_a_block() {
        let op = OperationError::io(
            "/nope",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(!op.is_security_block());
        assert_eq!(op.security_id(), None);
    }

    #[test]
    fn test_config_error_carries_key_path() {
        let err = ConfigError::invalid("rules.aws-key.action", "unknown action 'blok'");
        assert_eq!(err.key_path(), Some("rules.aws-key.action"));
        assert!(err.to_string().starts_with("rules.aws-key.action:"));
    }
}
