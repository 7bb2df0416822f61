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

use serde::Serialize;
use tracing::{debug, info};

use crate::engine_core::errors::SecurityError;
use crate::engine_core::models::{Action, Decision, SourceContext};

#[derive(Serialize)]
struct AuditEntry<'a> {
    timestamp: String,
    event_type: &'a str,
    tool: &'a str,
    source: &'a str,
    action: Action,
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<&'a str>,
}

/// Emits one structured event per decision on the `audit` target.
///
/// Where the events end up is the subscriber's business; nothing is written
/// here.
#[derive(Debug, Clone, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn decision(&self, event_type: &str, source: &SourceContext, decision: &Decision) {
        let entry = AuditEntry {
            timestamp: crate::utils::time::now().to_rfc3339(),
            event_type,
            tool: &source.tool,
            source: source.source_label(),
            action: decision.action,
            id: &decision.id,
            rule: decision.rule.as_deref(),
            severity: decision.severity.as_deref(),
        };
        let payload = serde_json::to_string(&entry).unwrap_or_default();

        match decision.action {
            Action::Allow => debug!(
                target: "audit",
                tool = %source.tool,
                id = %decision.id,
                payload = %payload,
                "SCAN_ALLOW"
            ),
            Action::Warn | Action::Block => info!(
                target: "audit",
                tool = %source.tool,
                source = %source.source_label(),
                action = %decision.action,
                id = %decision.id,
                rule = ?decision.rule,
                payload = %payload,
                "SCAN_DECISION"
            ),
        }
    }

    pub fn denied(&self, event_type: &str, source: &SourceContext, err: &SecurityError) {
        let decision = Decision::new(Action::Block, err.id(), err.message());
        self.decision(event_type, source, &decision);
    }
}
