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

//! lilith-scan: content and access security policy engine for tool plugins.
//!
//! Tools pass every file path, host and piece of fetched or produced text
//! through this library before using it. The answer is an allow, warn or
//! block `Decision` with a stable id, driven by a YAML policy that can be
//! reloaded while the process runs.

pub mod config;
pub mod engine;
pub mod engine_core;
pub mod operations;
pub mod policy;
pub mod utils;

pub use engine_core::errors::{ConfigError, OperationError, SecurityError};
pub use engine_core::models::{Action, Decision, SourceContext};
pub use engine_core::security_core::SecurityCore;
pub use operations::Operations;
pub use policy::{ConfigStore, Configuration};
