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

//! Policy documents, validation, storage and hot reload.

pub mod diff;
pub mod raw;
pub mod snapshot;
pub mod store;
pub mod watcher;

pub use snapshot::{AccessLists, Configuration, Settings};
pub use store::ConfigStore;
pub use watcher::ConfigWatcher;

/// Policy compiled into the binary; the base every user file is layered on.
pub const DEFAULT_POLICY_YAML: &str = include_str!("default_policy.yaml");
