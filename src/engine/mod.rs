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

//! Evaluation engine: classification, matching, access control and the rule
//! engine that ties them together. Pure logic over a `Configuration`; no I/O
//! apart from symlink resolution in path checks.

pub mod access;
pub mod classifier;
pub mod decoder;
pub mod evaluator;
pub mod pattern_matcher;
