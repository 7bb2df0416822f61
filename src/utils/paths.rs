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

//! Path helpers shared by the access controller and the policy loader.

use std::path::{Component, Path, PathBuf};

/// Expand a leading `~` to the user's home directory.
///
/// Only `~` and `~/...` are expanded; `~user` forms are left alone.
pub fn expand_home(input: &str) -> String {
    if input == "~" || input.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{}", home.display(), &input[1..]);
        }
    }
    input.to_string()
}

/// Make `path` absolute and resolve `.` and `..` lexically.
///
/// Symlinks are not followed; see `canonical_variants` for that.
pub fn normalise(path: &Path) -> PathBuf {
    let expanded = match path.to_str() {
        Some(s) => PathBuf::from(expand_home(s)),
        None => path.to_path_buf(),
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(expanded),
            Err(_) => expanded,
        }
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Symlinks followed while resolving a path whose tail does not exist yet.
const MAX_LINK_HOPS: usize = 8;

/// Every spelling of `path` an access check must consider: the lexical form
/// and its form with symlinks resolved. For a path that does not exist yet
/// the deepest existing ancestor is resolved and the rest re-appended, so a
/// link anywhere above a new file is still seen through.
pub fn canonical_variants(path: &Path) -> Vec<PathBuf> {
    let lexical = normalise(path);
    let mut variants = vec![lexical.clone()];
    if let Some(resolved) = resolve_links(&lexical, MAX_LINK_HOPS) {
        if resolved != lexical {
            variants.push(resolved);
        }
    }
    variants
}

fn resolve_links(path: &Path, hops: usize) -> Option<PathBuf> {
    // Missing components, deepest first
    let mut tail = Vec::new();
    let mut current = path.to_path_buf();
    loop {
        if let Ok(canonical) = std::fs::canonicalize(&current) {
            return Some(append_reversed(canonical, &tail));
        }
        // A dangling link: follow it by hand
        if hops > 0 {
            if let Ok(target) = std::fs::read_link(&current) {
                let base = current.parent().map(Path::to_path_buf).unwrap_or_default();
                let next = append_reversed(normalise(&base.join(target)), &tail);
                return resolve_links(&next, hops - 1);
            }
        }
        tail.push(current.file_name()?.to_os_string());
        current = current.parent()?.to_path_buf();
    }
}

fn append_reversed(mut base: PathBuf, tail: &[std::ffi::OsString]) -> PathBuf {
    for part in tail.iter().rev() {
        base.push(part);
    }
    base
}
