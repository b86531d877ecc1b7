// Copyright 2025 Lablup Inc. and Jeongkyu Shin
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

//! Remote path resolution.
//!
//! All cache keys and resolved paths use canonical forward slashes;
//! platform-specific separator rewriting happens at the wire boundary
//! only.

use std::path::Path;

use super::dirs::DirCache;

/// Normalize a path string to forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Normalize the remote base path: forward slashes, no trailing slash
/// (except the bare root).
pub fn normalize_base(base: &str) -> String {
    let normalized = normalize_path(base);
    let trimmed = normalized.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Join a file's pipeline-relative path onto the remote base path.
pub fn join_remote(base: &str, relative: &Path) -> String {
    let relative = normalize_path(&relative.to_string_lossy());
    let relative = relative.trim_start_matches('/');
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        format!("/{relative}")
    } else {
        format!("{base}/{relative}")
    }
}

/// Resolve the ordered ancestor directories to materialize for one file.
///
/// Walks from the file's parent directory up to the root, drops every
/// ancestor shorter than the base path (directories above the managed
/// tree are never created) and every ancestor already in the cache, then
/// returns the survivors root-first: a parent is always ahead of its
/// children, so creating the list in order creates parents before
/// children.
pub fn ancestor_chain(remote_file_path: &str, base_path: &str, cache: &DirCache) -> Vec<String> {
    let normalized = normalize_path(remote_file_path);

    let mut chain = Vec::new();
    let mut current = parent_dir(&normalized);
    while let Some(dir) = current {
        current = parent_dir(&dir);
        chain.push(dir);
    }

    chain.retain(|dir| dir.len() >= base_path.len() && !cache.contains(dir));
    chain.reverse();
    chain
}

/// Parent directory of a slash-separated path, or `None` at the top.
fn parent_dir(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => {
            if trimmed.len() > 1 {
                Some("/".to_string())
            } else {
                None
            }
        }
        Some(idx) => Some(trimmed[..idx].to_string()),
        None => None,
    }
}
