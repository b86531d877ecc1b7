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

//! Remote directory cache and materialization.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::config::RemotePlatform;
use crate::ssh::{FileMode, RemoteChannel};

/// Run-lifetime set of remote directories confirmed present or already
/// claimed for creation. Grows monotonically; never persisted.
///
/// `claim` is an atomic test-and-insert: a path is claimed before its
/// existence check resolves, so two files sharing a parent can never
/// schedule duplicate creations, regardless of task interleaving.
#[derive(Debug, Default)]
pub struct DirCache {
    inner: Mutex<HashSet<String>>,
}

impl DirCache {
    pub fn contains(&self, path: &str) -> bool {
        self.inner.lock().unwrap().contains(path)
    }

    /// Insert `path`, returning whether it was newly claimed.
    pub fn claim(&self, path: &str) -> bool {
        self.inner.lock().unwrap().insert(path.to_string())
    }

    pub fn insert(&self, path: &str) {
        self.inner.lock().unwrap().insert(path.to_string());
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

/// Ensure one file's ancestor directories exist, root to leaf.
///
/// Strictly sequential within the chain: a parent's round-trip completes
/// before its child's begins. Cache keys stay canonical; only the strings
/// sent to the remote are rewritten for Windows-style targets. Existence
/// and creation failures are logged with the offending path and do not
/// abort the file's upload.
pub async fn materialize(
    channel: &dyn RemoteChannel,
    cache: &DirCache,
    chain: Vec<String>,
    platform: RemotePlatform,
) {
    for dir in chain {
        if !cache.claim(&dir) {
            continue;
        }

        let wire_path = platform.wire_path(&dir);
        match channel.exists(&wire_path).await {
            Ok(true) => {
                tracing::debug!("remote directory already present: {}", dir);
            }
            Ok(false) => match channel.create_dir(&wire_path, FileMode::DIR).await {
                Ok(()) => tracing::info!("created remote directory: {}", dir),
                Err(e) => tracing::warn!("failed to create remote directory {}: {}", dir, e),
            },
            Err(e) => {
                tracing::warn!("failed to check remote directory {}: {}", dir, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_once_per_path() {
        let cache = DirCache::default();
        assert!(cache.claim("/site/a"));
        assert!(!cache.claim("/site/a"));
        assert!(cache.claim("/site/b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_contains_after_insert() {
        let cache = DirCache::default();
        assert!(cache.is_empty());
        cache.insert("/site");
        assert!(cache.contains("/site"));
        assert!(!cache.contains("/site/a"));
    }
}
