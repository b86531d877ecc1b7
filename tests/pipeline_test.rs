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

//! Pipeline behavior against a recording channel double.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bship::config::ShipConfig;
use bship::error::{Error, Result};
use bship::pipeline::{Artifact, ChannelConnector, Uploader};
use bship::ssh::{FileMode, RemoteChannel};
use tokio::io::AsyncWrite;

/// Recording channel double. Every remote call is appended to an ordered
/// log; `existing` backs the existence checks and grows on create.
#[derive(Default)]
struct MockChannel {
    log: Mutex<Vec<String>>,
    existing: Mutex<HashSet<String>>,
    closed: AtomicBool,
    fail_writes: AtomicBool,
    exec_status: AtomicUsize,
}

impl MockChannel {
    fn with_existing(paths: &[&str]) -> Arc<Self> {
        let mock = Self::default();
        {
            let mut existing = mock.existing.lock().unwrap();
            for path in paths {
                existing.insert(path.to_string());
            }
        }
        Arc::new(mock)
    }

    fn log_entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn count_with_prefix(&self, prefix: &str) -> usize {
        self.log_entries()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    fn index_of(&self, entry: &str) -> Option<usize> {
        self.log_entries().iter().position(|e| e == entry)
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl RemoteChannel for MockChannel {
    async fn exists(&self, path: &str) -> Result<bool> {
        self.record(format!("exists {path}"));
        Ok(self.existing.lock().unwrap().contains(path))
    }

    async fn create_dir(&self, path: &str, _mode: FileMode) -> Result<()> {
        self.record(format!("mkdir {path}"));
        self.existing.lock().unwrap().insert(path.to_string());
        Ok(())
    }

    async fn open_write(
        &self,
        path: &str,
        _mode: FileMode,
    ) -> Result<Box<dyn AsyncWrite + Send + Unpin>> {
        self.record(format!("open {path}"));
        if self.fail_writes.load(Ordering::SeqCst) {
            Ok(Box::new(FailingWriter))
        } else {
            Ok(Box::new(tokio::io::sink()))
        }
    }

    async fn exec(&self, command: &str) -> Result<u32> {
        self.record(format!("exec {command}"));
        Ok(self.exec_status.load(Ordering::SeqCst) as u32)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.record("close".to_string());
        Ok(())
    }
}

/// Writer whose first write fails, for per-file stream errors.
struct FailingWriter;

impl AsyncWrite for FailingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Err(std::io::Error::other("stream error")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn connector_for(mock: Arc<MockChannel>, connect_count: Arc<AtomicUsize>) -> ChannelConnector {
    Box::new(move |_config| {
        let mock = Arc::clone(&mock);
        let connect_count = Arc::clone(&connect_count);
        Box::pin(async move {
            connect_count.fetch_add(1, Ordering::SeqCst);
            Ok(mock as Arc<dyn RemoteChannel>)
        })
    })
}

fn site_config() -> ShipConfig {
    ShipConfig {
        host: "deploy.example.com".into(),
        remote_path: "/site".into(),
        log_files: false,
        ..Default::default()
    }
}

fn uploader_with(mock: &Arc<MockChannel>, config: ShipConfig) -> (Uploader, Arc<AtomicUsize>) {
    let connect_count = Arc::new(AtomicUsize::new(0));
    let uploader = Uploader::with_connector(
        config,
        connector_for(Arc::clone(mock), Arc::clone(&connect_count)),
    )
    .unwrap();
    (uploader, connect_count)
}

#[tokio::test]
async fn test_single_file_chain_and_target() {
    let mock = MockChannel::with_existing(&["/site"]);
    let (mut uploader, _) = uploader_with(&mock, site_config());

    uploader
        .push(Artifact::new("a/b/c.js", &b"contents"[..]))
        .await
        .unwrap();
    let summary = uploader.finish().await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);
    assert!(summary.base_path_initialized);

    // Ancestors materialize parent before child, then the write opens.
    let mkdir_a = mock.index_of("mkdir /site/a").unwrap();
    let mkdir_ab = mock.index_of("mkdir /site/a/b").unwrap();
    let open = mock.index_of("open /site/a/b/c.js").unwrap();
    assert!(mkdir_a < mkdir_ab);
    assert!(mkdir_ab < open);

    // The base path itself is a cache hit after initialization: only the
    // two ancestors are ever created.
    assert!(mock.index_of("mkdir /site").is_none());
    assert_eq!(mock.count_with_prefix("mkdir"), 2);
}

#[tokio::test]
async fn test_shared_ancestor_created_at_most_once() {
    let mock = MockChannel::with_existing(&["/site"]);
    let (mut uploader, _) = uploader_with(&mock, site_config());

    for name in ["shared/one.js", "shared/two.js", "shared/three.js", "shared/deep/four.js"] {
        uploader
            .push(Artifact::new(name, &b"x"[..]))
            .await
            .unwrap();
    }
    let summary = uploader.finish().await.unwrap();

    assert_eq!(summary.completed, 4);
    // The shared parent is claimed once; later files are cache hits.
    assert_eq!(mock.count_with_prefix("exists /site/shared"), 2); // parent + deep child
    assert_eq!(mock.count_with_prefix("mkdir /site/shared"), 2);
    assert_eq!(
        mock.log_entries()
            .iter()
            .filter(|e| *e == "mkdir /site/shared")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_cached_directory_issues_no_calls() {
    let mock = MockChannel::with_existing(&["/site"]);
    let (mut uploader, _) = uploader_with(&mock, site_config());

    uploader
        .push(Artifact::new("lib/a.js", &b"a"[..]))
        .await
        .unwrap();
    let summary = uploader.finish().await.unwrap();
    assert_eq!(summary.completed, 1);

    let checks_after_first = mock
        .log_entries()
        .iter()
        .filter(|e| *e == "exists /site/lib")
        .count();
    assert_eq!(checks_after_first, 1);

    // Second run over the same tree within the run would be a cache hit;
    // simulate by pushing another file in the same directory.
    let (mut uploader2, _) = uploader_with(&mock, site_config());
    uploader2
        .push(Artifact::new("lib/a.js", &b"a"[..]))
        .await
        .unwrap();
    uploader2
        .push(Artifact::new("lib/b.js", &b"b"[..]))
        .await
        .unwrap();
    uploader2.finish().await.unwrap();

    // Across both files of the second run, /site/lib was checked once.
    let total_checks = mock
        .log_entries()
        .iter()
        .filter(|e| *e == "exists /site/lib")
        .count();
    assert_eq!(total_checks, 2); // one per run, never one per file
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_runs_once_and_first() {
    let mock = MockChannel::with_existing(&["/site"]);
    let mut config = site_config();
    config.clean_files = true;
    let (mut uploader, _) = uploader_with(&mock, config);

    for name in ["a/x.js", "b/y.js", "c/z.js"] {
        uploader
            .push(Artifact::new(name, &b"data"[..]))
            .await
            .unwrap();
    }
    let summary = uploader.finish().await.unwrap();

    assert_eq!(summary.completed, 3);
    assert!(summary.cleanup_done);

    // Exactly one clean command, regardless of file count.
    assert_eq!(mock.count_with_prefix("exec rm -rf /site**"), 1);

    // The clean strictly precedes every directory and upload call.
    let exec_idx = mock.index_of("exec rm -rf /site**").unwrap();
    let entries = mock.log_entries();
    for (idx, entry) in entries.iter().enumerate() {
        if entry.starts_with("mkdir") || entry.starts_with("open") {
            assert!(
                exec_idx < idx,
                "clean must precede {entry} (log: {entries:?})"
            );
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_selective_clean_command() {
    let mock = MockChannel::with_existing(&["/site"]);
    let mut config = site_config();
    config.clean_files = true;
    config.ignore_clean_path = Some("/uploads/".into());
    let (mut uploader, _) = uploader_with(&mock, config);

    uploader
        .push(Artifact::new("x.js", &b"data"[..]))
        .await
        .unwrap();
    uploader.finish().await.unwrap();

    assert_eq!(
        mock.count_with_prefix(
            "exec find /site -path \"/site/uploads\" -prune -o -type f -exec rm -rf {} \\;"
        ),
        1
    );
}

#[tokio::test]
async fn test_clean_failure_is_fatal_and_aborts_transport() {
    let mock = MockChannel::with_existing(&["/site"]);
    mock.exec_status.store(1, Ordering::SeqCst);
    let mut config = site_config();
    config.clean_files = true;
    let (mut uploader, _) = uploader_with(&mock, config);

    let err = uploader
        .push(Artifact::new("x.js", &b"data"[..]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CleanFailed { .. }));

    // The transport was aborted and no upload was attempted.
    assert_eq!(mock.count_with_prefix("close"), 1);
    assert_eq!(mock.count_with_prefix("open"), 0);
}

#[tokio::test]
async fn test_null_artifact_passes_through_untouched() {
    let mock = MockChannel::with_existing(&["/site"]);
    let (mut uploader, connect_count) = uploader_with(&mock, site_config());

    let artifact = Artifact::null("skipped/nothing.js");
    let emitted = uploader.push(artifact).await.unwrap();
    assert!(emitted.is_null());
    assert_eq!(
        emitted.relative_path.to_string_lossy(),
        "skipped/nothing.js"
    );

    let summary = uploader.finish().await.unwrap();
    assert_eq!(summary.completed, 0);
    assert!(!summary.base_path_initialized);
    assert_eq!(connect_count.load(Ordering::SeqCst), 0);
    assert!(mock.log_entries().is_empty());
}

#[tokio::test]
async fn test_base_path_created_when_absent() {
    let mock = MockChannel::with_existing(&[]);
    let (mut uploader, _) = uploader_with(&mock, site_config());

    uploader
        .push(Artifact::new("a/x.js", &b"data"[..]))
        .await
        .unwrap();
    uploader.finish().await.unwrap();

    let base_check = mock.index_of("exists /site").unwrap();
    let base_create = mock.index_of("mkdir /site").unwrap();
    assert!(base_check < base_create);
    // Every later call lands under the base.
    let first_child = mock.index_of("exists /site/a").unwrap();
    assert!(base_create < first_child);
}

#[tokio::test]
async fn test_session_established_once_for_many_files() {
    let mock = MockChannel::with_existing(&["/site"]);
    let (mut uploader, connect_count) = uploader_with(&mock, site_config());

    for i in 0..5 {
        uploader
            .push(Artifact::new(format!("f{i}.js"), &b"data"[..]))
            .await
            .unwrap();
    }
    uploader.finish().await.unwrap();

    assert_eq!(connect_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_per_file_error_does_not_end_session() {
    let mock = MockChannel::with_existing(&["/site"]);
    let (mut uploader, _) = uploader_with(&mock, site_config());

    uploader
        .push(Artifact::new("good/one.js", &b"ok"[..]))
        .await
        .unwrap();
    mock.fail_writes.store(true, Ordering::SeqCst);
    uploader
        .push(Artifact::new("bad/two.js", &b"boom"[..]))
        .await
        .unwrap();
    mock.fail_writes.store(false, Ordering::SeqCst);
    uploader
        .push(Artifact::new("good/three.js", &b"ok"[..]))
        .await
        .unwrap();

    let summary = uploader.finish().await.unwrap();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert!(summary.finished);
}

#[tokio::test]
async fn test_abrupt_closure_reported_exactly_once() {
    let mock = MockChannel::with_existing(&["/site"]);
    let (mut uploader, _) = uploader_with(&mock, site_config());

    uploader
        .push(Artifact::new("ok/first.js", &b"ok"[..]))
        .await
        .unwrap();

    // The transport dies mid-run: writes fail and the handle reports
    // closed before the finished flag is set.
    mock.fail_writes.store(true, Ordering::SeqCst);
    mock.closed.store(true, Ordering::SeqCst);

    uploader
        .push(Artifact::new("lost/second.js", &b"x"[..]))
        .await
        .unwrap();
    uploader
        .push(Artifact::new("lost/third.js", &b"x"[..]))
        .await
        .unwrap();

    let err = uploader.finish().await.unwrap_err();
    assert!(matches!(err, Error::AbruptClosure));
}

#[tokio::test]
async fn test_expected_close_is_not_abrupt() {
    let mock = MockChannel::with_existing(&["/site"]);
    let (mut uploader, _) = uploader_with(&mock, site_config());

    uploader
        .push(Artifact::new("a.js", &b"data"[..]))
        .await
        .unwrap();
    let summary = uploader.finish().await.unwrap();

    assert!(summary.finished);
    assert_eq!(mock.count_with_prefix("close"), 1);
}

#[tokio::test]
async fn test_close_callback_fires_once_on_finish() {
    let mock = MockChannel::with_existing(&["/site"]);
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_in_cb = Arc::clone(&fired);

    let (uploader, _) = uploader_with(&mock, site_config());
    let mut uploader = uploader.on_close(move || {
        fired_in_cb.fetch_add(1, Ordering::SeqCst);
    });

    uploader
        .push(Artifact::new("a.js", &b"data"[..]))
        .await
        .unwrap();
    uploader.finish().await.unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_artifact_reemitted_unchanged() {
    let mock = MockChannel::with_existing(&["/site"]);
    let (mut uploader, _) = uploader_with(&mock, site_config());

    let contents = bytes::Bytes::from_static(b"payload");
    let artifact = Artifact {
        relative_path: "dir/file.bin".into(),
        contents: Some(contents.clone()),
    };
    let emitted = uploader.push(artifact).await.unwrap();
    assert_eq!(emitted.relative_path.to_string_lossy(), "dir/file.bin");
    assert_eq!(emitted.contents.as_ref().unwrap(), &contents);

    uploader.finish().await.unwrap();
}

#[tokio::test]
async fn test_windows_remote_rewrites_wire_paths_only() {
    let mock = MockChannel::with_existing(&[]);
    let mut config = site_config();
    config.remote_platform = bship::config::RemotePlatform::from_name("windows");
    let (mut uploader, _) = uploader_with(&mock, config);

    uploader
        .push(Artifact::new("a/x.js", &b"data"[..]))
        .await
        .unwrap();
    uploader.finish().await.unwrap();

    // Directory round-trips use backslashes on the wire.
    assert!(mock.index_of("exists \\site").is_some());
    assert!(mock.index_of("mkdir \\site\\a").is_some());
    // The write target keeps the canonical form.
    assert!(mock.index_of("open /site/a/x.js").is_some());
}
