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

//! The upload pipeline stage.
//!
//! [`Uploader`] receives artifacts one at a time and re-emits them
//! unchanged after scheduling their remote write. The first non-null
//! artifact triggers connection establishment, base-path initialization
//! and the optional remote clean; every later artifact reuses the same
//! channel. [`Uploader::finish`] awaits the scheduled writes and tears
//! the session down.

pub mod clean;
pub mod dirs;
pub mod paths;
pub mod upload;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::future::{join_all, BoxFuture};
use tokio::task::JoinHandle;

use crate::config::ShipConfig;
use crate::error::{Error, Result};
use crate::ssh::{Client, ConnectionState, RemoteChannel, SftpChannel};

use dirs::DirCache;
use paths::{ancestor_chain, join_remote, normalize_base};
use upload::UploadOutcome;

/// One file flowing through the pipeline: a pipeline-relative path and
/// optional contents. A contents-less artifact passes through untouched.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub relative_path: PathBuf,
    pub contents: Option<Bytes>,
}

impl Artifact {
    pub fn new(relative_path: impl Into<PathBuf>, contents: impl Into<Bytes>) -> Self {
        Self {
            relative_path: relative_path.into(),
            contents: Some(contents.into()),
        }
    }

    pub fn null(relative_path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
            contents: None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.contents.is_none()
    }
}

/// Final accounting for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub completed: usize,
    pub failed: usize,
    pub cleanup_done: bool,
    pub base_path_initialized: bool,
    pub finished: bool,
}

/// Factory producing the run's remote channel. The production connector
/// dials SSH and opens the SFTP subsystem; tests substitute a recording
/// double.
pub type ChannelConnector =
    Box<dyn Fn(ShipConfig) -> BoxFuture<'static, Result<Arc<dyn RemoteChannel>>> + Send + Sync>;

fn ssh_connector() -> ChannelConnector {
    Box::new(|config: ShipConfig| {
        Box::pin(async move {
            let client = Client::connect(&config).await?;
            let sftp = client.open_sftp().await?;
            Ok(Arc::new(SftpChannel::new(client, sftp)) as Arc<dyn RemoteChannel>)
        })
    })
}

/// Shared per-run state: the single channel, the directory cache and the
/// summary flags. Passed by `Arc` to every scheduled upload; nothing here
/// is process-global.
struct SessionContext {
    config: ShipConfig,
    base_path: String,
    connector: ChannelConnector,
    channel: tokio::sync::OnceCell<Arc<dyn RemoteChannel>>,
    dirs: DirCache,
    state: Mutex<ConnectionState>,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cleanup_done: AtomicBool,
    base_path_initialized: AtomicBool,
    finished: AtomicBool,
    abrupt_reported: AtomicBool,
    session_failed: AtomicBool,
    fatal: Mutex<Option<Error>>,
}

impl SessionContext {
    fn new(config: ShipConfig, connector: ChannelConnector) -> Self {
        let base_path = normalize_base(&config.remote_path);
        Self {
            config,
            base_path,
            connector,
            channel: tokio::sync::OnceCell::new(),
            dirs: DirCache::default(),
            state: Mutex::new(ConnectionState::Disconnected),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cleanup_done: AtomicBool::new(false),
            base_path_initialized: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            abrupt_reported: AtomicBool::new(false),
            session_failed: AtomicBool::new(false),
            fatal: Mutex::new(None),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.lock().unwrap() = next;
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn record_fatal(&self, err: Error) {
        let mut fatal = self.fatal.lock().unwrap();
        if fatal.is_none() {
            *fatal = Some(err);
        }
        drop(fatal);
        self.session_failed.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Errored);
    }

    fn fatal_recorded(&self) -> bool {
        self.session_failed.load(Ordering::SeqCst)
    }

    fn take_fatal(&self) -> Option<Error> {
        self.fatal.lock().unwrap().take()
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Classify a channel that died mid-run. Reported exactly once per
    /// run; the expected end-of-run close is suppressed by the finished
    /// flag being set first.
    fn note_channel_health(&self, channel: &dyn RemoteChannel) {
        if channel.is_closed()
            && !self.is_finished()
            && !self.abrupt_reported.swap(true, Ordering::SeqCst)
        {
            tracing::error!("session closed abruptly before the run finished");
            self.record_fatal(Error::AbruptClosure);
        }
    }

    /// Get the run's channel, establishing it on first use.
    ///
    /// Callers that arrive while the first establishment is in flight
    /// wait on the cell and receive the same channel. A failed
    /// establishment poisons the run; there is no retry.
    async fn acquire(&self) -> Result<Arc<dyn RemoteChannel>> {
        if self.fatal_recorded() {
            return Err(Error::SessionFailed);
        }

        let result = self
            .channel
            .get_or_try_init(|| async {
                self.set_state(ConnectionState::Connecting);
                let channel = (self.connector)(self.config.clone()).await?;
                self.initialize(channel.as_ref()).await?;
                self.set_state(ConnectionState::Ready);
                Ok(channel)
            })
            .await;

        match result {
            Ok(channel) => Ok(Arc::clone(channel)),
            Err(e) => {
                // The first affected caller reports the real error; the
                // run is marked failed so nobody retries the connect.
                self.session_failed.store(true, Ordering::SeqCst);
                self.set_state(ConnectionState::Errored);
                Err(e)
            }
        }
    }

    /// One-time base-path bootstrap and optional clean. Runs inside the
    /// channel cell's initialization, strictly before any directory
    /// materialization or upload.
    async fn initialize(&self, channel: &dyn RemoteChannel) -> Result<()> {
        let wire_base = self.config.remote_platform.wire_path(&self.base_path);
        match channel.exists(&wire_base).await {
            Ok(true) => {
                tracing::debug!("remote base path present: {}", self.base_path);
            }
            Ok(false) => {
                channel
                    .create_dir(&wire_base, crate::ssh::FileMode::DIR)
                    .await?;
                tracing::info!("remote base path created: {}", self.base_path);
            }
            Err(e) => return Err(e),
        }
        self.dirs.insert(&self.base_path);
        self.base_path_initialized.store(true, Ordering::SeqCst);

        if self.config.clean_files && self.config.remote_platform.is_unix() {
            match clean::run_clean(
                channel,
                &self.base_path,
                self.config.ignore_clean_path.as_deref(),
            )
            .await
            {
                Ok(()) => {
                    self.cleanup_done.store(true, Ordering::SeqCst);
                }
                Err(e) => {
                    // Abort the transport; continuing against a
                    // half-cleaned target is not an option.
                    if let Err(close_err) = channel.close().await {
                        tracing::debug!("teardown after failed clean: {}", close_err);
                    }
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            cleanup_done: self.cleanup_done.load(Ordering::SeqCst),
            base_path_initialized: self.base_path_initialized.load(Ordering::SeqCst),
            finished: self.is_finished(),
        }
    }
}

/// The pipeline stage. Feed artifacts with [`push`], then call
/// [`finish`] exactly once when the input sequence ends.
///
/// [`push`]: Uploader::push
/// [`finish`]: Uploader::finish
pub struct Uploader {
    ctx: Arc<SessionContext>,
    handles: Vec<JoinHandle<UploadOutcome>>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("handles", &self.handles.len())
            .field("on_close", &self.on_close.is_some())
            .finish_non_exhaustive()
    }
}

impl Uploader {
    /// Build an uploader that connects over SSH per `config`.
    pub fn new(config: ShipConfig) -> Result<Self> {
        Self::with_connector(config, ssh_connector())
    }

    /// Build an uploader with a custom channel factory.
    pub fn with_connector(config: ShipConfig, connector: ChannelConnector) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ctx: Arc::new(SessionContext::new(config, connector)),
            handles: Vec::new(),
            on_close: None,
        })
    }

    /// Register a callback invoked once after the transport finally
    /// closes.
    pub fn on_close(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(callback));
        self
    }

    /// Current connection lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.ctx.state()
    }

    /// Schedule one artifact's remote write and re-emit the artifact.
    ///
    /// The artifact is returned as soon as the write is scheduled, not
    /// when it completes; downstream observes the file before its remote
    /// write is durable. Null artifacts are re-emitted untouched without
    /// any remote work. Session-fatal conditions (connect, auth, clean)
    /// surface here on the first affected push.
    pub async fn push(&mut self, artifact: Artifact) -> Result<Artifact> {
        if artifact.is_null() {
            return Ok(artifact);
        }

        if self.ctx.fatal_recorded() {
            tracing::warn!(
                "session already failed, skipping {}",
                artifact.relative_path.display()
            );
            return Ok(artifact);
        }

        let channel = self.ctx.acquire().await?;

        let Some(contents) = artifact.contents.clone() else {
            return Ok(artifact);
        };
        let relative_path = artifact.relative_path.clone();
        let remote_path = join_remote(&self.ctx.base_path, &relative_path);
        let ctx = Arc::clone(&self.ctx);

        let handle = tokio::spawn(async move {
            let chain = ancestor_chain(&remote_path, &ctx.base_path, &ctx.dirs);
            dirs::materialize(
                channel.as_ref(),
                &ctx.dirs,
                chain,
                ctx.config.remote_platform,
            )
            .await;

            let outcome = upload::upload(
                channel.as_ref(),
                &relative_path,
                &remote_path,
                &contents,
                ctx.config.log_files,
            )
            .await;

            if outcome.is_success() {
                ctx.completed.fetch_add(1, Ordering::SeqCst);
            } else {
                ctx.failed.fetch_add(1, Ordering::SeqCst);
                ctx.note_channel_health(channel.as_ref());
            }
            outcome
        });
        self.handles.push(handle);

        Ok(artifact)
    }

    /// Finalize the run: await every scheduled write, log the summary,
    /// close the SFTP channel and the transport, and fire the close
    /// callback. Returns the per-run accounting, or the run's fatal
    /// error if one was recorded.
    pub async fn finish(mut self) -> Result<SessionSummary> {
        let outcomes = join_all(std::mem::take(&mut self.handles)).await;
        for result in outcomes {
            if let Err(join_err) = result {
                tracing::warn!("upload task aborted: {}", join_err);
                self.ctx.failed.fetch_add(1, Ordering::SeqCst);
            }
        }

        let completed = self.ctx.completed.load(Ordering::SeqCst);
        if completed > 0 {
            tracing::info!("{} file(s) uploaded successfully", completed);
        } else {
            tracing::info!("no files uploaded");
        }

        // An error-closure observed now still predates the expected
        // teardown.
        if let Some(channel) = self.ctx.channel.get() {
            self.ctx.note_channel_health(channel.as_ref());
        }

        self.ctx.finished.store(true, Ordering::SeqCst);

        if let Some(channel) = self.ctx.channel.get() {
            if let Err(e) = channel.close().await {
                tracing::debug!("session teardown reported: {}", e);
            }
            if !matches!(self.ctx.state(), ConnectionState::Errored) {
                self.ctx.set_state(ConnectionState::Closed);
            }
        }

        if let Some(callback) = self.on_close.take() {
            callback();
        }

        if let Some(fatal) = self.ctx.take_fatal() {
            return Err(fatal);
        }
        if self.ctx.fatal_recorded() {
            return Err(Error::SessionFailed);
        }
        Ok(self.ctx.summary())
    }
}
