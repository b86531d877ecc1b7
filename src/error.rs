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

//! Error types for session establishment and transfer operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while connecting, cleaning or uploading.
///
/// Session-level variants (missing configuration, credential resolution,
/// connect/auth failures, abrupt closure, clean failures) abort the run.
/// Per-directory and per-file failures are handled at their call sites and
/// never surface through this type as run-enders.
#[derive(Debug, Error)]
pub enum Error {
    /// `host` was absent from both the configuration file and the CLI.
    #[error("`host` is required")]
    HostMissing,

    /// The named profile does not exist in the credentials file.
    #[error("could not find auth profile '{profile}' in {path:?}")]
    ProfileNotFound { profile: String, path: PathBuf },

    /// The credentials file exists but is not valid JSON.
    #[error("failed to parse credentials file {path:?}: {reason}")]
    ProfileInvalid { path: PathBuf, reason: String },

    /// No private key material could be resolved from contents or disk.
    #[error("cannot find a private key, searched: {searched}")]
    KeyNotFound { searched: String },

    /// Key material was found but could not be decoded.
    #[error("invalid private key: {0}")]
    KeyInvalid(#[source] russh::keys::Error),

    /// The server rejected the configured credentials.
    #[error("authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// The SSH agent socket could not be reached.
    #[error("ssh agent is not available")]
    AgentUnavailable,

    /// The SSH agent answered but offered no identities.
    #[error("ssh agent holds no identities")]
    AgentNoIdentities,

    /// The transport did not become ready within the configured timeout.
    #[error("connection to {host}:{port} timed out after {timeout:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    /// The remote clean command failed; a half-cleaned target is worse
    /// than no upload, so the run is aborted.
    #[error("remote clean of '{path}' failed: {reason}")]
    CleanFailed { path: String, reason: String },

    /// A remote command finished without reporting an exit status.
    #[error("remote command exited without status")]
    CommandDidntExit,

    /// The transport or SFTP channel closed before the run finished.
    #[error("session closed abruptly before the run finished")]
    AbruptClosure,

    /// A previous fatal error already ended the session; connect failures
    /// are never retried within a run.
    #[error("session previously failed, not retrying")]
    SessionFailed,

    #[error("ssh error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("sftp error: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error must abort the whole run.
    ///
    /// Everything in this enum except the wrapped transport/sftp/io
    /// variants is session-fatal by construction; the wrapped ones are
    /// fatal only when they strike outside a per-directory or per-file
    /// scope, which the call sites decide.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, Error::Ssh(_) | Error::Sftp(_) | Error::Io(_))
    }
}
