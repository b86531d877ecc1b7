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

//! SSH transport and SFTP channel handling, powered by russh.
//!
//! [`Client`] owns the single authenticated transport of a run.
//! [`RemoteChannel`] is the file-transfer seam the pipeline operates on;
//! [`SftpChannel`] is its production implementation.

pub mod authentication;
pub mod channel;
pub mod connection;

pub use authentication::{resolve_auth, AuthMethod};
pub use channel::{FileMode, RemoteChannel, SftpChannel};
pub use connection::Client;

/// Lifecycle of the run's single connection handle.
///
/// `Ready` is reached at most once per run; every file operation after the
/// first reuses the same handle. Only the session that created the handle
/// moves it to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    Closed,
    Errored,
}

impl ConnectionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Errored)
    }
}
