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

//! The file-transfer channel the pipeline operates on.

use std::fmt;

use async_trait::async_trait;
use russh_sftp::client::fs::Metadata;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::AsyncWrite;

use super::connection::Client;
use crate::error::Result;

/// Typed permission bits for remote files and directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(u32);

impl FileMode {
    /// Mode applied to every directory this tool creates.
    pub const DIR: FileMode = FileMode(0o755);
    /// Mode applied to every uploaded file.
    pub const FILE: FileMode = FileMode(0o666);

    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0{:o}", self.0)
    }
}

/// Operations the pipeline needs from the remote side.
///
/// One implementation rides the run's SFTP sub-channel; tests substitute a
/// recording double to observe call counts and ordering.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Whether `path` exists on the remote.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create a single directory with the given mode.
    async fn create_dir(&self, path: &str, mode: FileMode) -> Result<()>;

    /// Open `path` for writing with truncate semantics and the given mode.
    async fn open_write(&self, path: &str, mode: FileMode)
        -> Result<Box<dyn AsyncWrite + Send + Unpin>>;

    /// Run a shell command on the transport, returning its exit status.
    async fn exec(&self, command: &str) -> Result<u32>;

    /// Whether the underlying transport has gone away.
    fn is_closed(&self) -> bool;

    /// Expected teardown: end the sub-channel, then the transport.
    async fn close(&self) -> Result<()>;
}

/// Production [`RemoteChannel`] over russh-sftp.
pub struct SftpChannel {
    client: Client,
    sftp: SftpSession,
}

impl SftpChannel {
    pub fn new(client: Client, sftp: SftpSession) -> Self {
        Self { client, sftp }
    }

    fn permissions(mode: FileMode) -> Metadata {
        Metadata {
            size: None,
            uid: None,
            user: None,
            gid: None,
            group: None,
            permissions: Some(mode.bits()),
            atime: None,
            mtime: None,
        }
    }
}

#[async_trait]
impl RemoteChannel for SftpChannel {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.sftp.try_exists(path).await?)
    }

    async fn create_dir(&self, path: &str, mode: FileMode) -> Result<()> {
        self.sftp.create_dir(path).await?;
        self.sftp
            .set_metadata(path, Self::permissions(mode))
            .await?;
        Ok(())
    }

    async fn open_write(
        &self,
        path: &str,
        mode: FileMode,
    ) -> Result<Box<dyn AsyncWrite + Send + Unpin>> {
        let file = self
            .sftp
            .open_with_flags(
                path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await?;
        self.sftp
            .set_metadata(path, Self::permissions(mode))
            .await?;
        Ok(Box::new(file))
    }

    async fn exec(&self, command: &str) -> Result<u32> {
        self.client.execute(command).await
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.sftp.close().await {
            tracing::debug!("sftp channel close reported: {}", e);
        }
        self.client.disconnect().await
    }
}
