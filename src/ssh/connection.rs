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

//! SSH connection establishment and the run's single transport handle.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle, Handler};
use russh::Disconnect;
use russh_sftp::client::SftpSession;

use super::authentication::{authenticate, resolve_auth};
use crate::config::ShipConfig;
use crate::error::{Error, Result};

/// The single SSH transport of a run.
///
/// Connected and authenticated once, then shared by reference across every
/// file operation. Only the session context that created it may disconnect.
#[derive(Clone)]
pub struct Client {
    handle: Arc<Handle<ClientHandler>>,
    host: String,
    port: u16,
    username: String,
}

impl Client {
    /// Open and authenticate the transport described by `config`.
    ///
    /// Credential material is resolved before the connection attempt; any
    /// failure here (resolution, connect, timeout, auth rejection) is
    /// fatal for the run and is never retried.
    pub async fn connect(config: &ShipConfig) -> Result<Self> {
        let auth = resolve_auth(config)?;
        tracing::info!("authenticating with {}", auth.label());

        let ssh_config = Arc::new(client::Config::default());
        let handler = ClientHandler;
        let address = (config.host.as_str(), config.port);

        let connect_future = client::connect(ssh_config, address, handler);
        let mut handle = match config.timeout {
            Some(secs) => {
                let timeout = Duration::from_secs(secs);
                tokio::time::timeout(timeout, connect_future)
                    .await
                    .map_err(|_| Error::ConnectTimeout {
                        host: config.host.clone(),
                        port: config.port,
                        timeout,
                    })??
            }
            None => connect_future.await?,
        };

        authenticate(&mut handle, &config.user, auth).await?;
        tracing::info!("connection ready");

        Ok(Self {
            handle: Arc::new(handle),
            host: config.host.clone(),
            port: config.port,
            username: config.user.clone(),
        })
    }

    /// Open the SFTP sub-channel on this transport.
    pub async fn open_sftp(&self) -> Result<SftpSession> {
        let channel = self.handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        tracing::debug!("sftp subsystem ready on {}:{}", self.host, self.port);
        Ok(sftp)
    }

    /// Execute a remote command and return its exit status.
    ///
    /// Used for the pre-upload clean step; each invocation is a fresh
    /// shell context.
    pub async fn execute(&self, command: &str) -> Result<u32> {
        tracing::debug!("executing remote command: {}", command);

        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                // The exit code can arrive before the channel drains, so
                // keep consuming messages until the channel ends.
                russh::ChannelMsg::ExitStatus { exit_status: status } => {
                    exit_status = Some(status);
                }
                _ => {}
            }
        }

        exit_status.ok_or(Error::CommandDidntExit)
    }

    /// Disconnect from the remote host.
    pub async fn disconnect(&self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "")
            .await
            .map_err(Error::Ssh)
    }

    /// Whether the underlying transport has gone away.
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("handle", &"Handle<ClientHandler>")
            .finish()
    }
}

/// Server-key handler for the deploy transport.
///
/// Host keys are accepted unconditionally; target hosts are operator
/// controlled build infrastructure and known_hosts management is outside
/// this tool's scope.
#[derive(Debug, Clone)]
pub struct ClientHandler;

impl Handler for ClientHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}
