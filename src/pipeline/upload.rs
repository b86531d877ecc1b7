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

//! Per-file streaming upload.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::error::Error;
use crate::ssh::{FileMode, RemoteChannel};
use crate::utils::fs::format_bytes;

/// Write granularity for one remote file. Progress is reported at this
/// granularity, which makes the cumulative counter an approximation of
/// what the remote has acknowledged, not exact transfer telemetry.
pub(crate) const UPLOAD_CHUNK_SIZE: usize = 16 * 1024;

/// Terminal record of one file's upload.
#[derive(Debug)]
pub struct UploadOutcome {
    pub relative_path: PathBuf,
    pub remote_path: String,
    pub bytes_written: u64,
    pub error: Option<Error>,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Stream one file's contents to its resolved remote path.
///
/// The target is opened with truncate semantics and the fixed file mode.
/// A stream error becomes this file's outcome; the session continues.
pub(crate) async fn upload(
    channel: &dyn RemoteChannel,
    relative_path: &Path,
    remote_path: &str,
    contents: &Bytes,
    log_files: bool,
) -> UploadOutcome {
    let (bytes_written, error) = stream_contents(channel, remote_path, contents).await;

    match &error {
        None => {
            if log_files {
                tracing::info!(
                    "uploaded: {} => {}",
                    relative_path.display(),
                    remote_path
                );
            }
        }
        Some(e) => {
            tracing::warn!("upload of {} failed: {}", remote_path, e);
        }
    }

    UploadOutcome {
        relative_path: relative_path.to_path_buf(),
        remote_path: remote_path.to_string(),
        bytes_written,
        error,
    }
}

async fn stream_contents(
    channel: &dyn RemoteChannel,
    remote_path: &str,
    contents: &Bytes,
) -> (u64, Option<Error>) {
    let mut writer = match channel.open_write(remote_path, FileMode::FILE).await {
        Ok(writer) => writer,
        Err(e) => return (0, Some(e)),
    };

    let mut written: u64 = 0;
    for chunk in contents.chunks(UPLOAD_CHUNK_SIZE) {
        if let Err(e) = writer.write_all(chunk).await {
            return (written, Some(Error::Io(e)));
        }
        if let Err(e) = writer.flush().await {
            return (written, Some(Error::Io(e)));
        }
        written += chunk.len() as u64;
        tracing::debug!("{}: {} sent", remote_path, format_bytes(written));
    }

    if let Err(e) = writer.shutdown().await {
        return (written, Some(Error::Io(e)));
    }

    (written, None)
}
