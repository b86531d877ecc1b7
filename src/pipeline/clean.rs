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

//! One-time remote cleanup of the upload target.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::ssh::RemoteChannel;

/// Wait after the delete command before declaring the target clean; some
/// remote filesystems apply deletes with a delay.
pub(crate) const CLEAN_SETTLE: Duration = Duration::from_millis(1500);

/// Build the remote delete command.
///
/// Without an exclusion the whole base is removed. With one, a find walk
/// prunes the excluded path and removes only files, leaving the directory
/// skeleton in place.
pub(crate) fn clean_command(base: &str, ignore: Option<&str>) -> String {
    match ignore {
        None => format!("rm -rf {base}**"),
        Some(ignore) => {
            let ignore = ignore.trim_end_matches('/');
            format!("find {base} -path \"{base}{ignore}\" -prune -o -type f -exec rm -rf {{}} \\;")
        }
    }
}

/// Purge the remote base path, then wait for the settle interval.
///
/// Any failure here is fatal for the run; the caller aborts the
/// transport. A half-cleaned target is worse than no upload.
pub(crate) async fn run_clean(
    channel: &dyn RemoteChannel,
    base: &str,
    ignore: Option<&str>,
) -> Result<()> {
    let command = clean_command(base, ignore);
    tracing::debug!("cleaning remote target: {}", command);

    match channel.exec(&command).await {
        Ok(0) => {}
        Ok(status) => {
            return Err(Error::CleanFailed {
                path: base.to_string(),
                reason: format!("exit status {status}"),
            });
        }
        Err(e) => {
            return Err(Error::CleanFailed {
                path: base.to_string(),
                reason: e.to_string(),
            });
        }
    }

    tokio::time::sleep(CLEAN_SETTLE).await;
    tracing::info!("cleaned remote target: {}", base);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_command_full() {
        assert_eq!(clean_command("/srv/www", None), "rm -rf /srv/www**");
    }

    #[test]
    fn test_clean_command_selective() {
        let command = clean_command("/srv/www", Some("/uploads/"));
        assert_eq!(
            command,
            "find /srv/www -path \"/srv/www/uploads\" -prune -o -type f -exec rm -rf {} \\;"
        );
    }

    #[test]
    fn test_clean_command_selective_strips_trailing_slash_only() {
        let command = clean_command("/srv/www", Some("/keep"));
        assert!(command.contains("\"/srv/www/keep\""));
    }
}
