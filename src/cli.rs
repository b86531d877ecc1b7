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

use clap::Parser;
use std::path::PathBuf;

use crate::config::ShipConfig;

#[derive(Parser, Debug)]
#[command(
    name = "bship",
    version,
    about = "Backend.AI SHIP - Streaming build-artifact upload to remote hosts over SFTP",
    long_about = "bship ships locally produced build artifacts to a remote host over SFTP.\nIt reuses one authenticated SSH connection for the whole run, lazily creates the\nrequired remote directory tree, and can purge the remote target directory before\nthe first upload. Authentication supports passwords, private keys (with\npassphrase support) and the SSH agent.",
    after_help = "EXAMPLES:\n  Ship a build directory:       bship -H deploy.example.com --remote-path /srv/www ./dist\n  Use a config file:            bship --config ship.yaml ./dist\n  Clean the target first:       bship -H web1 --remote-path /srv/www --clean ./dist\n  Key with passphrase:          bship -H web1 -i ~/.ssh/deploy_key ./dist\n\nDeveloped and maintained as part of the Backend.AI project."
)]
pub struct Cli {
    #[arg(help = "Local file, directory or glob pattern to ship")]
    pub source: PathBuf,

    #[arg(short = 'H', long, help = "Remote host to upload to")]
    pub host: Option<String>,

    #[arg(short = 'p', long, help = "SSH port [default: 22]")]
    pub port: Option<u16>,

    #[arg(short = 'u', long, help = "Username for the SSH connection [default: root]")]
    pub user: Option<String>,

    #[arg(
        short = 'i',
        long,
        help = "SSH private key file path\nFalls back to default keys (~/.ssh/id_rsa, ~/.ssh/id_dsa) if not specified"
    )]
    pub identity: Option<PathBuf>,

    #[arg(
        short = 'A',
        long,
        help = "Use SSH agent for authentication (Unix/Linux/macOS only)"
    )]
    pub use_agent: bool,

    #[arg(
        short = 'r',
        long,
        help = "Remote directory under which uploads land [default: /]"
    )]
    pub remote_path: Option<String>,

    #[arg(
        long,
        help = "Remote platform name; any value containing 'win' switches separator handling [default: unix]"
    )]
    pub remote_platform: Option<String>,

    #[arg(long, help = "Purge the remote target directory before the first upload")]
    pub clean: bool,

    #[arg(
        long,
        help = "Path to prune during a clean (relative to the remote path); switches to a selective, files-only delete"
    )]
    pub ignore_clean_path: Option<String>,

    #[arg(long, help = "Connect timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Do not log a line per uploaded file")]
    pub quiet_files: bool,

    #[arg(
        short = 'a',
        long,
        help = "Credentials profile name to load from the credentials file"
    )]
    pub auth: Option<String>,

    #[arg(
        long,
        default_value = "bship.yaml",
        help = "Configuration file path [default: ./bship.yaml]"
    )]
    pub config: PathBuf,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}

impl Cli {
    /// Overlay the CLI flags onto a loaded configuration. Flags win over
    /// file values; unset flags leave the file values in place.
    pub fn apply_to(&self, config: &mut ShipConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(user) = &self.user {
            config.user = user.clone();
        }
        if let Some(identity) = &self.identity {
            config.key = Some(crate::config::KeyConfig::Path(
                identity.to_string_lossy().into_owned(),
            ));
        }
        if self.use_agent {
            config.agent = true;
        }
        if let Some(remote_path) = &self.remote_path {
            config.remote_path = remote_path.clone();
        }
        if let Some(platform) = &self.remote_platform {
            config.remote_platform = crate::config::RemotePlatform::from_name(platform);
        }
        if self.clean {
            config.clean_files = true;
        }
        if let Some(ignore) = &self.ignore_clean_path {
            config.ignore_clean_path = Some(ignore.clone());
        }
        if let Some(timeout) = self.timeout {
            config.timeout = Some(timeout);
        }
        if self.quiet_files {
            config.log_files = false;
        }
        if let Some(auth) = &self.auth {
            config.auth = Some(auth.clone());
        }
    }
}
