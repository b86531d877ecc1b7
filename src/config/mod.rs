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

//! Configuration types for a shipping run.

mod loader;
mod utils;

pub use utils::expand_tilde;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Remote platform family, derived from the `remote_platform` option.
///
/// Anything containing "win" (case-insensitive) selects Windows-style
/// separator handling for wire paths; everything else is treated as unix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RemotePlatform {
    #[default]
    Unix,
    Windows,
}

impl RemotePlatform {
    pub fn from_name(name: &str) -> Self {
        if name.to_lowercase().contains("win") {
            RemotePlatform::Windows
        } else {
            RemotePlatform::Unix
        }
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, RemotePlatform::Unix)
    }

    /// Rewrite a canonical forward-slash path for the remote side.
    /// Cache keys always stay in the canonical slash form; only the
    /// strings sent over the wire are rewritten.
    pub fn wire_path(&self, path: &str) -> String {
        match self {
            RemotePlatform::Unix => path.to_string(),
            RemotePlatform::Windows => path.replace('/', "\\"),
        }
    }
}

impl From<String> for RemotePlatform {
    fn from(value: String) -> Self {
        RemotePlatform::from_name(&value)
    }
}

impl From<RemotePlatform> for String {
    fn from(value: RemotePlatform) -> Self {
        match value {
            RemotePlatform::Unix => "unix".to_string(),
            RemotePlatform::Windows => "windows".to_string(),
        }
    }
}

/// Private-key configuration.
///
/// Supports two formats:
/// - Plain string: a key file path
/// - Structured form with optional in-memory contents, passphrase and a
///   search-location list (string or list of strings)
///
/// Uses `#[serde(untagged)]`; the structured variant must be listed first
/// for serde to try matching the object format before the string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyConfig {
    Detailed {
        #[serde(default)]
        contents: Option<String>,
        #[serde(default)]
        passphrase: Option<String>,
        #[serde(default)]
        location: Option<KeyLocations>,
    },
    Path(String),
}

/// One search location or several, in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyLocations {
    One(String),
    Many(Vec<String>),
}

impl KeyLocations {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            KeyLocations::One(loc) => vec![loc],
            KeyLocations::Many(locs) => locs,
        }
    }
}

/// Full configuration for one shipping run. Immutable once resolved.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShipConfig {
    /// Remote host to connect to. Required.
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_user")]
    pub user: String,

    /// Password authentication. Takes priority over every other mode.
    #[serde(default)]
    pub pass: Option<String>,

    /// Use the SSH agent when no password is set.
    #[serde(default)]
    pub agent: bool,

    #[serde(default)]
    pub key: Option<KeyConfig>,

    /// Key passphrase, when not given inside `key`.
    #[serde(default)]
    pub passphrase: Option<String>,

    /// In-memory key material, when not given inside `key`.
    #[serde(default)]
    pub key_contents: Option<String>,

    /// Remote directory under which every upload lands.
    #[serde(default = "default_remote_path")]
    pub remote_path: String,

    #[serde(default)]
    pub remote_platform: RemotePlatform,

    /// Purge the remote target directory before the first upload.
    #[serde(default)]
    pub clean_files: bool,

    /// Exclusion path for a selective clean, relative to `remote_path`.
    #[serde(default)]
    pub ignore_clean_path: Option<String>,

    /// Connect timeout in seconds. No timeout when absent.
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Log a human-readable line per uploaded file.
    #[serde(default = "default_true")]
    pub log_files: bool,

    /// Profile name inside the credentials file.
    #[serde(default)]
    pub auth: Option<String>,

    /// Credentials file path, defaults to `.sftppass` in the working dir.
    #[serde(default)]
    pub auth_file: Option<PathBuf>,
}

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    "root".to_string()
}

fn default_remote_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

impl ShipConfig {
    /// Check the run-critical fields. `host` is the only option with no
    /// usable default.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::HostMissing);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: ShipConfig = serde_yaml::from_str("host: example.com").unwrap();
        assert_eq!(config.host, "example.com");
        assert_eq!(config.port, 22);
        assert_eq!(config.user, "root");
        assert_eq!(config.remote_path, "/");
        assert_eq!(config.remote_platform, RemotePlatform::Unix);
        assert!(config.log_files);
        assert!(!config.clean_files);
    }

    #[test]
    fn test_missing_host_rejected() {
        let config = ShipConfig::default();
        assert!(matches!(config.validate(), Err(Error::HostMissing)));
    }

    #[test]
    fn test_remote_platform_from_name() {
        assert_eq!(RemotePlatform::from_name("unix"), RemotePlatform::Unix);
        assert_eq!(RemotePlatform::from_name("linux"), RemotePlatform::Unix);
        assert_eq!(
            RemotePlatform::from_name("windows"),
            RemotePlatform::Windows
        );
        assert_eq!(RemotePlatform::from_name("Win32"), RemotePlatform::Windows);
        assert_eq!(RemotePlatform::from_name("darwin"), RemotePlatform::Unix);
    }

    #[test]
    fn test_wire_path_rewrite() {
        let win = RemotePlatform::Windows;
        assert_eq!(win.wire_path("/srv/www/app"), "\\srv\\www\\app");
        let unix = RemotePlatform::Unix;
        assert_eq!(unix.wire_path("/srv/www/app"), "/srv/www/app");
    }

    #[test]
    fn test_key_config_string_form() {
        let config: ShipConfig = serde_yaml::from_str("host: h\nkey: ~/.ssh/deploy_key").unwrap();
        match config.key {
            Some(KeyConfig::Path(p)) => assert_eq!(p, "~/.ssh/deploy_key"),
            other => panic!("expected path form, got {other:?}"),
        }
    }

    #[test]
    fn test_key_config_structured_form() {
        let yaml = r#"
host: h
key:
  passphrase: secret
  location:
    - ~/.ssh/a
    - ~/.ssh/b
"#;
        let config: ShipConfig = serde_yaml::from_str(yaml).unwrap();
        match config.key {
            Some(KeyConfig::Detailed {
                passphrase,
                location,
                contents,
            }) => {
                assert_eq!(passphrase.as_deref(), Some("secret"));
                assert!(contents.is_none());
                assert_eq!(
                    location.unwrap().into_vec(),
                    vec!["~/.ssh/a".to_string(), "~/.ssh/b".to_string()]
                );
            }
            other => panic!("expected structured form, got {other:?}"),
        }
    }
}
