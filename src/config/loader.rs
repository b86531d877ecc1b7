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

//! Configuration and credentials loading.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;

use super::utils::expand_tilde;
use super::{KeyConfig, ShipConfig};
use crate::error::Error;

/// One profile in the credentials file. Either `"user:pass"` shorthand or
/// a structured entry whose fields override the run configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AuthProfile {
    Detailed {
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        pass: Option<String>,
        #[serde(default)]
        key: Option<KeyConfig>,
        #[serde(default)]
        passphrase: Option<String>,
        #[serde(default)]
        key_contents: Option<String>,
    },
    Shorthand(String),
}

impl ShipConfig {
    /// Load a run configuration from a YAML file. A missing file yields
    /// the defaults so CLI flags alone can drive a run.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        if !expanded_path.exists() {
            tracing::debug!(
                "config file not found at {:?}, using defaults",
                expanded_path
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&expanded_path).await.with_context(|| {
            format!(
                "Failed to read configuration file at {}",
                expanded_path.display()
            )
        })?;

        let config: ShipConfig = serde_yaml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse YAML configuration file at {}",
                expanded_path.display()
            )
        })?;

        Ok(config)
    }

    /// Pre-populate credentials from the named profile of the credentials
    /// file (JSON, `.sftppass` by default). No-op when no profile is
    /// configured or the file does not exist; a configured profile that
    /// cannot be found is fatal.
    pub async fn apply_auth_profile(&mut self) -> crate::error::Result<()> {
        let Some(profile_name) = self.auth.clone() else {
            return Ok(());
        };

        let path = self
            .auth_file
            .clone()
            .unwrap_or_else(|| ".sftppass".into());
        let path = expand_tilde(&path);
        if !path.exists() {
            return Err(Error::ProfileNotFound {
                profile: profile_name,
                path,
            });
        }

        let content = fs::read_to_string(&path).await.map_err(Error::Io)?;
        let profiles: HashMap<String, AuthProfile> =
            serde_json::from_str(&content).map_err(|e| Error::ProfileInvalid {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let profile = profiles
            .get(&profile_name)
            .cloned()
            .ok_or_else(|| Error::ProfileNotFound {
                profile: profile_name.clone(),
                path: path.clone(),
            })?;

        match profile {
            AuthProfile::Shorthand(value) => {
                // "user:pass" shorthand, split on the first colon.
                match value.split_once(':') {
                    Some((user, pass)) => {
                        self.user = user.to_string();
                        self.pass = Some(pass.to_string());
                    }
                    None => {
                        return Err(Error::ProfileInvalid {
                            path,
                            reason: format!(
                                "profile '{profile_name}' is a bare string without a ':' separator"
                            ),
                        });
                    }
                }
            }
            AuthProfile::Detailed {
                user,
                pass,
                key,
                passphrase,
                key_contents,
            } => {
                if let Some(user) = user {
                    self.user = user;
                }
                if let Some(pass) = pass {
                    self.pass = Some(pass);
                }
                if let Some(key) = key {
                    self.key = Some(key);
                }
                if let Some(passphrase) = passphrase {
                    self.passphrase = Some(passphrase);
                }
                if let Some(key_contents) = key_contents {
                    self.key_contents = Some(key_contents);
                }
            }
        }

        tracing::debug!("applied credentials profile '{}'", profile_name);
        Ok(())
    }
}
