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

//! Credential resolution and SSH authentication.
//!
//! Resolution order: an explicit password wins; else the SSH agent when
//! enabled; else private-key material, where in-memory contents take
//! priority over a key-file search on disk.

use std::path::Path;
use std::sync::Arc;

use russh::client::{Handle, Handler};
use zeroize::Zeroizing;

use crate::config::{expand_tilde, KeyConfig, ShipConfig};
use crate::error::{Error, Result};

/// Default key-file search locations, in priority order.
const DEFAULT_KEY_LOCATIONS: &[&str] = &[
    "~/.ssh/id_rsa",
    "/.ssh/id_rsa",
    "~/.ssh/id_dsa",
    "/.ssh/id_dsa",
];

/// An authentication token for the run's single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthMethod {
    Password(Zeroizing<String>),
    PrivateKey {
        /// Entire contents of the private key file.
        key_data: Zeroizing<String>,
        key_pass: Option<Zeroizing<String>>,
    },
    #[cfg(not(target_os = "windows"))]
    Agent,
}

impl AuthMethod {
    pub fn with_password(password: &str) -> Self {
        Self::Password(Zeroizing::new(password.to_string()))
    }

    pub fn with_key(key: &str, passphrase: Option<&str>) -> Self {
        Self::PrivateKey {
            key_data: Zeroizing::new(key.to_string()),
            key_pass: passphrase.map(|p| Zeroizing::new(p.to_string())),
        }
    }

    /// Short label for connection banners.
    pub fn label(&self) -> &'static str {
        match self {
            AuthMethod::Password(_) => "password",
            AuthMethod::PrivateKey { .. } => "private key",
            #[cfg(not(target_os = "windows"))]
            AuthMethod::Agent => "ssh agent",
        }
    }
}

/// Resolve the configured credential mode into a concrete [`AuthMethod`].
///
/// Key material is fully resolved here, before any connection attempt, so
/// an unresolvable key fails the run without touching the network.
pub fn resolve_auth(config: &ShipConfig) -> Result<AuthMethod> {
    if let Some(pass) = &config.pass {
        return Ok(AuthMethod::with_password(pass));
    }

    #[cfg(not(target_os = "windows"))]
    if config.agent {
        return Ok(AuthMethod::Agent);
    }

    let (key_data, key_pass) = resolve_key_material(config)?;
    Ok(AuthMethod::PrivateKey {
        key_data: Zeroizing::new(key_data),
        key_pass: key_pass.map(Zeroizing::new),
    })
}

/// Resolve private-key contents and passphrase from the configuration.
///
/// In-memory contents (structured `key.contents` or the flat
/// `key_contents` option) win over a file lookup. The file lookup walks
/// the configured location list, or the default search paths, and takes
/// the first file that exists.
fn resolve_key_material(config: &ShipConfig) -> Result<(String, Option<String>)> {
    let (contents, passphrase, locations) = match &config.key {
        Some(KeyConfig::Path(path)) => (None, None, vec![path.clone()]),
        Some(KeyConfig::Detailed {
            contents,
            passphrase,
            location,
        }) => (
            contents.clone(),
            passphrase.clone(),
            location.clone().map(|l| l.into_vec()).unwrap_or_default(),
        ),
        None => (None, None, Vec::new()),
    };

    let contents = contents.or_else(|| config.key_contents.clone());
    let passphrase = passphrase.or_else(|| config.passphrase.clone());

    if let Some(contents) = contents {
        return Ok((contents, passphrase));
    }

    let locations = if locations.is_empty() {
        DEFAULT_KEY_LOCATIONS.iter().map(|s| s.to_string()).collect()
    } else {
        locations
    };

    for location in &locations {
        let path = expand_tilde(Path::new(location));
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            tracing::debug!("using private key from {:?}", path);
            return Ok((contents, passphrase));
        }
    }

    Err(Error::KeyNotFound {
        searched: locations.join(", "),
    })
}

/// Perform authentication on a freshly connected handle.
pub(crate) async fn authenticate<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    auth: AuthMethod,
) -> Result<()> {
    match auth {
        AuthMethod::Password(password) => {
            let authenticated = handle
                .authenticate_password(username, &**password)
                .await
                .map_err(Error::Ssh)?;
            if !authenticated.success() {
                return Err(Error::AuthenticationFailed {
                    user: username.to_string(),
                });
            }
        }
        AuthMethod::PrivateKey { key_data, key_pass } => {
            let private_key =
                russh::keys::decode_secret_key(&key_data, key_pass.as_ref().map(|p| &***p))
                    .map_err(Error::KeyInvalid)?;
            let authenticated = handle
                .authenticate_publickey(
                    username,
                    russh::keys::PrivateKeyWithHashAlg::new(
                        Arc::new(private_key),
                        handle
                            .best_supported_rsa_hash()
                            .await
                            .map_err(Error::Ssh)?
                            .flatten(),
                    ),
                )
                .await
                .map_err(Error::Ssh)?;
            if !authenticated.success() {
                return Err(Error::AuthenticationFailed {
                    user: username.to_string(),
                });
            }
        }
        #[cfg(not(target_os = "windows"))]
        AuthMethod::Agent => {
            let mut agent = russh::keys::agent::client::AgentClient::connect_env()
                .await
                .map_err(|_| Error::AgentUnavailable)?;

            let identities = agent
                .request_identities()
                .await
                .map_err(|_| Error::AgentUnavailable)?;
            if identities.is_empty() {
                return Err(Error::AgentNoIdentities);
            }

            let mut authenticated = false;
            for identity in identities {
                let result = handle
                    .authenticate_publickey_with(
                        username,
                        identity.clone(),
                        handle
                            .best_supported_rsa_hash()
                            .await
                            .map_err(Error::Ssh)?
                            .flatten(),
                        &mut agent,
                    )
                    .await;

                if let Ok(auth_result) = result {
                    if auth_result.success() {
                        authenticated = true;
                        break;
                    }
                }
            }

            if !authenticated {
                return Err(Error::AuthenticationFailed {
                    user: username.to_string(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_config() -> ShipConfig {
        ShipConfig {
            host: "h".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_password_wins_over_everything() {
        let config = ShipConfig {
            pass: Some("secret".into()),
            agent: true,
            key_contents: Some("KEY".into()),
            ..base_config()
        };
        let auth = resolve_auth(&config).unwrap();
        assert!(matches!(auth, AuthMethod::Password(_)));
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_agent_wins_over_key() {
        let config = ShipConfig {
            agent: true,
            key_contents: Some("KEY".into()),
            ..base_config()
        };
        let auth = resolve_auth(&config).unwrap();
        assert!(matches!(auth, AuthMethod::Agent));
    }

    #[test]
    fn test_key_contents_win_over_file_lookup() {
        let mut key_file = tempfile::NamedTempFile::new().unwrap();
        write!(key_file, "FILE KEY").unwrap();

        let config = ShipConfig {
            key: Some(KeyConfig::Detailed {
                contents: Some("RAW KEY".into()),
                passphrase: None,
                location: Some(crate::config::KeyLocations::One(
                    key_file.path().to_string_lossy().into_owned(),
                )),
            }),
            ..base_config()
        };
        match resolve_auth(&config).unwrap() {
            AuthMethod::PrivateKey { key_data, .. } => assert_eq!(&*key_data, "RAW KEY"),
            other => panic!("expected key auth, got {other:?}"),
        }
    }

    #[test]
    fn test_key_file_lookup_takes_first_existing() {
        let mut key_file = tempfile::NamedTempFile::new().unwrap();
        write!(key_file, "FILE KEY").unwrap();

        let config = ShipConfig {
            key: Some(KeyConfig::Detailed {
                contents: None,
                passphrase: Some("pp".into()),
                location: Some(crate::config::KeyLocations::Many(vec![
                    "/nonexistent/key_a".into(),
                    key_file.path().to_string_lossy().into_owned(),
                ])),
            }),
            ..base_config()
        };
        match resolve_auth(&config).unwrap() {
            AuthMethod::PrivateKey { key_data, key_pass } => {
                assert_eq!(&*key_data, "FILE KEY");
                assert_eq!(key_pass.as_deref().map(|p| p.as_str()), Some("pp"));
            }
            other => panic!("expected key auth, got {other:?}"),
        }
    }

    #[test]
    fn test_unresolvable_key_is_fatal() {
        let config = ShipConfig {
            key: Some(KeyConfig::Path("/nonexistent/only_key".into())),
            ..base_config()
        };
        let err = resolve_auth(&config).unwrap_err();
        assert!(matches!(err, Error::KeyNotFound { searched } if searched.contains("only_key")));
    }

    #[test]
    fn test_flat_key_contents_select_key_mode() {
        // No password, no agent, no structured key: the flat key_contents
        // option alone selects key authentication.
        let config = ShipConfig {
            key_contents: Some("RAW KEY".into()),
            passphrase: Some("pp".into()),
            ..base_config()
        };
        match resolve_auth(&config).unwrap() {
            AuthMethod::PrivateKey { key_data, key_pass } => {
                assert_eq!(&*key_data, "RAW KEY");
                assert_eq!(key_pass.as_deref().map(|p| p.as_str()), Some("pp"));
            }
            other => panic!("expected key auth, got {other:?}"),
        }
    }
}
