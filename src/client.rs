//! Service client handed to task executions.
//!
//! The client is a thin handle around an HTTP client plus per-host
//! credentials. Credentials come from the `[[hosts]]` config entries,
//! optionally merged on top of the ambient Docker-style credential file
//! (`$DOCKER_CONFIG/config.json` or `~/.docker/config.json`).

use crate::config::HostConfig;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// User-Agent header sent on outgoing requests.
pub const USER_AGENT: &str = concat!("taskbot/", env!("CARGO_PKG_VERSION"));

/// Resolved credentials for one remote host.
#[derive(Debug, Clone, Default)]
pub struct HostAuth {
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub token: Option<String>,
    pub tls: bool,
}

/// Shared handle to the remote service, passed into every execution.
#[derive(Debug)]
pub struct ServiceClient {
    http: reqwest::Client,
    hosts: HashMap<String, HostAuth>,
}

impl ServiceClient {
    /// Build a client from config host entries. When `load_ambient` is set,
    /// credentials from the Docker-style config file are merged in first,
    /// with config entries taking precedence.
    pub fn new(hosts: &[HostConfig], load_ambient: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        let mut map = HashMap::new();
        if load_ambient {
            match read_ambient_credentials() {
                Ok(ambient) => {
                    for (name, auth) in ambient {
                        map.insert(name, auth);
                    }
                }
                Err(e) => {
                    // The ambient file is best-effort only.
                    debug!("No ambient credentials loaded: {}", e);
                }
            }
        }

        for host in hosts {
            map.insert(
                host.name.clone(),
                HostAuth {
                    hostname: host.hostname.clone(),
                    user: host.user.clone(),
                    pass: host.pass.clone(),
                    token: host.token.clone(),
                    tls: host.tls.unwrap_or(true),
                },
            );
        }

        Ok(Self { http, hosts: map })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Look up credentials for a host by registry name.
    pub fn host(&self, name: &str) -> Option<&HostAuth> {
        self.hosts.get(name)
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }
}

#[derive(Debug, Deserialize, Default)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

#[derive(Debug, Deserialize, Default)]
struct DockerAuthEntry {
    auth: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

fn ambient_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCKER_CONFIG") {
        return Some(PathBuf::from(dir).join("config.json"));
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".docker").join("config.json"))
}

fn read_ambient_credentials() -> Result<Vec<(String, HostAuth)>> {
    let path = ambient_config_path().context("no credential file location")?;
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {:?}", path))?;
    parse_ambient_credentials(&content)
}

/// Parse a Docker-style config file. `auth` entries are base64
/// `user:password` blobs; explicit username/password fields win over the
/// blob when both are present.
fn parse_ambient_credentials(content: &str) -> Result<Vec<(String, HostAuth)>> {
    let file: DockerConfigFile =
        serde_json::from_str(content).context("failed to parse credential file")?;

    let mut out = Vec::new();
    for (host, entry) in file.auths {
        let mut auth = HostAuth {
            tls: true,
            ..Default::default()
        };
        if let (Some(user), Some(pass)) = (entry.username, entry.password) {
            auth.user = Some(user);
            auth.pass = Some(pass);
        } else if let Some(blob) = entry.auth {
            let decoded = STANDARD
                .decode(blob.trim())
                .with_context(|| format!("invalid auth entry for {:?}", host))?;
            let decoded = String::from_utf8(decoded)
                .with_context(|| format!("invalid auth entry for {:?}", host))?;
            match decoded.split_once(':') {
                Some((user, pass)) => {
                    auth.user = Some(user.to_string());
                    auth.pass = Some(pass.to_string());
                }
                None => {
                    debug!(host = %host, "Skipping credential entry without user:pass");
                    continue;
                }
            }
        } else {
            continue;
        }
        out.push((host, auth));
    }
    Ok(out)
}
