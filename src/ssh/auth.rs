// ABOUTME: Picks the credential the native client authenticates with.
// ABOUTME: Tries identity candidates, then the SSH agent, then conventional default keys.

use super::error::{Error, FallbackableError, Result};
use russh::keys::agent::client::AgentClient;
use russh::keys::ssh_key::{PrivateKey, PublicKey};
use russh::keys::load_secret_key;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixStream;

/// Keys looked up under `~/.ssh` when nothing else works.
pub const DEFAULT_KEY_NAMES: &[&str] = &["id_ed25519", "id_ecdsa", "id_rsa"];

/// A usable way to prove identity to the server.
pub enum Credential {
    Key {
        path: PathBuf,
        key: Arc<PrivateKey>,
    },
    Agent {
        client: AgentClient<UnixStream>,
        identities: Vec<PublicKey>,
    },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Key { path, .. } => f.debug_struct("Key").field("path", path).finish(),
            Credential::Agent { identities, .. } => f
                .debug_struct("Agent")
                .field("identities", &identities.len())
                .finish(),
        }
    }
}

/// Outcome of examining one key file.
enum Candidate {
    Usable(PrivateKey),
    Skipped,
    Unparsable(String),
}

#[derive(Debug, Clone)]
pub struct AuthResolver {
    home: Option<PathBuf>,
    agent_socket: Option<PathBuf>,
}

impl AuthResolver {
    pub fn new(home: Option<PathBuf>, agent_socket: Option<PathBuf>) -> Self {
        Self { home, agent_socket }
    }

    /// Resolver using the current home directory and `SSH_AUTH_SOCK`.
    pub fn from_env() -> Self {
        let agent_socket = std::env::var_os("SSH_AUTH_SOCK")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        Self::new(dirs::home_dir(), agent_socket)
    }

    /// Return the first usable credential.
    pub async fn resolve(&self, candidates: &[PathBuf]) -> Result<Credential> {
        let mut unparsable = Vec::new();

        for path in candidates {
            if let Some(credential) = examine(path, &mut unparsable) {
                return Ok(credential);
            }
        }

        if let Some(credential) = self.agent().await {
            return Ok(credential);
        }

        if let Some(home) = &self.home {
            let ssh_dir = home.join(".ssh");
            for name in DEFAULT_KEY_NAMES {
                if let Some(credential) = examine(&ssh_dir.join(name), &mut unparsable) {
                    return Ok(credential);
                }
            }
        }

        if !unparsable.is_empty() {
            return Err(FallbackableError::UnsupportedKeyFormat(unparsable.join(", ")).into());
        }
        Err(Error::AuthenticationExhausted)
    }

    async fn agent(&self) -> Option<Credential> {
        let socket = self.agent_socket.as_ref()?;
        let mut client = match AgentClient::connect_uds(socket).await {
            Ok(client) => client,
            Err(e) => {
                tracing::debug!("ssh agent at {} unavailable: {e}", socket.display());
                return None;
            }
        };
        match client.request_identities().await {
            Ok(identities) if !identities.is_empty() => Some(Credential::Agent {
                client,
                identities,
            }),
            Ok(_) => {
                tracing::debug!("ssh agent holds no identities");
                None
            }
            Err(e) => {
                tracing::debug!("failed to list ssh agent identities: {e}");
                None
            }
        }
    }
}

fn examine(path: &Path, unparsable: &mut Vec<String>) -> Option<Credential> {
    match load_candidate(path) {
        Candidate::Usable(key) => {
            tracing::debug!("using identity file {}", path.display());
            Some(Credential::Key {
                path: path.to_path_buf(),
                key: Arc::new(key),
            })
        }
        Candidate::Skipped => None,
        Candidate::Unparsable(reason) => {
            unparsable.push(format!("{}: {reason}", path.display()));
            None
        }
    }
}

fn load_candidate(path: &Path) -> Candidate {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            tracing::debug!("skipping identity {}: not a regular file", path.display());
            return Candidate::Skipped;
        }
        Err(e) => {
            tracing::debug!("skipping identity {}: {e}", path.display());
            return Candidate::Skipped;
        }
    }

    match load_secret_key(path, None) {
        Ok(key) => Candidate::Usable(key),
        Err(russh::keys::Error::KeyIsEncrypted) => {
            tracing::debug!("skipping identity {}: passphrase protected", path.display());
            Candidate::Skipped
        }
        Err(e) => {
            tracing::debug!("skipping identity {}: {e}", path.display());
            Candidate::Unparsable(e.to_string())
        }
    }
}
