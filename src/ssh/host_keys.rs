// ABOUTME: Host key verification against an OpenSSH known_hosts file.
// ABOUTME: Applies the strict / accept-new / ignore policy; store lookups are cached per host.

use super::error::{Error, HostKeyRejection, Result};
use crate::config::KnownHostsPolicy;
use parking_lot::Mutex;
use russh::keys::known_hosts::{known_host_keys_path, learn_known_hosts_path};
use russh::keys::ssh_key::PublicKey;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

type Recorded = Vec<(usize, PublicKey)>;

/// Decides whether a presented server key is trusted.
///
/// The store is read at most once per (host, port) for the verifier's lifetime.
/// Entries written by other processes after that first read are not seen.
#[derive(Debug)]
pub struct HostKeyVerifier {
    policy: KnownHostsPolicy,
    path: PathBuf,
    /// Keys recorded per (host, port), loaded on first use.
    cache: Mutex<HashMap<(String, u16), Recorded>>,
}

impl HostKeyVerifier {
    pub fn new(policy: KnownHostsPolicy, path: impl Into<PathBuf>) -> Self {
        if policy == KnownHostsPolicy::Ignore {
            tracing::warn!("host key verification disabled (known_hosts policy: ignore)");
        }
        Self {
            policy,
            path: path.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> KnownHostsPolicy {
        self.policy
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept or reject `key` presented by `host:port`.
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> Result<()> {
        if self.policy == KnownHostsPolicy::Ignore {
            return Ok(());
        }

        let reject = |reason| Error::HostKeyRejected {
            host: host.to_string(),
            reason,
        };

        let mut cache = self.cache.lock();
        let recorded = match cache.entry((host.to_string(), port)) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let keys = load_recorded(host, port, &self.path).map_err(reject)?;
                entry.insert(keys)
            }
        };

        if recorded
            .iter()
            .any(|(_, known)| known.key_data() == key.key_data())
        {
            return Ok(());
        }

        if let Some((line, _)) = recorded.first() {
            return Err(reject(HostKeyRejection::Changed { line: *line }));
        }

        match self.policy {
            KnownHostsPolicy::AcceptNew => {
                tracing::info!(
                    "adding host key for {host}:{port} to {}",
                    self.path.display()
                );
                learn_known_hosts_path(host, port, key, &self.path).map_err(|e| {
                    reject(HostKeyRejection::Store(format!(
                        "cannot record key in {}: {e}",
                        self.path.display()
                    )))
                })?;
                recorded.push((0, key.clone()));
                Ok(())
            }
            _ => Err(reject(HostKeyRejection::Unknown)),
        }
    }
}

/// Keys recorded for `host:port`. Only a missing store counts as empty;
/// russh treats any file it cannot open that way, so that case is checked first.
fn load_recorded(
    host: &str,
    port: u16,
    path: &Path,
) -> std::result::Result<Recorded, HostKeyRejection> {
    match std::fs::File::open(path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(HostKeyRejection::Store(format!(
                "cannot open {}: {e}",
                path.display()
            )));
        }
    }
    known_host_keys_path(host, port, path).map_err(|e| HostKeyRejection::Store(e.to_string()))
}
