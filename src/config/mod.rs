// ABOUTME: Configuration types and resolution for remote connections.
// ABOUTME: Handles the optional YAML settings file, env overrides, and SSH config augmentation.

mod platform;
mod policy;
mod profile;
pub mod ssh_config;

pub use platform::{Platform, PlatformDefaults, platform_defaults};
pub use policy::KnownHostsPolicy;
pub use profile::{ConnectionProfile, DEFAULT_SSH_PORT, ProfileResolver, parse_port};

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "remotebox.yml";
pub const CONFIG_FILENAME_ALT: &str = "remotebox.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".remotebox/config.yml";

/// Settings file contents. Every field is optional; environment variables win over it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub extra_flags: Option<String>,

    #[serde(default)]
    pub use_builtin_ssh: Option<bool>,

    #[serde(default)]
    pub known_hosts_policy: Option<KnownHostsPolicy>,

    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,

    #[serde(default)]
    pub docker_path: Option<String>,

    #[serde(default)]
    pub agent_path: Option<String>,

    #[serde(default)]
    pub identity_files: Vec<PathBuf>,

    /// Alternate SSH client configuration file.
    #[serde(default)]
    pub ssh_config: Option<PathBuf>,
}

/// Ports may be written as numbers or strings in YAML.
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u64),
        Text(String),
    }

    Ok(Option::<Port>::deserialize(deserializer)?.map(|port| match port {
        Port::Number(n) => n.to_string(),
        Port::Text(s) => s,
    }))
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_yaml(&content)
    }

    /// Find a settings file in `dir`. A missing file is not an error.
    pub fn discover(dir: &Path) -> Result<Option<Self>> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!("loading settings from {}", path.display());
                return Self::load(path).map(Some);
            }
        }

        Ok(None)
    }
}

/// Replace a leading `~` with `home`.
pub fn expand_home(path: &str, home: &Path) -> PathBuf {
    if path == "~" {
        return home.to_path_buf();
    }
    match path
        .strip_prefix("~/")
        .or_else(|| path.strip_prefix("~\\"))
    {
        Some(rest) => home.join(rest),
        None => PathBuf::from(path),
    }
}
