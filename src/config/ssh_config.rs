// ABOUTME: Best-effort reader for the local OpenSSH client configuration (~/.ssh/config).
// ABOUTME: Extracts Hostname/User/Port/IdentityFile for an alias and flags directives we cannot honor.

use super::expand_home;
use ssh2_config::{HostParams, ParseRule, SshConfig};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Directives the native client does not implement. Their presence for a host
/// means only the system `ssh` binary can connect faithfully.
const UNSUPPORTED_DIRECTIVES: &[&str] = &[
    "ProxyJump",
    "ProxyCommand",
    "Include",
    "Match",
    "CertificateFile",
    "PKCS11Provider",
    "SecurityKeyProvider",
];

/// Settings that apply to one host alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostConfig {
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_files: Vec<PathBuf>,
    /// Unsupported directives seen in blocks that apply to the alias.
    pub unsupported: Vec<String>,
}

/// A client configuration file on disk.
#[derive(Debug, Clone)]
pub struct SshConfigFile {
    path: PathBuf,
}

impl SshConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.ssh/config` for the given home directory.
    pub fn in_home(home: &Path) -> Self {
        Self::new(home.join(".ssh").join("config"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the settings for `alias`. Returns `Ok(None)` when the file does not exist.
    pub fn lookup(&self, alias: &str, home: Option<&Path>) -> io::Result<Option<HostConfig>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let config = SshConfig::default()
            .parse(
                &mut reader,
                ParseRule::ALLOW_UNKNOWN_FIELDS | ParseRule::ALLOW_UNSUPPORTED_FIELDS,
            )
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        let target = alias.rsplit_once('@').map_or(alias, |(_, host)| host);
        Ok(Some(host_config(config.query(target), target, home)))
    }
}

fn host_config(params: HostParams, target: &str, home: Option<&Path>) -> HostConfig {
    let unsupported = UNSUPPORTED_DIRECTIVES
        .iter()
        .filter(|name| match **name {
            "ProxyJump" => params.proxy_jump.is_some(),
            "CertificateFile" => params.certificate_file.is_some(),
            other => params
                .unsupported_fields
                .contains_key(&other.to_ascii_lowercase()),
        })
        .map(|name| name.to_string())
        .collect();

    let identity_files = params
        .identity_file
        .unwrap_or_default()
        .into_iter()
        .map(|path| match (path.to_str(), home) {
            (Some(raw), Some(home)) if raw.starts_with('~') => expand_home(raw, home),
            _ => path,
        })
        .collect();

    HostConfig {
        hostname: params.host_name.map(|name| name.replace("%h", target)),
        user: params.user,
        port: params.port.filter(|port| *port != 0),
        identity_files,
        unsupported,
    }
}
