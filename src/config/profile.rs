// ABOUTME: Connection profile and the resolver that builds it.
// ABOUTME: Layers platform defaults, settings file, env overrides, and ~/.ssh/config, in that order.

use super::ssh_config::{HostConfig, SshConfigFile};
use super::{KnownHostsPolicy, Platform, Settings, expand_home, platform_defaults};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Everything needed to reach one remote host. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    /// Host alias as configured (may be `user@host`). Used verbatim by the shell backend.
    pub host: String,
    /// Address to dial.
    pub hostname: String,
    /// Login name.
    pub user: String,
    pub port: u16,
    /// Private keys to try first, in order.
    pub identity_candidates: Vec<PathBuf>,
    /// Raw extra flags for the `ssh`/`scp` binaries.
    pub extra_flags: String,
    pub known_hosts_policy: KnownHostsPolicy,
    pub known_hosts_path: PathBuf,
    pub docker_path: String,
    pub agent_path: String,
    /// Whether the in-process client may be used. `false` forces the shell backend.
    pub use_native: bool,
    /// SSH config directives for this host that the native client cannot honor.
    pub unsupported_directives: Vec<String>,
}

impl ConnectionProfile {
    /// Profile for `host`, splitting a `user@` prefix if present.
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        let (user, hostname) = split_user_host(&host);
        Self {
            hostname: hostname.to_string(),
            user: user.unwrap_or_default().to_string(),
            host,
            port: DEFAULT_SSH_PORT,
            identity_candidates: Vec::new(),
            extra_flags: String::new(),
            known_hosts_policy: KnownHostsPolicy::Strict,
            known_hosts_path: dirs::home_dir()
                .unwrap_or_default()
                .join(".ssh")
                .join("known_hosts"),
            docker_path: "docker".to_string(),
            agent_path: "ssh-agent".to_string(),
            use_native: true,
            unsupported_directives: Vec::new(),
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn extra_flags(mut self, flags: impl Into<String>) -> Self {
        self.extra_flags = flags.into();
        self
    }

    pub fn known_hosts(mut self, policy: KnownHostsPolicy, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_policy = policy;
        self.known_hosts_path = path.into();
        self
    }

    pub fn identity_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.identity_candidates = candidates;
        self
    }

    pub fn use_native(mut self, use_native: bool) -> Self {
        self.use_native = use_native;
        self
    }

    pub fn docker_path(mut self, path: impl Into<String>) -> Self {
        self.docker_path = path.into();
        self
    }
}

/// Split `user@host` into its parts. The last `@` separates them.
fn split_user_host(alias: &str) -> (Option<&str>, &str) {
    match alias.rsplit_once('@') {
        Some((user, host)) if !user.is_empty() => (Some(user), host),
        Some((_, host)) => (None, host),
        None => (None, alias),
    }
}

/// Parse a port, falling back to 22 for empty, zero, or malformed values.
pub fn parse_port(value: &str) -> u16 {
    let value = value.trim();
    if value.is_empty() {
        return DEFAULT_SSH_PORT;
    }
    match value.parse::<u16>() {
        Ok(port) if port != 0 => port,
        _ => {
            tracing::warn!(
                "invalid port {value:?}, falling back to default SSH port {DEFAULT_SSH_PORT}"
            );
            DEFAULT_SSH_PORT
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        other => {
            tracing::warn!("ignoring {name}={other:?}: expected true or false");
            None
        }
    }
}

/// Builds a [`ConnectionProfile`] from defaults, settings, environment, and SSH config.
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    platform: Platform,
    home: Option<PathBuf>,
    current_user: Option<String>,
    local_hostname: Option<String>,
    settings: Settings,
    ssh_config: Option<SshConfigFile>,
}

impl ProfileResolver {
    /// Resolver seeded from the running system.
    pub fn from_system() -> Self {
        let current_user = ["USER", "USERNAME"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()));
        Self {
            platform: Platform::current(),
            home: dirs::home_dir(),
            current_user,
            local_hostname: gethostname::gethostname().into_string().ok(),
            settings: Settings::default(),
            ssh_config: None,
        }
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn current_user(mut self, user: Option<String>) -> Self {
        self.current_user = user;
        self
    }

    pub fn local_hostname(mut self, hostname: Option<String>) -> Self {
        self.local_hostname = hostname;
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Use a specific SSH client configuration file instead of `~/.ssh/config`.
    pub fn ssh_config(mut self, file: SshConfigFile) -> Self {
        self.ssh_config = Some(file);
        self
    }

    /// Resolve using the process environment.
    pub fn resolve(&self) -> Result<ConnectionProfile> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve using `env` as the source of environment overrides.
    pub fn resolve_with<F>(&self, env: F) -> Result<ConnectionProfile>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| env(name).filter(|value| !value.trim().is_empty());
        let settings = &self.settings;
        let home = self.home.as_deref();
        let mut problems = Vec::new();

        let defaults = match platform_defaults(self.platform) {
            Ok(defaults) => Some(defaults),
            Err(e) => {
                problems.push(e.to_string());
                None
            }
        };

        let host = env("HOST")
            .or_else(|| settings.host.clone())
            .or_else(|| self.local_hostname.clone());
        if host.is_none() {
            problems.push("no host configured and local hostname unavailable (set HOST)".into());
        }

        let user = env("USER")
            .or_else(|| settings.user.clone())
            .or_else(|| self.current_user.clone());
        if user.is_none() {
            problems.push("cannot determine current user (set USER)".into());
        }

        let port = env("PORT")
            .or_else(|| settings.port.clone())
            .map_or(DEFAULT_SSH_PORT, |p| parse_port(&p));

        let use_native = env("USE_BUILTIN_SSH")
            .and_then(|v| parse_flag("USE_BUILTIN_SSH", &v))
            .or(settings.use_builtin_ssh)
            .unwrap_or(true);

        let known_hosts_policy = env("KNOWN_HOSTS_POLICY")
            .map(|v| KnownHostsPolicy::parse(&v))
            .or(settings.known_hosts_policy)
            .unwrap_or_default();

        let known_hosts_path = env("KNOWN_HOSTS_PATH")
            .map(PathBuf::from)
            .or_else(|| settings.known_hosts_path.clone())
            .or_else(|| home.map(|h| h.join(".ssh").join("known_hosts")));
        let known_hosts_path = match known_hosts_path {
            Some(path) => normalize(&path, home, &mut problems),
            None => {
                problems.push(
                    "cannot determine home directory for known_hosts (set KNOWN_HOSTS_PATH)".into(),
                );
                PathBuf::new()
            }
        };

        let identity_candidates: Vec<PathBuf> = match env("IDENTITY_FILE") {
            Some(list) => list.split_whitespace().map(PathBuf::from).collect(),
            None => settings.identity_files.clone(),
        }
        .iter()
        .map(|path| normalize(path, home, &mut problems))
        .collect();

        let docker_path = env("DOCKER_PATH")
            .or_else(|| settings.docker_path.clone())
            .or_else(|| defaults.as_ref().map(|d| d.docker_path.to_string()));
        let agent_path = env("AGENT_PATH")
            .or_else(|| settings.agent_path.clone())
            .or_else(|| defaults.as_ref().map(|d| d.agent_path.to_string()));

        let (Some(host), Some(user), Some(docker_path), Some(agent_path), true) =
            (host, user, docker_path, agent_path, problems.is_empty())
        else {
            return Err(Error::Configuration(problems.join("; ")));
        };

        let mut profile = ConnectionProfile::new(host);
        if profile.user.is_empty() {
            profile.user = user;
        }
        profile.port = port;
        profile.identity_candidates = identity_candidates;
        profile.extra_flags = env("EXTRA_FLAGS")
            .or_else(|| settings.extra_flags.clone())
            .unwrap_or_default();
        profile.known_hosts_policy = known_hosts_policy;
        profile.known_hosts_path = known_hosts_path;
        profile.docker_path = docker_path;
        profile.agent_path = agent_path;
        profile.use_native = use_native;

        self.augment_from_ssh_config(&mut profile);
        Ok(profile)
    }

    fn augment_from_ssh_config(&self, profile: &mut ConnectionProfile) {
        let home = self.home.as_deref();
        let file = self
            .ssh_config
            .clone()
            .or_else(|| {
                self.settings.ssh_config.as_ref().map(|p| {
                    SshConfigFile::new(match (p.to_str(), home) {
                        (Some(raw), Some(home)) => expand_home(raw, home),
                        _ => p.clone(),
                    })
                })
            })
            .or_else(|| home.map(SshConfigFile::in_home));
        let Some(file) = file else {
            tracing::debug!("no home directory, skipping ssh config lookup");
            return;
        };

        match file.lookup(&profile.host, home) {
            Ok(Some(config)) => apply_host_config(profile, config),
            Ok(None) => tracing::debug!(
                "no ssh config at {}, using explicit profile",
                file.path().display()
            ),
            Err(e) => tracing::debug!(
                "reading ssh config {} failed: {e} (falling back to explicit profile)",
                file.path().display()
            ),
        }
    }
}

fn apply_host_config(profile: &mut ConnectionProfile, config: HostConfig) {
    if let Some(hostname) = config.hostname {
        profile.hostname = hostname;
    }
    if let Some(user) = config.user {
        profile.user = user;
    }
    if profile.port == DEFAULT_SSH_PORT
        && let Some(port) = config.port
    {
        profile.port = port;
    }
    if !config.identity_files.is_empty() {
        profile.identity_candidates = config.identity_files;
    }
    profile.unsupported_directives = config.unsupported;
}

fn normalize(path: &Path, home: Option<&Path>, problems: &mut Vec<String>) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    if !raw.starts_with('~') {
        return path.to_path_buf();
    }
    match home {
        Some(home) => expand_home(raw, home),
        None => {
            problems.push(format!("cannot expand {raw}: home directory unknown"));
            path.to_path_buf()
        }
    }
}
