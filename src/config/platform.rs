// ABOUTME: Local platform detection and per-platform default binary paths.
// ABOUTME: Lookups take the platform explicitly and fail for unsupported ones.

use crate::error::{Error, Result};
use std::fmt;

/// Operating system the client itself runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Darwin,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Platform::Linux,
            "macos" => Platform::Darwin,
            "windows" => Platform::Windows,
            _ => Platform::Other,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::Darwin => write!(f, "darwin"),
            Platform::Windows => write!(f, "windows"),
            Platform::Other => write!(f, "{}", std::env::consts::OS),
        }
    }
}

/// Binary locations used when nothing overrides them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDefaults {
    pub docker_path: &'static str,
    pub agent_path: &'static str,
}

/// Default docker and ssh-agent paths for a platform.
pub fn platform_defaults(platform: Platform) -> Result<PlatformDefaults> {
    match platform {
        Platform::Linux | Platform::Darwin => Ok(PlatformDefaults {
            docker_path: "/usr/bin/docker",
            agent_path: "/usr/bin/ssh-agent",
        }),
        Platform::Windows => Ok(PlatformDefaults {
            docker_path: r"C:\Program Files\Docker\Docker\resources\bin\docker.exe",
            agent_path: r"C:\Windows\System32\OpenSSH\ssh-agent.exe",
        }),
        Platform::Other => Err(Error::Configuration(format!(
            "unsupported operating system: {platform}"
        ))),
    }
}
