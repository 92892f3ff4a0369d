// ABOUTME: SSH client error types shared by both backends.
// ABOUTME: Classifies failures by stage and marks the ones that allow backend fallback.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage at which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Auth,
    Dial,
    Execute,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolve => "resolve",
            Stage::Auth => "auth",
            Stage::Dial => "dial",
            Stage::Execute => "execute",
            Stage::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// Failures that mean "the native client cannot handle this host, try the shell backend".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallbackableError {
    #[error("unsupported SSH config directive: {0}")]
    UnsupportedConfigDirective(String),

    #[error("unsupported authentication method: {0}")]
    UnsupportedAuthMethod(String),

    #[error("unsupported key format: {0}")]
    UnsupportedKeyFormat(String),
}

/// Why a presented host key was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyRejection {
    /// Host has no entry in the store.
    Unknown,
    /// Host is recorded with a different key.
    Changed { line: usize },
    /// The store could not be read or parsed for this host.
    Store(String),
}

impl fmt::Display for HostKeyRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKeyRejection::Unknown => f.write_str("host key not found in known_hosts"),
            HostKeyRejection::Changed { line } => write!(
                f,
                "host key does not match known_hosts line {line} (possible man-in-the-middle)"
            ),
            HostKeyRejection::Store(reason) => write!(f, "known_hosts unusable: {reason}"),
        }
    }
}

/// Which side of a file transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadSide {
    /// Opening the local source file.
    Local,
    /// Starting the transfer session or creating the remote file.
    Remote,
    /// Copying bytes between the two.
    Copy,
}

impl fmt::Display for UploadSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadSide::Local => f.write_str("open local file"),
            UploadSide::Remote => f.write_str("create remote file"),
            UploadSide::Copy => f.write_str("copy file"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("auth: no usable SSH auth found")]
    AuthenticationExhausted,

    #[error("auth: server rejected all credentials for user {user}")]
    AuthenticationRejected { user: String },

    #[error("{}: {}", .0.stage(), .0)]
    Fallbackable(#[from] FallbackableError),

    #[error("dial: host key for {host} rejected: {reason}")]
    HostKeyRejected {
        host: String,
        reason: HostKeyRejection,
    },

    #[error("{stage}: {message}")]
    Transport { stage: Stage, message: String },

    #[error("execute: command `{command}` failed{}: {stderr}", exit_suffix(.exit_code))]
    RemoteCommand {
        command: String,
        exit_code: Option<u32>,
        stderr: String,
    },

    #[error("upload: {side} {}: {reason}", .local.display())]
    Upload {
        side: UploadSide,
        local: PathBuf,
        remote: String,
        reason: String,
    },

    #[error("parse extra flags: {0}")]
    ExtraFlags(#[from] shell_words::ParseError),

    #[error("not connected")]
    NotConnected,

    #[error("could not determine remote OS")]
    UnknownRemoteOs,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_suffix(code: &Option<u32>) -> String {
    match code {
        Some(code) => format!(" with exit code {code}"),
        None => String::new(),
    }
}

impl FallbackableError {
    pub fn stage(&self) -> Stage {
        match self {
            FallbackableError::UnsupportedConfigDirective(_) => Stage::Resolve,
            FallbackableError::UnsupportedAuthMethod(_)
            | FallbackableError::UnsupportedKeyFormat(_) => Stage::Auth,
        }
    }
}

impl Error {
    /// Whether the selector may retry this failure with the shell backend.
    pub fn is_fallbackable(&self) -> bool {
        matches!(self, Error::Fallbackable(_))
    }

    /// Stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            Error::AuthenticationExhausted | Error::AuthenticationRejected { .. } => Stage::Auth,
            Error::Fallbackable(inner) => inner.stage(),
            Error::HostKeyRejected { .. } | Error::Protocol(_) => Stage::Dial,
            Error::Transport { stage, .. } => *stage,
            Error::RemoteCommand { .. } | Error::NotConnected | Error::UnknownRemoteOs => {
                Stage::Execute
            }
            Error::Upload { .. } => Stage::Upload,
            Error::ExtraFlags(_) => Stage::Resolve,
            Error::Key(_) => Stage::Auth,
            Error::Io(_) => Stage::Execute,
        }
    }

    pub(crate) fn transport(stage: Stage, message: impl Into<String>) -> Self {
        Error::Transport {
            stage,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
