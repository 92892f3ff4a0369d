// ABOUTME: Application-wide error types for remotebox.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("resolve: invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Ssh(#[from] crate::ssh::Error),

    #[error(transparent)]
    Provision(#[from] crate::provision::ProvisionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
