// ABOUTME: The remote-execution contract both backends implement.
// ABOUTME: Connect, execute with a streaming sink, upload, and close.

use super::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use tokio::io::AsyncWrite;

/// Destination for a remote command's standard output.
pub type OutputSink<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// A way to run commands and copy files on one remote host.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Establish whatever the backend needs before the first operation.
    async fn connect(&self) -> Result<()>;

    /// Run `command`, streaming its stdout into `output`.
    ///
    /// A nonzero exit status is an error carrying the captured stderr.
    async fn execute(&self, command: &str, output: OutputSink<'_>) -> Result<()>;

    /// Copy a local file to `remote`.
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    /// Release the connection. Closing twice is not an error.
    async fn close(&self) -> Result<()>;
}

/// Which implementation a session ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Native,
    Shell,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Native => write!(f, "native"),
            BackendKind::Shell => write!(f, "shell"),
        }
    }
}

/// Run `command` and collect its stdout as a string.
pub async fn capture(client: &dyn RemoteClient, command: &str) -> Result<String> {
    let mut buf = Vec::new();
    client.execute(command, &mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
