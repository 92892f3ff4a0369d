// ABOUTME: Workaround for remote login shells that reject POSIX syntax (fish).
// ABOUTME: Detects them from stderr and reruns the command as an uploaded /bin/sh script.

use super::error::{Error, Result};
use super::client::OutputSink;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;

/// Remote directory scripts are uploaded to.
const REMOTE_SCRIPT_DIR: &str = "/tmp";
const SCRIPT_PREFIX: &str = "remotebox-command-";

/// Result of running one command directly, stdout already delivered to the sink.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the remote side closed without reporting a status.
    pub exit_code: Option<u32>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Primitive operations a backend lends to the compatibility layer.
#[async_trait]
pub trait ScriptTransport: Send + Sync {
    /// Run `command` once, without any fallback.
    async fn run(&self, command: &str, output: OutputSink<'_>) -> Result<CommandOutput>;

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()>;
}

/// True when stderr shows the remote shell refused POSIX syntax.
pub fn looks_like_non_posix_shell_error(stderr: &str) -> bool {
    stderr.contains("fish: Unsupported")
}

/// Run `command`, switching to the script path if the remote shell chokes on it.
pub async fn execute<T>(transport: &T, command: &str, output: OutputSink<'_>) -> Result<()>
where
    T: ScriptTransport + ?Sized,
{
    let result = transport.run(command, &mut *output).await?;
    if looks_like_non_posix_shell_error(&result.stderr) {
        tracing::debug!("remote shell is not POSIX compatible, running command via script");
        return run_via_script(transport, command, output).await;
    }
    settle(command, result)
}

/// Upload `command` as a script and run it with `/bin/sh`, removing it afterwards.
pub async fn run_via_script<T>(transport: &T, command: &str, output: OutputSink<'_>) -> Result<()>
where
    T: ScriptTransport + ?Sized,
{
    let mut file = tempfile::Builder::new()
        .prefix(SCRIPT_PREFIX)
        .tempfile()?;
    file.write_all(command.as_bytes())?;
    file.flush()?;

    let name = file
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| SCRIPT_PREFIX.to_string());
    let remote = format!("{REMOTE_SCRIPT_DIR}/{name}");

    transport.upload_file(file.path(), &remote).await?;
    let result = transport.run(&script_command(&remote), output).await?;
    settle(command, result)
}

/// Command line that runs and then deletes an uploaded script.
pub fn script_command(remote: &str) -> String {
    format!("/bin/sh {remote}; rm -f {remote}")
}

/// Turn a finished command into `Ok` or a `RemoteCommand` error.
pub fn settle(command: &str, result: CommandOutput) -> Result<()> {
    if result.success() {
        return Ok(());
    }
    Err(Error::RemoteCommand {
        command: command.to_string(),
        exit_code: result.exit_code,
        stderr: result.stderr.trim().to_string(),
    })
}
