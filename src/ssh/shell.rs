// ABOUTME: Backend that shells out to the system ssh and scp binaries.
// ABOUTME: Stateless; every operation is one child process.

use super::client::{OutputSink, RemoteClient};
use super::compat::{self, CommandOutput, ScriptTransport};
use super::error::{Error, Result, Stage, UploadSide};
use crate::config::{ConnectionProfile, DEFAULT_SSH_PORT};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Options baked into every invocation. This backend never prompts and
/// accepts unknown host keys.
const BASE_FLAGS: [&str; 2] = ["-oStrictHostKeyChecking=no", "-oBatchMode=yes"];

#[derive(Debug, Clone)]
pub struct ShellClient {
    profile: Arc<ConnectionProfile>,
    ssh_program: PathBuf,
    scp_program: PathBuf,
}

impl ShellClient {
    pub fn new(profile: Arc<ConnectionProfile>) -> Self {
        Self {
            profile,
            ssh_program: PathBuf::from("ssh"),
            scp_program: PathBuf::from("scp"),
        }
    }

    /// Use different `ssh`/`scp` executables.
    pub fn with_programs(mut self, ssh: impl Into<PathBuf>, scp: impl Into<PathBuf>) -> Self {
        self.ssh_program = ssh.into();
        self.scp_program = scp.into();
        self
    }

    /// Arguments for running `command` through `ssh`.
    pub fn ssh_args(&self, command: &str) -> Result<Vec<String>> {
        let mut args = self.flags("-p")?;
        args.push(self.profile.host.clone());
        args.push(command.to_string());
        Ok(args)
    }

    /// Arguments for copying `local` to `remote` through `scp`.
    pub fn scp_args(&self, local: &Path, remote: &str) -> Result<Vec<OsString>> {
        let mut args: Vec<OsString> = self.flags("-P")?.into_iter().map(OsString::from).collect();
        args.push(local.as_os_str().to_os_string());
        args.push(format!("{}:{remote}", self.profile.host).into());
        Ok(args)
    }

    fn flags(&self, port_flag: &str) -> Result<Vec<String>> {
        let mut flags: Vec<String> = BASE_FLAGS.iter().map(|f| f.to_string()).collect();
        if self.profile.port != DEFAULT_SSH_PORT {
            flags.push(port_flag.to_string());
            flags.push(self.profile.port.to_string());
        }
        if !self.profile.extra_flags.trim().is_empty() {
            flags.extend(shell_words::split(&self.profile.extra_flags)?);
        }
        Ok(flags)
    }
}

#[async_trait]
impl ScriptTransport for ShellClient {
    async fn run(&self, command: &str, output: OutputSink<'_>) -> Result<CommandOutput> {
        let args = self.ssh_args(command)?;
        tracing::debug!("running {} {}", self.ssh_program.display(), args.join(" "));

        let mut child = Command::new(&self.ssh_program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::transport(
                    Stage::Execute,
                    format!("spawn {}: {e}", self.ssh_program.display()),
                )
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::transport(Stage::Execute, "ssh stdout not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::transport(Stage::Execute, "ssh stderr not captured"))?;

        let mut captured = Vec::new();
        let (copied, read) = tokio::join!(
            tokio::io::copy(&mut stdout, output),
            stderr.read_to_end(&mut captured)
        );
        copied?;
        read?;
        let status = child.wait().await?;

        Ok(CommandOutput {
            exit_code: status.code().map(|code| code as u32),
            stderr: String::from_utf8_lossy(&captured).into_owned(),
        })
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        let upload_error = |side, reason: String| Error::Upload {
            side,
            local: local.to_path_buf(),
            remote: remote.to_string(),
            reason,
        };

        if let Err(e) = tokio::fs::metadata(local).await {
            return Err(upload_error(UploadSide::Local, e.to_string()));
        }

        let args = self.scp_args(local, remote)?;
        let result = Command::new(&self.scp_program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                upload_error(
                    UploadSide::Remote,
                    format!("spawn {}: {e}", self.scp_program.display()),
                )
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            return Err(upload_error(UploadSide::Copy, stderr));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteClient for ShellClient {
    /// Nothing to establish; only validates that the extra flags parse.
    async fn connect(&self) -> Result<()> {
        self.flags("-p").map(|_| ())
    }

    async fn execute(&self, command: &str, output: OutputSink<'_>) -> Result<()> {
        compat::execute(self, command, output).await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        self.upload_file(local, remote).await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
