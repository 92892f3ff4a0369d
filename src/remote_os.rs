// ABOUTME: Remote operating system detection over an open client.
// ABOUTME: Tries uname, then cmd.exe, then PowerShell; the answer is cached per detector.

use crate::ssh::{self, RemoteClient, capture};
use std::fmt;
use tokio::sync::OnceCell;

pub const UNAME_COMMAND: &str = "uname -s";
pub const CMD_VERSION_COMMAND: &str = r#"cmd /c "ver""#;
pub const POWERSHELL_VERSION_COMMAND: &str =
    r#"powershell -NoProfile -Command "[System.Environment]::OSVersion.VersionString""#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOs {
    Linux,
    Darwin,
    Windows,
    Unknown,
}

impl fmt::Display for RemoteOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteOs::Linux => write!(f, "linux"),
            RemoteOs::Darwin => write!(f, "darwin"),
            RemoteOs::Windows => write!(f, "windows"),
            RemoteOs::Unknown => write!(f, "unknown"),
        }
    }
}

impl RemoteOs {
    /// Classify `uname -s` output.
    fn from_uname(output: &str) -> Option<Self> {
        let output = output.to_ascii_lowercase();
        if output.contains("linux") {
            Some(RemoteOs::Linux)
        } else if output.contains("darwin") {
            Some(RemoteOs::Darwin)
        } else {
            None
        }
    }

    /// Command line invoking docker with `args` on this OS.
    ///
    /// Windows paths are quoted since they usually contain spaces. Unknown
    /// hosts get no wrapping at all.
    pub fn docker_command(&self, docker_path: &str, args: &str) -> String {
        match self {
            RemoteOs::Windows => format!("\"{docker_path}\" {args}"),
            RemoteOs::Linux | RemoteOs::Darwin | RemoteOs::Unknown => {
                format!("{docker_path} {args}")
            }
        }
    }
}

/// Detects the remote OS once and remembers the answer.
#[derive(Debug, Default)]
pub struct OsDetector {
    cache: OnceCell<RemoteOs>,
}

impl OsDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect the OS behind `client`. Unknown is reported as an error.
    pub async fn detect(&self, client: &dyn RemoteClient) -> ssh::Result<RemoteOs> {
        let os = *self.cache.get_or_init(|| classify(client)).await;
        match os {
            RemoteOs::Unknown => Err(ssh::Error::UnknownRemoteOs),
            os => Ok(os),
        }
    }

    /// The cached answer, if detection already ran.
    pub fn cached(&self) -> Option<RemoteOs> {
        self.cache.get().copied()
    }
}

async fn classify(client: &dyn RemoteClient) -> RemoteOs {
    match capture(client, UNAME_COMMAND).await {
        Ok(output) => {
            if let Some(os) = RemoteOs::from_uname(&output) {
                tracing::debug!("remote OS detected via uname: {os}");
                return os;
            }
            tracing::debug!("uname returned {:?}, trying Windows commands", output.trim());
        }
        Err(e) => tracing::debug!("uname failed: {e}"),
    }

    for command in [CMD_VERSION_COMMAND, POWERSHELL_VERSION_COMMAND] {
        match capture(client, command).await {
            Ok(output) if output.to_ascii_lowercase().contains("windows") => {
                tracing::debug!("remote OS detected as windows via {command}");
                return RemoteOs::Windows;
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("{command} failed: {e}"),
        }
    }

    tracing::warn!("could not determine remote OS");
    RemoteOs::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::{Error, OutputSink, Stage};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::Path;
    use tokio::io::AsyncWriteExt;

    /// Answers known commands with canned stdout; everything else fails.
    #[derive(Default)]
    struct Scripted {
        answers: HashMap<&'static str, &'static str>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: &[(&'static str, &'static str)]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                seen: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl RemoteClient for Scripted {
        async fn connect(&self) -> ssh::Result<()> {
            Ok(())
        }

        async fn execute(&self, command: &str, output: OutputSink<'_>) -> ssh::Result<()> {
            self.seen.lock().push(command.to_string());
            match self.answers.get(command) {
                Some(answer) => {
                    output.write_all(answer.as_bytes()).await?;
                    Ok(())
                }
                None => Err(Error::transport(Stage::Execute, "command not found")),
            }
        }

        async fn upload(&self, _local: &Path, _remote: &str) -> ssh::Result<()> {
            Ok(())
        }

        async fn close(&self) -> ssh::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn darwin_is_detected_once_and_cached() {
        let client = Scripted::new(&[(UNAME_COMMAND, "Darwin\n")]);
        let detector = OsDetector::new();

        assert_eq!(detector.detect(&client).await.unwrap(), RemoteOs::Darwin);
        assert_eq!(detector.detect(&client).await.unwrap(), RemoteOs::Darwin);
        assert_eq!(detector.cached(), Some(RemoteOs::Darwin));
        assert_eq!(*client.seen.lock(), vec![UNAME_COMMAND.to_string()]);
    }

    #[tokio::test]
    async fn windows_falls_through_to_cmd_ver() {
        let client = Scripted::new(&[(
            CMD_VERSION_COMMAND,
            "\r\nMicrosoft Windows [Version 10.0.20348]\r\n",
        )]);
        let detector = OsDetector::new();
        assert_eq!(detector.detect(&client).await.unwrap(), RemoteOs::Windows);
        assert_eq!(client.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn powershell_is_the_last_resort() {
        let client = Scripted::new(&[
            (UNAME_COMMAND, "MINGW64_NT-10.0\n"),
            (CMD_VERSION_COMMAND, ""),
            (POWERSHELL_VERSION_COMMAND, "Microsoft Windows NT 10.0.17763.0\n"),
        ]);
        assert_eq!(OsDetector::new().detect(&client).await.unwrap(), RemoteOs::Windows);
    }

    #[tokio::test]
    async fn unknown_is_an_error_and_is_cached_too() {
        let client = Scripted::new(&[(UNAME_COMMAND, "Plan9\n")]);
        let detector = OsDetector::new();
        assert!(matches!(detector.detect(&client).await, Err(Error::UnknownRemoteOs)));
        assert!(detector.detect(&client).await.is_err());
        assert_eq!(detector.cached(), Some(RemoteOs::Unknown));
        assert_eq!(client.seen.lock().len(), 3);
    }

    #[test]
    fn docker_wrapping_per_os() {
        assert_eq!(
            RemoteOs::Linux.docker_command("/usr/bin/docker", "ps -qa"),
            "/usr/bin/docker ps -qa"
        );
        assert_eq!(
            RemoteOs::Windows.docker_command(r"C:\Program Files\Docker\docker.exe", "ps -qa"),
            r#""C:\Program Files\Docker\docker.exe" ps -qa"#
        );
        assert_eq!(RemoteOs::Unknown.docker_command("docker", "ps"), "docker ps");
    }
}
