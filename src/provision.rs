// ABOUTME: Provisioning workflow run when a remote environment is first set up.
// ABOUTME: Detects the remote OS and runs OS-specific diagnostic commands.

use crate::diagnostics::{Diagnostics, Warning};
use crate::remote_os::{CMD_VERSION_COMMAND, RemoteOs, UNAME_COMMAND};
use crate::session::RemoteSession;
use crate::ssh::{self, BackendKind};
use snafu::{ResultExt, Snafu};

const LINUX_RELEASE: &str = "lsb_release -is || true";
const WINDOWS_CAPTION: &str = r#"powershell -NoProfile -Command "(Get-CimInstance -ClassName Win32_OperatingSystem).Caption""#;

/// Provisioning failures that abort the run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProvisionError {
    #[snafu(display("connecting to {host} failed: {source}"))]
    Connect { host: String, source: ssh::Error },

    #[snafu(display("detecting the OS of {host} failed: {source}"))]
    Detect { host: String, source: ssh::Error },

    #[snafu(display("unsupported remote OS on {host}: no detection command recognized it"))]
    UnknownOs { host: String },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionErrorKind {
    /// The server's host key was refused.
    HostKeyRejected,
    /// No credential worked.
    Authentication,
    /// Dialing or running commands failed.
    Transport,
    /// The remote OS could not be classified.
    UnknownOs,
}

impl ProvisionError {
    pub fn kind(&self) -> ProvisionErrorKind {
        match self {
            ProvisionError::Connect { source, .. } | ProvisionError::Detect { source, .. } => {
                match source {
                    ssh::Error::HostKeyRejected { .. } => ProvisionErrorKind::HostKeyRejected,
                    ssh::Error::AuthenticationExhausted
                    | ssh::Error::AuthenticationRejected { .. } => {
                        ProvisionErrorKind::Authentication
                    }
                    _ => ProvisionErrorKind::Transport,
                }
            }
            ProvisionError::UnknownOs { .. } => ProvisionErrorKind::UnknownOs,
        }
    }
}

/// What a successful `initialize` found.
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub os: RemoteOs,
    pub backend: Option<BackendKind>,
    /// Each diagnostic command that succeeded with its whitespace-normalized output.
    pub outputs: Vec<(String, String)>,
}

/// Diagnostic commands for a remote OS. Unknown hosts get none.
pub fn provisioning_commands(os: RemoteOs, docker_path: &str) -> Vec<String> {
    let docker = os.docker_command(docker_path, "ps -qa");
    match os {
        RemoteOs::Linux | RemoteOs::Darwin => {
            vec![UNAME_COMMAND.to_string(), LINUX_RELEASE.to_string(), docker]
        }
        RemoteOs::Windows => vec![
            CMD_VERSION_COMMAND.to_string(),
            WINDOWS_CAPTION.to_string(),
            docker,
        ],
        RemoteOs::Unknown => Vec::new(),
    }
}

/// Connect, classify the remote OS, and run its diagnostic commands.
///
/// Individual command failures are recorded in `diagnostics` and do not stop the run.
pub async fn initialize(
    session: &RemoteSession,
    diagnostics: &mut Diagnostics,
) -> Result<ProvisionReport, ProvisionError> {
    let host = session.profile().host.as_str();

    session.client().await.context(ConnectSnafu { host })?;

    let os = match session.remote_os().await {
        Ok(os) => os,
        Err(ssh::Error::UnknownRemoteOs) => return UnknownOsSnafu { host }.fail(),
        Err(source) => return Err(source).context(DetectSnafu { host }),
    };
    tracing::info!("{host} runs {os}");

    let mut outputs = Vec::new();
    for command in provisioning_commands(os, &session.profile().docker_path) {
        match session.exec_capture(&command).await {
            Ok(output) => {
                let normalized = output.split_whitespace().collect::<Vec<_>>().join(" ");
                tracing::info!("{command}: {normalized}");
                outputs.push((command, normalized));
            }
            Err(e) => {
                tracing::error!("{command} failed on {host}: {e}");
                diagnostics.warn(Warning::provision_command(&command, &e));
            }
        }
    }

    Ok(ProvisionReport {
        os,
        backend: session.backend(),
        outputs,
    })
}
