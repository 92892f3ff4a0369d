// ABOUTME: Collector for non-fatal problems hit while provisioning a remote host.
// ABOUTME: Failed diagnostic commands and unclean disconnects are recorded, not raised.

/// Non-fatal warnings gathered during one run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, logging it as it arrives.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A provisioning command that failed without aborting the run.
    pub fn provision_command(command: &str, error: impl std::fmt::Display) -> Self {
        Self {
            kind: WarningKind::ProvisionCommand,
            message: format!("provisioning command `{command}` failed: {error}"),
        }
    }

    pub fn ssh_disconnect(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::SshDisconnect,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// A diagnostic command on the remote host failed.
    ProvisionCommand,
    /// Closing the connection did not go cleanly.
    SshDisconnect,
}
