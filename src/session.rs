// ABOUTME: One provisioning session against a remote host.
// ABOUTME: Owns the profile, the lazily selected client, and the cached remote OS.

use crate::config::ConnectionProfile;
use crate::remote_os::{OsDetector, RemoteOs};
use crate::ssh::{self, BackendKind, ClientSelector, OutputSink, RemoteClient};
use std::path::Path;
use std::sync::Arc;

/// Not safe for uncoordinated concurrent use; callers serialize operations.
#[derive(Debug)]
pub struct RemoteSession {
    profile: Arc<ConnectionProfile>,
    selector: ClientSelector,
    detector: OsDetector,
}

impl RemoteSession {
    pub fn new(profile: ConnectionProfile) -> Self {
        let profile = Arc::new(profile);
        let selector = ClientSelector::new(Arc::clone(&profile));
        Self::with_selector(profile, selector)
    }

    /// Session using a custom backend selector.
    pub fn with_selector(profile: Arc<ConnectionProfile>, selector: ClientSelector) -> Self {
        Self {
            profile,
            selector,
            detector: OsDetector::new(),
        }
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    /// The connected client, selecting and connecting a backend on first use.
    pub async fn client(&self) -> ssh::Result<&dyn RemoteClient> {
        self.selector.obtain().await
    }

    /// Backend in use, once one has been selected.
    pub fn backend(&self) -> Option<BackendKind> {
        self.selector.backend()
    }

    pub async fn exec(&self, command: &str, output: OutputSink<'_>) -> ssh::Result<()> {
        self.client().await?.execute(command, output).await
    }

    /// Run `command` and return its stdout.
    pub async fn exec_capture(&self, command: &str) -> ssh::Result<String> {
        ssh::capture(self.client().await?, command).await
    }

    pub async fn upload(&self, local: &Path, remote: &str) -> ssh::Result<()> {
        self.client().await?.upload(local, remote).await
    }

    /// Remote OS, detected on first call only.
    pub async fn remote_os(&self) -> ssh::Result<RemoteOs> {
        let client = self.client().await?;
        self.detector.detect(client).await
    }

    pub async fn close(&self) -> ssh::Result<()> {
        self.selector.close().await
    }
}
