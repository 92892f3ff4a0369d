// ABOUTME: Chooses between the native and shell backends, once per session.
// ABOUTME: Falls back to the shell backend only for failures the native client cannot handle.

use super::client::{BackendKind, RemoteClient};
use super::error::Result;
use super::native::NativeClient;
use super::shell::ShellClient;
use crate::config::ConnectionProfile;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Creates unconnected backends.
pub trait BackendFactory: Send + Sync {
    fn native(&self) -> Box<dyn RemoteClient>;
    fn shell(&self) -> Box<dyn RemoteClient>;
}

/// Builds both backends from one profile.
#[derive(Debug, Clone)]
pub struct ProfileBackends {
    profile: Arc<ConnectionProfile>,
}

impl ProfileBackends {
    pub fn new(profile: Arc<ConnectionProfile>) -> Self {
        Self { profile }
    }
}

impl BackendFactory for ProfileBackends {
    fn native(&self) -> Box<dyn RemoteClient> {
        Box::new(NativeClient::new(Arc::clone(&self.profile)))
    }

    fn shell(&self) -> Box<dyn RemoteClient> {
        Box::new(ShellClient::new(Arc::clone(&self.profile)))
    }
}

type Selected = (BackendKind, Box<dyn RemoteClient>);

pub struct ClientSelector {
    use_native: bool,
    factory: Box<dyn BackendFactory>,
    selected: OnceCell<Selected>,
}

impl std::fmt::Debug for ClientSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSelector")
            .field("use_native", &self.use_native)
            .field("backend", &self.backend())
            .finish_non_exhaustive()
    }
}

impl ClientSelector {
    pub fn new(profile: Arc<ConnectionProfile>) -> Self {
        let use_native = profile.use_native;
        Self::with_factory(use_native, ProfileBackends::new(profile))
    }

    pub fn with_factory(use_native: bool, factory: impl BackendFactory + 'static) -> Self {
        Self {
            use_native,
            factory: Box::new(factory),
            selected: OnceCell::new(),
        }
    }

    /// The connected client for this session, selecting one on first use.
    pub async fn obtain(&self) -> Result<&dyn RemoteClient> {
        let (_, client) = self.selected.get_or_try_init(|| self.select()).await?;
        Ok(client.as_ref())
    }

    /// Backend chosen so far, if any.
    pub fn backend(&self) -> Option<BackendKind> {
        self.selected.get().map(|(kind, _)| *kind)
    }

    /// Close the selected backend. The selection itself is kept.
    pub async fn close(&self) -> Result<()> {
        match self.selected.get() {
            Some((_, client)) => client.close().await,
            None => Ok(()),
        }
    }

    async fn select(&self) -> Result<Selected> {
        if !self.use_native {
            tracing::debug!("native SSH client disabled, using ssh binary");
            return self.connect_shell().await;
        }

        let native = self.factory.native();
        match native.connect().await {
            Ok(()) => Ok((BackendKind::Native, native)),
            Err(e) if e.is_fallbackable() => {
                tracing::warn!("native SSH client cannot handle this host ({e}), using ssh binary");
                if let Err(close_err) = native.close().await {
                    tracing::debug!("closing native client: {close_err}");
                }
                self.connect_shell().await
            }
            Err(e) => Err(e),
        }
    }

    async fn connect_shell(&self) -> Result<Selected> {
        let shell = self.factory.shell();
        shell.connect().await?;
        Ok((BackendKind::Shell, shell))
    }
}
