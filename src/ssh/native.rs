// ABOUTME: In-process SSH backend built on russh and russh-sftp.
// ABOUTME: Owns one connection, reconnecting when it goes idle or too old.

use super::auth::{AuthResolver, Credential};
use super::client::{OutputSink, RemoteClient};
use super::compat::{self, CommandOutput, ScriptTransport};
use super::error::{Error, FallbackableError, Result, Stage, UploadSide};
use super::host_keys::HostKeyVerifier;
use super::lifecycle::{Connection, ConnectionSlot, DIAL_TIMEOUT};
use crate::config::ConnectionProfile;
use async_trait::async_trait;
use russh::client::{self, AuthResult, Config, Handle};
use russh::keys::{PrivateKeyWithHashAlg, ssh_key};
use russh::{ChannelMsg, Disconnect, MethodKind};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// russh callbacks. Only host key checking is customized.
pub(crate) struct ClientHandler {
    host: String,
    port: u16,
    verifier: Arc<HostKeyVerifier>,
}

impl client::Handler for ClientHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        self.verifier
            .verify(&self.host, self.port, server_public_key)?;
        Ok(true)
    }
}

/// An authenticated russh session.
pub(crate) struct NativeConnection {
    handle: Handle<ClientHandler>,
}

#[async_trait]
impl Connection for NativeConnection {
    async fn disconnect(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!("disconnect failed: {e}");
        }
    }
}

pub struct NativeClient {
    profile: Arc<ConnectionProfile>,
    auth: AuthResolver,
    verifier: Arc<HostKeyVerifier>,
    slot: ConnectionSlot<NativeConnection>,
}

impl std::fmt::Debug for NativeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeClient")
            .field("profile", &self.profile)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

impl NativeClient {
    pub fn new(profile: Arc<ConnectionProfile>) -> Self {
        let verifier = HostKeyVerifier::new(
            profile.known_hosts_policy,
            profile.known_hosts_path.clone(),
        );
        Self {
            profile,
            auth: AuthResolver::from_env(),
            verifier: Arc::new(verifier),
            slot: ConnectionSlot::default(),
        }
    }

    pub fn with_auth_resolver(mut self, auth: AuthResolver) -> Self {
        self.auth = auth;
        self
    }

    /// Bumped on every successful (re)connect.
    pub async fn connection_generation(&self) -> u64 {
        self.slot.generation().await
    }

    async fn live(&self) -> Result<Arc<NativeConnection>> {
        self.slot.ensure_fresh(|| self.dial()).await
    }

    async fn dial(&self) -> Result<NativeConnection> {
        let profile = &self.profile;
        if let Some(directive) = profile.unsupported_directives.first() {
            return Err(FallbackableError::UnsupportedConfigDirective(directive.clone()).into());
        }

        let credential = self.auth.resolve(&profile.identity_candidates).await?;

        let config = Config {
            keepalive_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let handler = ClientHandler {
            host: profile.hostname.clone(),
            port: profile.port,
            verifier: Arc::clone(&self.verifier),
        };

        let address = format!("{}:{}", profile.hostname, profile.port);
        tracing::debug!("connecting to {address} as {}", profile.user);
        let connecting = client::connect(
            Arc::new(config),
            (profile.hostname.as_str(), profile.port),
            handler,
        );
        let mut handle = match tokio::time::timeout(DIAL_TIMEOUT, connecting).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(Error::Protocol(e))) => {
                return Err(Error::transport(Stage::Dial, format!("connect to {address}: {e}")));
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(Error::transport(
                    Stage::Dial,
                    format!("connect to {address}: timed out after {DIAL_TIMEOUT:?}"),
                ));
            }
        };

        authenticate(&mut handle, &profile.user, credential).await?;
        tracing::debug!("authenticated to {address}");
        Ok(NativeConnection { handle })
    }
}

async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    user: &str,
    credential: Credential,
) -> Result<()> {
    let result = match credential {
        Credential::Key { path, key } => {
            tracing::debug!("authenticating with {}", path.display());
            let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
            handle
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
                .await?
        }
        Credential::Agent {
            mut client,
            identities,
        } => {
            tracing::debug!("authenticating with ssh agent ({} keys)", identities.len());
            let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
            let mut last = None;
            for key in identities {
                match handle
                    .authenticate_publickey_with(user, key, hash_alg, &mut client)
                    .await
                {
                    Ok(result) if result.success() => return Ok(()),
                    Ok(result) => last = Some(result),
                    Err(e) => tracing::debug!("agent signing failed: {e}"),
                }
            }
            match last {
                Some(result) => result,
                None => {
                    return Err(Error::AuthenticationRejected {
                        user: user.to_string(),
                    });
                }
            }
        }
    };

    match result {
        AuthResult::Success => Ok(()),
        AuthResult::Failure {
            remaining_methods, ..
        } if !remaining_methods
            .iter()
            .any(|method| *method == MethodKind::PublicKey) =>
        {
            Err(FallbackableError::UnsupportedAuthMethod(format!(
                "server accepts only {remaining_methods:?}"
            ))
            .into())
        }
        AuthResult::Failure { .. } => Err(Error::AuthenticationRejected {
            user: user.to_string(),
        }),
    }
}

#[async_trait]
impl ScriptTransport for NativeClient {
    async fn run(&self, command: &str, output: OutputSink<'_>) -> Result<CommandOutput> {
        let connection = self.live().await?;
        let mut channel = connection
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::transport(Stage::Execute, format!("open channel: {e}")))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::transport(Stage::Execute, format!("start command: {e}")))?;

        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut got_eof = false;

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => output.write_all(&data).await?,
                Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                    stderr.extend_from_slice(&data)
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = Some(exit_status);
                    if got_eof {
                        break;
                    }
                }
                Some(ChannelMsg::Eof) => {
                    got_eof = true;
                    if exit_code.is_some() {
                        break;
                    }
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }
        output.flush().await?;
        self.slot.touch().await;

        Ok(CommandOutput {
            exit_code,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        let failed = |side, reason: String| Error::Upload {
            side,
            local: local.to_path_buf(),
            remote: remote.to_string(),
            reason,
        };

        let mut source = tokio::fs::File::open(local)
            .await
            .map_err(|e| failed(UploadSide::Local, e.to_string()))?;

        let connection = self.live().await?;
        let channel = connection
            .handle
            .channel_open_session()
            .await
            .map_err(|e| failed(UploadSide::Remote, format!("open channel: {e}")))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| failed(UploadSide::Remote, format!("start sftp: {e}")))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| failed(UploadSide::Remote, format!("start sftp: {e}")))?;

        let mut target = sftp
            .open_with_flags(
                remote,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| failed(UploadSide::Remote, e.to_string()))?;

        tokio::io::copy(&mut source, &mut target)
            .await
            .map_err(|e| failed(UploadSide::Copy, e.to_string()))?;
        target
            .shutdown()
            .await
            .map_err(|e| failed(UploadSide::Copy, e.to_string()))?;

        if let Err(e) = sftp.close().await {
            tracing::debug!("closing sftp session: {e}");
        }
        self.slot.touch().await;
        Ok(())
    }
}

#[async_trait]
impl RemoteClient for NativeClient {
    async fn connect(&self) -> Result<()> {
        self.slot.connect(|| self.dial()).await.map(|_| ())
    }

    async fn execute(&self, command: &str, output: OutputSink<'_>) -> Result<()> {
        compat::execute(self, command, output).await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        self.upload_file(local, remote).await
    }

    async fn close(&self) -> Result<()> {
        self.slot.close().await;
        Ok(())
    }
}
