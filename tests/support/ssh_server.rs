// ABOUTME: In-process russh server and ssh-agent for native backend tests that run without docker.
// ABOUTME: The server accepts any public key and answers `exec` by echoing the command back.

use remotebox::config::{ConnectionProfile, KnownHostsPolicy};
use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::{Algorithm, PrivateKey, PublicKey};
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::{TcpListener, UnixListener};

pub const TEST_USER: &str = "tester";

/// A listening server. Dropping it stops accepting new connections.
pub struct TestServer {
    port: u16,
    host_key: PublicKey,
    accept: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let host_key = key.public_key().clone();
        let config = Arc::new(server::Config {
            keys: vec![key],
            auth_rejection_time: std::time::Duration::ZERO,
            auth_rejection_time_initial: Some(std::time::Duration::ZERO),
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    match server::run_stream(config, socket, EchoHandler::default()).await {
                        Ok(session) => {
                            let _ = session.await;
                        }
                        Err(e) => tracing::debug!("test server handshake ended: {e}"),
                    }
                });
            }
        });

        Self {
            port,
            host_key,
            accept,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host_key(&self) -> &PublicKey {
        &self.host_key
    }

    pub fn profile(&self, known_hosts: &Path, policy: KnownHostsPolicy) -> ConnectionProfile {
        ConnectionProfile::new("127.0.0.1")
            .user(TEST_USER)
            .port(self.port)
            .identity_candidates(vec![super::fixture_key()])
            .known_hosts(policy, known_hosts)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

#[derive(Default)]
struct EchoHandler {
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl server::Handler for EchoHandler {
    type Error = russh::Error;

    async fn auth_publickey(&mut self, _: &str, _: &PublicKey) -> Result<Auth, Self::Error> {
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.channel_success(channel)?;
        let mut reply = data.to_vec();
        reply.push(b'\n');
        session.data(channel, CryptoVec::from(reply))?;
        session.exit_status_request(channel, 0)?;
        session.eof(channel)?;
        session.close(channel)?;
        self.channels.remove(&channel);
        Ok(())
    }
}

/// An ssh-agent on a unix socket holding the fixture key.
pub struct TestAgent {
    socket: PathBuf,
    serve: tokio::task::JoinHandle<()>,
}

impl TestAgent {
    pub async fn start(dir: &Path) -> Self {
        let socket = dir.join("agent.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let incoming = futures::stream::poll_fn(move |cx| {
            listener
                .poll_accept(cx)
                .map(|accepted| Some(accepted.map(|(stream, _)| stream)))
        });
        let serve = tokio::spawn(async move {
            let _ = russh::keys::agent::server::serve(incoming, ()).await;
        });

        let key = russh::keys::load_secret_key(super::fixture_key(), None).unwrap();
        let mut client = russh::keys::agent::client::AgentClient::connect_uds(&socket)
            .await
            .unwrap();
        client.add_identity(&key, &[]).await.unwrap();

        Self { socket, serve }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }
}

impl Drop for TestAgent {
    fn drop(&mut self) {
        self.serve.abort();
    }
}
