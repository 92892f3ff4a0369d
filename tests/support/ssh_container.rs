// ABOUTME: One OpenSSH server container shared by the docker-backed native backend tests.
// ABOUTME: Authorizes the fixture key for a fixed user and is force-removed when the test binary exits.

use bollard::Docker;
use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, RemoveContainerOptions, StartContainerOptions,
};
use futures::TryStreamExt;
use remotebox::config::{ConnectionProfile, KnownHostsPolicy};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::AsyncReadExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const IMAGE: &str = "lscr.io/linuxserver/openssh-server:latest";
const USER: &str = "testuser";

static CONTAINER_ID: OnceLock<String> = OnceLock::new();
static SHARED: tokio::sync::OnceCell<SshContainer> = tokio::sync::OnceCell::const_new();

#[ctor::dtor]
fn remove_container() {
    let Some(id) = CONTAINER_ID.get() else {
        return;
    };
    let Ok(rt) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
        return;
    };
    rt.block_on(async {
        if let Ok(docker) = Docker::connect_with_local_defaults() {
            let force = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            let _ = docker.remove_container(id, Some(force)).await;
        }
    });
}

pub async fn shared_container() -> &'static SshContainer {
    SHARED
        .get_or_init(|| async { SshContainer::start().await.expect("start ssh container") })
        .await
}

pub struct SshContainer {
    port: u16,
}

impl SshContainer {
    async fn start() -> Result<Self, BoxError> {
        let docker = Docker::connect_with_local_defaults()?;
        let public_key = std::fs::read_to_string(super::fixture_key().with_extension("pub"))?;

        docker
            .create_image(
                Some(CreateImageOptions {
                    from_image: Some(IMAGE.into()),
                    ..Default::default()
                }),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await?;

        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
            listener.local_addr()?.port()
        };
        let binding = PortBinding {
            host_ip: Some("127.0.0.1".into()),
            host_port: Some(port.to_string()),
        };
        let body = ContainerCreateBody {
            image: Some(IMAGE.into()),
            env: Some(vec![
                format!("USER_NAME={USER}"),
                format!("PUBLIC_KEY={}", public_key.trim()),
            ]),
            host_config: Some(HostConfig {
                port_bindings: Some([("2222/tcp".to_string(), Some(vec![binding]))].into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let name = format!("remotebox-sshd-{}", std::process::id());
        let created = docker
            .create_container(
                Some(CreateContainerOptions {
                    name: Some(name),
                    ..Default::default()
                }),
                body,
            )
            .await?;
        let _ = CONTAINER_ID.set(created.id.clone());
        docker
            .start_container(&created.id, None::<StartContainerOptions>)
            .await?;

        wait_for_banner(port).await?;
        Ok(Self { port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn profile(&self, known_hosts: &Path, policy: KnownHostsPolicy) -> ConnectionProfile {
        ConnectionProfile::new("127.0.0.1")
            .user(USER)
            .port(self.port)
            .identity_candidates(vec![super::fixture_key()])
            .known_hosts(policy, known_hosts)
    }
}

/// sshd is up once it sends its version banner.
async fn wait_for_banner(port: u16) -> Result<(), BoxError> {
    for _ in 0..60 {
        if let Ok(mut stream) = tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
            let mut banner = [0u8; 4];
            let read = tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut banner));
            if matches!(read.await, Ok(Ok(_))) && &banner == b"SSH-" {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    Err("ssh container never sent a banner".into())
}
