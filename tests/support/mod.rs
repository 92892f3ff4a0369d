// ABOUTME: Test support utilities.
// ABOUTME: Provides the SSH container, an in-process SSH server, fake ssh/scp binaries and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Once;

// Each test binary only uses some of these modules, so allow dead_code.
#[cfg(unix)]
#[allow(dead_code)]
pub mod fake_tools;
#[allow(dead_code)]
pub mod ssh_container;
#[cfg(unix)]
#[allow(dead_code)]
pub mod ssh_server;

/// Ed25519 key pair authorized by the test servers.
#[allow(dead_code)]
pub fn fixture_key() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/test_key")
}

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("remotebox=debug".parse().unwrap())
            .add_directive("russh=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}
