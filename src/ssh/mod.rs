// ABOUTME: Remote execution client with native (russh) and shell (ssh/scp) backends.
// ABOUTME: Host key policy, credential resolution, connection lifecycle and backend fallback.

mod auth;
mod client;
pub mod compat;
mod error;
mod host_keys;
mod lifecycle;
mod native;
mod selector;
mod shell;

pub use auth::{AuthResolver, Credential, DEFAULT_KEY_NAMES};
pub use client::{BackendKind, OutputSink, RemoteClient, capture};
pub use error::{Error, FallbackableError, HostKeyRejection, Result, Stage, UploadSide};
pub use host_keys::HostKeyVerifier;
pub use lifecycle::{
    Connection, ConnectionSlot, DIAL_TIMEOUT, MAX_IDLE, MAX_LIFETIME, SessionLifecycle,
};
pub use native::NativeClient;
pub use selector::{BackendFactory, ClientSelector, ProfileBackends};
pub use shell::ShellClient;
