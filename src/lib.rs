// ABOUTME: Library root for remotebox - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod output;
pub mod provision;
pub mod remote_os;
pub mod session;
pub mod ssh;
