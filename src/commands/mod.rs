// ABOUTME: Command module aggregator for the remotebox CLI.
// ABOUTME: Re-exports the init, exec, upload, and detect-os handlers.

mod detect;
mod exec;
mod init;

pub use detect::detect_os;
pub use exec::{exec, upload};
pub use init::init;
