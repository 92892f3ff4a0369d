// ABOUTME: Detect-os command implementation.
// ABOUTME: Prints the remote OS and which backend reached it.

use remotebox::error::Result;
use remotebox::output::Output;
use remotebox::session::RemoteSession;

pub async fn detect_os(session: &RemoteSession, output: &Output) -> Result<()> {
    let os = session.remote_os().await?;
    if let Some(backend) = session.backend() {
        output.progress(&format!("  → Reached via {backend} backend"));
    }
    output.success(&os.to_string());
    Ok(())
}
