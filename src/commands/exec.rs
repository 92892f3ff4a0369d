// ABOUTME: Exec and upload command implementations.
// ABOUTME: Streams remote stdout to the local terminal; copies single files.

use remotebox::error::Result;
use remotebox::output::Output;
use remotebox::session::RemoteSession;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Run `command` remotely with its stdout on ours.
pub async fn exec(session: &RemoteSession, command: &str) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let result = session.exec(command, &mut stdout).await;
    stdout.flush().await?;
    Ok(result?)
}

pub async fn upload(
    session: &RemoteSession,
    local: &Path,
    remote: &str,
    output: &Output,
) -> Result<()> {
    session.upload(local, remote).await?;
    output.success(&format!(
        "Uploaded {} to {}:{remote}",
        local.display(),
        session.profile().host
    ));
    Ok(())
}
