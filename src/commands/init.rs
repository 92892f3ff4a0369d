// ABOUTME: Init command implementation.
// ABOUTME: Runs the provisioning workflow and reports what it found.

use remotebox::diagnostics::Diagnostics;
use remotebox::error::Result;
use remotebox::output::Output;
use remotebox::provision;
use remotebox::session::RemoteSession;

pub async fn init(session: &RemoteSession, output: &Output) -> Result<()> {
    let mut diag = Diagnostics::default();
    output.progress(&format!("  → Connecting to {}...", session.profile().host));

    let result = provision::initialize(session, &mut diag).await;

    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let report = result?;
    for (command, text) in &report.outputs {
        output.progress(&format!("  {command}: {text}"));
    }

    let backend = report
        .backend
        .map_or_else(|| "unknown".to_string(), |b| b.to_string());
    output.success(&format!(
        "Initialized {} ({}, {backend} backend)",
        session.profile().host,
        report.os
    ));
    Ok(())
}
