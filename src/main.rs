// ABOUTME: Entry point for the remotebox CLI application.
// ABOUTME: Parses arguments, resolves the connection profile, and dispatches commands.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use remotebox::config::{ProfileResolver, Settings};
use remotebox::diagnostics::Warning;
use remotebox::error::Result;
use remotebox::output::Output;
use remotebox::session::RemoteSession;
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so remote command output on stdout stays clean.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut output = Output::new(cli.output_mode());
    output.start_timer();
    if let Err(e) = run(cli, &output).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: &Output) -> Result<()> {
    let settings = load_settings(cli.config.as_deref())?;
    let profile = ProfileResolver::from_system().settings(settings).resolve()?;
    let session = RemoteSession::new(profile);

    let result = match cli.command {
        Commands::Init => commands::init(&session, output).await,
        Commands::Exec { command } => commands::exec(&session, &command.join(" ")).await,
        Commands::Upload { local, remote } => {
            commands::upload(&session, &local, &remote, output).await
        }
        Commands::DetectOs => commands::detect_os(&session, output).await,
    };

    if let Err(e) = session.close().await {
        output.warning(&Warning::ssh_disconnect(e.to_string()).message);
    }
    result
}

fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    match explicit {
        Some(path) => Settings::load(path),
        None => Ok(Settings::discover(&env::current_dir()?)?.unwrap_or_default()),
    }
}
