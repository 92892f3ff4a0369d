// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines global flags and the init/exec/upload/detect-os subcommands.

use clap::{Parser, Subcommand};
use remotebox::output::OutputMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "remotebox")]
#[command(about = "Provision and operate a development environment on a remote machine over SSH")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (default: remotebox.yml in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Only print final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Emit JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect the remote OS and run the provisioning diagnostics
    Init,

    /// Run a command on the remote host
    Exec {
        /// Command and arguments, joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Copy a local file to the remote host
    Upload {
        /// Local file
        local: PathBuf,
        /// Destination path on the remote host
        remote: String,
    },

    /// Print the remote operating system
    DetectOs,
}
