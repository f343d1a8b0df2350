// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use hal_agent::output::OutputMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hal-agent")]
#[command(about = "Build and deployment agent for Docker, rsync and AWS platforms")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new hal.yml configuration file
    Init {
        /// Default AWS region for AWS platforms
        #[arg(long)]
        region: Option<String>,

        /// Overwrite an existing hal.yml
        #[arg(short, long)]
        force: bool,
    },

    /// Parse a job file and print the stages it would run
    Validate {
        /// Path to the job file
        job: PathBuf,
    },

    /// Run a build or deploy job
    Run {
        /// Path to the job file
        job: PathBuf,

        /// Output mode (overrides hal.yml)
        #[arg(short, long, value_enum)]
        output: Option<OutputMode>,
    },
}
