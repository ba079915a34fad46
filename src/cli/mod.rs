use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "mobile-provisioner")]
#[command(about = "Provision a Git branch for every registered mobile app")]
#[command(long_about = "Registers mobile apps and, for each new app, creates a dedicated branch \
                       in the template repository with a marker commit pushed to origin.")]
pub struct Cli {
    /// Configuration file layered over mobile-provisioner.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a mobile app and wait until its branch is provisioned
    Create {
        /// Id of the owning user
        #[arg(long)]
        owner: i64,
        /// Display name
        #[arg(long)]
        name: String,
        /// Platform package identifier, e.g. com.example.app
        #[arg(long)]
        package: String,
        /// Semantic version
        #[arg(long)]
        version: Option<String>,
    },
    /// Queue provisioning again for an app that has no branch
    Provision {
        /// Mobile app id
        id: i64,
    },
    /// Show one mobile app
    Show {
        /// Mobile app id
        id: i64,
    },
    /// List apps still waiting for a branch
    Pending,
    /// Run workers that provision every pending app until interrupted
    Work {
        /// Seconds between sweeps for pending apps
        #[arg(long, default_value = "30")]
        interval: u64,
    },
    /// Print the effective configuration
    Config,
}
