//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{CloudProvider, RunnerKind};
use crate::error::Result;
use crate::mothergoose::MotherGooseClient;

/// Gosling - `GitLab` runner fleet configuration for `MotherGoose`.
#[derive(Parser, Debug)]
#[command(name = "gosling")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new Gosling repository.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Add an egg or a job from a template.
    Add {
        /// What to add.
        #[command(subcommand)]
        command: AddCommands,
    },

    /// Validate Fly configuration files.
    Validate {
        /// Single file to validate.
        #[arg(conflicts_with = "all")]
        file: Option<PathBuf>,

        /// Validate every `.fly` file in the repository.
        #[arg(short, long)]
        all: bool,
    },

    /// Deploy every egg of the repository to `MotherGoose`.
    Deploy {
        /// Target cloud provider.
        #[arg(long)]
        cloud: CloudProvider,

        /// Target region.
        #[arg(long)]
        region: String,

        /// Build plans without submitting anything.
        #[arg(long)]
        dry_run: bool,

        /// Keep deploying after an egg fails.
        #[arg(long)]
        continue_on_error: bool,

        /// `MotherGoose` connection.
        #[command(flatten)]
        api: ApiArgs,
    },

    /// Roll an egg back to an earlier deployment plan.
    Rollback {
        /// Egg to roll back.
        #[arg(long)]
        egg: String,

        /// Plan ID to roll back to (defaults to the previous applied plan).
        #[arg(long)]
        to: Option<String>,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// `MotherGoose` connection.
        #[command(flatten)]
        api: ApiArgs,
    },

    /// Show deployment status.
    #[command(group = clap::ArgGroup::new("target").required(true).args(["egg", "all"]))]
    Status {
        /// Egg to show.
        #[arg(long)]
        egg: Option<String>,

        /// Show every egg.
        #[arg(long)]
        all: bool,

        /// `MotherGoose` connection.
        #[command(flatten)]
        api: ApiArgs,
    },

    /// Parse a Fly file and print its AST as JSON.
    Parse {
        /// File to parse.
        file: PathBuf,

        /// Require every top-level block to have this type.
        #[arg(long = "type", value_parser = ["egg", "eggsbucket", "job", "uglyfox", "mothergoose"])]
        block_type: Option<String>,
    },
}

/// `add` subcommands.
#[derive(Subcommand, Debug)]
pub enum AddCommands {
    /// Add an egg under `Eggs/<name>/config.fly`.
    Egg {
        /// Egg name.
        name: String,

        /// Runner type.
        #[arg(long = "type", default_value = "vm")]
        runner_type: RunnerKind,

        /// Cloud provider.
        #[arg(long, default_value = "yandex")]
        provider: CloudProvider,

        /// Region (defaults to the provider's default region).
        #[arg(long)]
        region: Option<String>,
    },

    /// Add a job under `Jobs/<name>.fly`.
    Job {
        /// Job name.
        name: String,

        /// Cron schedule.
        #[arg(long)]
        schedule: Option<String>,
    },
}

/// Connection flags shared by the commands that talk to `MotherGoose`.
#[derive(Args, Debug, Clone)]
pub struct ApiArgs {
    /// `MotherGoose` API URL.
    #[arg(long, env = "MOTHERGOOSE_API_URL")]
    pub api_url: String,

    /// `MotherGoose` API key.
    #[arg(long, env = "MOTHERGOOSE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Per-attempt timeout in seconds.
    #[arg(
        long,
        env = "MOTHERGOOSE_TIMEOUT_SECS",
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: u64,

    /// Retries after the first attempt.
    #[arg(long, env = "MOTHERGOOSE_MAX_RETRIES", default_value = "3")]
    pub max_retries: u32,
}

impl ApiArgs {
    /// Builds a client from the flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or key is invalid.
    pub fn client(&self) -> Result<MotherGooseClient> {
        let client = MotherGooseClient::builder(&self.api_url, &self.api_key)
            .timeout(Duration::from_secs(self.timeout))
            .max_retries(self.max_retries)
            .build()?;
        Ok(client)
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per log line.
    Json,
}
