use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "metamerge",
    about = "Merge metadata fragments from independent pipelines",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ResolverArg {
    Strict,
    Interactive,
    PreferFirst,
    PreferSecond,
    Join,
}

#[derive(Subcommand)]
pub enum Command {
    /// Merge two or more JSON metadata documents, left to right
    Merge(MergeArgs),
    /// Print the effective merge configuration as TOML
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct MergeArgs {
    /// Input documents; the first one wins key order and list order
    #[arg(required = true, num_args = 2..)]
    pub inputs: Vec<PathBuf>,
    #[arg(short, long)]
    pub output: PathBuf,
    /// TOML file with merge settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub resolver: Option<ResolverArg>,
    /// Override the timestamp tolerance, in seconds
    #[arg(long)]
    pub tolerance_secs: Option<u64>,
    /// Write the decision log as JSON
    #[arg(long)]
    pub decisions: Option<PathBuf>,
    /// Replace output files that already exist
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
