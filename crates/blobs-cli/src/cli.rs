use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blobs",
    about = "Content-addressed blob storage with verified uploads",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML file with [store] and [ingest] tables
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the filesystem store root
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

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

#[derive(Subcommand)]
pub enum Command {
    /// Upload a file, verifying it against its digest
    Put(PutArgs),
    /// Fetch a blob to a file or stdout
    Get(GetArgs),
    /// Delete a blob
    Rm(RmArgs),
    /// Print the public URL of a blob, if the store has one
    Url(UrlArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct PutArgs {
    pub path: PathBuf,
    /// Claimed SHA-256 (hex); computed from the file when omitted
    #[arg(long)]
    pub digest: Option<String>,
    /// Claimed checksum; computed from the file when omitted
    #[arg(long)]
    pub checksum: Option<u32>,
}

#[derive(Args)]
pub struct GetArgs {
    pub digest: String,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct RmArgs {
    pub digest: String,
}

#[derive(Args)]
pub struct UrlArgs {
    pub digest: String,
}

#[derive(Args)]
pub struct ConfigArgs {}
