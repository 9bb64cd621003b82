use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vbus-demo",
    about = "Publish a live status node on the bus and serve static files",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML file with `[registry]` and `[server]` sections
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Connect, publish `status.hour`, and serve until Ctrl-C
    Run(RunArgs),
    /// Print the effective configuration as TOML
    Config(HostArgs),
}

/// Overrides applied on top of the configuration file.
#[derive(Args, Clone, Debug, Default)]
pub struct HostArgs {
    /// Service domain (first half of the service id)
    #[arg(long)]
    pub domain: Option<String>,

    /// Application name (second half of the service id)
    #[arg(long)]
    pub app: Option<String>,

    #[arg(long)]
    pub hostname: Option<String>,

    /// Directory to serve over HTTP
    #[arg(long)]
    pub static_path: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub host: HostArgs,

    /// Exit after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub duration: Option<u64>,
}
