//! CLI argument definitions using clap derive

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Network-first reverse proxy with versioned offline caches.
#[derive(Parser, Debug)]
#[command(name = "offline-proxy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "OFFLINE_PROXY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the proxy
    Serve(ServeArgs),

    /// Precache the manifest and purge stale caches, then exit
    Install(UpstreamArgs),

    /// List cache stores
    Caches,
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Listen address
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    #[command(flatten)]
    pub upstream: UpstreamArgs,

    /// Keep caches in memory instead of the cache directory
    #[arg(long)]
    pub no_persist: bool,
}

#[derive(Args, Debug, Default)]
pub struct UpstreamArgs {
    /// Upstream origin, e.g. http://127.0.0.1:8000
    #[arg(short, long)]
    pub upstream: Option<String>,
}
