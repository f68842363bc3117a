use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Top-level CLI definition for zoekt-underhood.
#[derive(Parser, Debug)]
#[command(name = "zoekt-underhood")]
#[command(about = "Code browsing and cross-reference gateway over a code search index", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the browsing API over HTTP.
    Serve(ServeArgs),
    /// Print the cross-references of a selection as JSON.
    Xref(XrefArgs),
    /// Print one level of the file tree as JSON.
    Tree(TreeArgs),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogRotation {
    Never,
    Hourly,
    #[default]
    Daily,
}

/// Arguments for the `serve` subcommand.
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address the HTTP listener binds to.
    #[arg(long, default_value = "0.0.0.0:6080")]
    pub listen: SocketAddr,

    /// Directory holding one subdirectory per repository.
    #[arg(long, default_value = ".zoekt")]
    pub index: PathBuf,

    /// Write logs to rotating files in this directory instead of stderr.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// How often the log file in --log-dir is rotated.
    #[arg(long, value_enum, default_value_t = LogRotation::Daily)]
    pub log_rotation: LogRotation,

    /// Wall-time budget for each backend search (seconds).
    #[arg(long, default_value_t = 10)]
    pub max_wall_time_secs: u64,
}

/// Arguments for the `xref` subcommand.
#[derive(clap::Args, Debug)]
pub struct XrefArgs {
    #[arg(long, default_value = ".zoekt")]
    pub index: PathBuf,

    /// Text to find references of.
    #[arg(long)]
    pub selection: String,

    /// Ticket (`repository:path`) the selection was made in; biases ordering.
    #[arg(long)]
    pub ticket: Option<String>,

    /// yes, no or auto.
    #[arg(long)]
    pub casing: Option<String>,

    /// Lax, Boundary or Raw.
    #[arg(long)]
    pub mode: Option<String>,
}

/// Arguments for the `tree` subcommand.
#[derive(clap::Args, Debug)]
pub struct TreeArgs {
    #[arg(long, default_value = ".zoekt")]
    pub index: PathBuf,

    /// Ticket of the node to expand; empty lists repositories.
    #[arg(long, default_value = "")]
    pub top: String,
}
