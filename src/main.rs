use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use underhood::cli::{Cli, Commands};
use underhood::service;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => service::serve(args).await?,
        Commands::Xref(args) => print_json(&service::xref(args).await?)?,
        Commands::Tree(args) => print_json(&service::tree(args).await?)?,
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}
