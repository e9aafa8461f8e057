mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{CacheCommand, Cli, Command, InstanceTypesCommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, bind, port } => commands::serve(config, bind, port).await,
        Command::Status => commands::status(cli.remote, cli.token).await,
        Command::InstanceTypes { command } => match command {
            InstanceTypesCommand::List { node_class } => {
                commands::instance_types_list(node_class, cli.remote, cli.token).await
            }
        },
        Command::Cache { command } => match command {
            CacheCommand::Flush => commands::cache_flush(cli.remote, cli.token).await,
        },
    }
}
