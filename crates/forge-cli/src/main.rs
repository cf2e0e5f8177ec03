mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{ChassisCommand, Cli, Command, NodeCommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            hostname,
            database_url,
            bind,
            port,
            auth_token,
            max_time_interval,
            heartbeat_interval,
            api_url,
        } => {
            commands::serve(
                hostname,
                database_url,
                bind,
                port,
                auth_token,
                max_time_interval,
                heartbeat_interval,
                api_url,
            )
            .await
        }
        Command::Node { command } => match command {
            NodeCommand::List => commands::node_list(cli.endpoint, cli.token).await,
            NodeCommand::Show { uuid } => commands::node_show(cli.endpoint, cli.token, uuid).await,
            NodeCommand::Power { uuid, target } => {
                commands::node_power(cli.endpoint, cli.token, uuid, target).await
            }
            NodeCommand::Deploy { uuid } => {
                commands::node_deploy(cli.endpoint, cli.token, uuid).await
            }
            NodeCommand::Teardown { uuid } => {
                commands::node_teardown(cli.endpoint, cli.token, uuid).await
            }
        },
        Command::Chassis { command } => match command {
            ChassisCommand::List => commands::chassis_list(cli.endpoint, cli.token).await,
        },
    }
}
