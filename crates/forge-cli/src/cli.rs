use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "forge", about = "Bare-metal provisioning conductor", version)]
pub struct Cli {
    /// API endpoint for client commands.
    #[arg(
        long,
        global = true,
        env = "FORGE_ENDPOINT",
        default_value = "http://127.0.0.1:6440"
    )]
    pub endpoint: String,

    /// Bearer token for client commands.
    #[arg(long, global = true, env = "FORGE_TOKEN")]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the conductor service and its API.
    Serve {
        /// Fleet-unique hostname; defaults to $HOSTNAME.
        #[arg(long, env = "FORGE_HOSTNAME")]
        hostname: Option<String>,

        /// Postgres URL; omit to run on the in-memory store.
        #[arg(long, env = "FORGE_DATABASE_URL")]
        database_url: Option<String>,

        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        #[arg(long, default_value_t = 6440)]
        port: u16,

        #[arg(long, env = "FORGE_AUTH_TOKEN")]
        auth_token: String,

        /// Seconds after which peers consider a silent conductor dead.
        #[arg(long, default_value_t = 120)]
        max_time_interval: u64,

        /// Seconds between conductor heartbeats.
        #[arg(long, default_value_t = 30)]
        heartbeat_interval: u64,

        /// Advertised API URL, if the bind address is not reachable as-is.
        #[arg(long, env = "FORGE_API_URL")]
        api_url: Option<String>,
    },

    /// Node operations against a running API.
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// Chassis operations against a running API.
    Chassis {
        #[command(subcommand)]
        command: ChassisCommand,
    },
}

#[derive(Subcommand)]
pub enum NodeCommand {
    /// List registered nodes.
    List,
    /// Show one node in full.
    Show { uuid: Uuid },
    /// Request a power state change (on | off).
    Power { uuid: Uuid, target: String },
    /// Start deployment.
    Deploy { uuid: Uuid },
    /// Tear the deployment down.
    Teardown { uuid: Uuid },
}

#[derive(Subcommand)]
pub enum ChassisCommand {
    /// List chassis.
    List,
}
