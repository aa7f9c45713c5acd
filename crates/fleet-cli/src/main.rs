//! fleet CLI
//!
//! Command-line interface for the fleet daemon REST API.

mod commands;

use clap::{Parser, Subcommand};
use fleet_core::NodeSpec;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// fleetctl - manage nodes and jobs on a fleet cluster
#[derive(Parser, Debug)]
#[command(name = "fleetctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Daemon API address
    #[arg(long, default_value = "http://localhost:8000", global = true)]
    api: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register or update a worker node
    Register {
        /// Node identifier
        id: String,

        /// Address of the node agent
        ip: String,

        /// Port of the node agent
        #[arg(long, default_value_t = 8001)]
        port: u16,

        /// CPU core count
        #[arg(long, default_value_t = 1)]
        cpu: u32,

        /// Memory in MB
        #[arg(long, default_value_t = 1024)]
        memory: u64,
    },

    /// List nodes with live health
    Nodes,

    /// Show a node
    Node {
        /// Node identifier
        id: String,
    },

    /// Probe a node now and show diagnostics
    Ping {
        /// Node identifier
        id: String,
    },

    /// Remove a node
    Deregister {
        /// Node identifier
        id: String,
    },

    /// List containers on a node
    Containers {
        /// Node identifier
        node: String,
    },

    /// Submit a job
    Submit {
        /// Container image
        image: String,

        /// Command to run in the container
        #[arg(long)]
        command: Option<String>,

        /// Job identifier (random UUID when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// List jobs
    Jobs,

    /// Show a job
    Job {
        /// Job identifier
        id: String,
    },

    /// Retry placement of a pending job
    Dispatch {
        /// Job identifier
        id: String,
    },

    /// Delete a job and its container
    Delete {
        /// Job identifier
        id: String,
    },

    /// Show or set the scheduling strategy
    Strategy {
        /// New strategy (first_fit, round_robin, resource_aware)
        name: Option<String>,
    },

    /// Show cluster status
    Top,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let client = commands::ApiClient::new(&cli.api);

    match cli.command {
        Commands::Register {
            id,
            ip,
            port,
            cpu,
            memory,
        } => {
            let spec = NodeSpec {
                id,
                ip,
                port,
                cpu,
                memory,
            };
            commands::register(&client, spec).await?;
        }
        Commands::Nodes => {
            commands::nodes(&client).await?;
        }
        Commands::Node { id } => {
            commands::node(&client, id).await?;
        }
        Commands::Ping { id } => {
            commands::ping(&client, id).await?;
        }
        Commands::Deregister { id } => {
            commands::deregister(&client, id).await?;
        }
        Commands::Containers { node } => {
            commands::containers(&client, node).await?;
        }
        Commands::Submit { image, command, id } => {
            commands::submit(&client, image, command, id).await?;
        }
        Commands::Jobs => {
            commands::jobs(&client).await?;
        }
        Commands::Job { id } => {
            commands::job(&client, id).await?;
        }
        Commands::Dispatch { id } => {
            commands::dispatch(&client, id).await?;
        }
        Commands::Delete { id } => {
            commands::delete(&client, id).await?;
        }
        Commands::Strategy { name } => {
            commands::strategy(&client, name).await?;
        }
        Commands::Top => {
            commands::top(&client).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_defaults() {
        let cli = Cli::parse_from(["fleetctl", "register", "node-1", "10.0.0.5"]);
        match cli.command {
            Commands::Register {
                id,
                ip,
                port,
                cpu,
                memory,
            } => {
                assert_eq!(id, "node-1");
                assert_eq!(ip, "10.0.0.5");
                assert_eq!(port, 8001);
                assert_eq!(cpu, 1);
                assert_eq!(memory, 1024);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.api, "http://localhost:8000");
    }

    #[test]
    fn test_global_api_after_subcommand() {
        let cli = Cli::parse_from([
            "fleetctl",
            "submit",
            "busybox",
            "--command",
            "sleep 5",
            "--api",
            "http://10.0.0.1:8000",
        ]);
        assert_eq!(cli.api, "http://10.0.0.1:8000");
        match cli.command {
            Commands::Submit { image, command, id } => {
                assert_eq!(image, "busybox");
                assert_eq!(command.as_deref(), Some("sleep 5"));
                assert!(id.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_strategy_name_is_optional() {
        let cli = Cli::parse_from(["fleetctl", "strategy"]);
        assert!(matches!(cli.command, Commands::Strategy { name: None }));
    }
}
