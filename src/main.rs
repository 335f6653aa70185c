//! eventstate - serve, drive and draw state machine protocols.

use clap::{Parser, Subcommand};
use eventstate::echo::{self, EchoLog};
use eventstate_core::MachineDefinition;
use eventstate_protocol::WireMode;
use eventstate_transport::{connect, Config, ConnectConfig, Protocol, Server, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eventstate")]
#[command(about = "Network protocol endpoints as explicit state machines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a demo machine
    Serve {
        /// Config file (YAML)
        #[arg(short, long, env = "EVENTSTATE_CONFIG")]
        config: Option<PathBuf>,

        /// Address to bind to (overrides config)
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Machine to serve: echo, logging_echo or delayed_echo
        #[arg(short, long)]
        machine: Option<String>,

        /// Wire format: line or object
        #[arg(short, long)]
        wire: Option<WireMode>,
    },

    /// Print a machine as Graphviz DOT
    Dot {
        /// Demo machine: echo, logging_echo, delayed_echo or echo_client
        #[arg(default_value = "echo_client")]
        machine: String,

        /// Read a skeleton definition from a JSON file instead
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// State to highlight (defaults to the initial state)
        #[arg(short, long)]
        current: Option<String>,

        /// Extra graph attribute lines, e.g. "rankdir=LR;"
        #[arg(short, long = "attr")]
        attributes: Vec<String>,
    },

    /// Make noises at an echo server and print the echoes
    Echo {
        /// Server address
        #[arg(short, long, default_value = "127.0.0.1:14159")]
        server: SocketAddr,

        /// Wire format: line or object
        #[arg(short, long, default_value = "line")]
        wire: WireMode,

        /// Noises to make, in order
        #[arg(required = true)]
        noises: Vec<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            machine,
            wire,
        } => {
            let mut config = Config::load_from(config.as_deref()).map_err(|e| {
                tracing::error!("Failed to load config: {}", e);
                e
            })?;
            if let Some(bind) = bind {
                config.network.bind_addr = bind;
            }
            if let Some(machine) = machine {
                config.machine.name = machine;
            }
            if let Some(wire) = wire {
                config.machine.wire = wire;
            }
            serve(config).await
        }
        Commands::Dot {
            machine,
            file,
            current,
            attributes,
        } => {
            let attributes: Vec<&str> = attributes.iter().map(String::as_str).collect();
            let dot = match file {
                Some(path) => {
                    let json: serde_json::Value =
                        serde_json::from_str(&std::fs::read_to_string(&path)?)?;
                    let name = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or(machine);
                    MachineDefinition::<()>::from_json(name, &json)?
                        .to_dot(current.as_deref(), &attributes)
                }
                None => demo_dot(&machine, current.as_deref(), &attributes)?,
            };
            print!("{}", dot);
            Ok(())
        }
        Commands::Echo {
            server,
            wire,
            noises,
        } => {
            let protocol = echo::echo_client_protocol(wire, noises)?;
            let client = connect(ConnectConfig::new(server), protocol).await?;
            let data = client.wait().await?;
            for echo in &data.recorder {
                println!("{}", echo);
            }
            Ok(())
        }
    }
}

fn demo_dot(
    machine: &str,
    current: Option<&str>,
    attributes: &[&str],
) -> Result<String, Box<dyn std::error::Error>> {
    let dot = match machine {
        "echo" => echo::echo_server()?.to_dot(current, attributes),
        "logging_echo" => echo::logging_echo_server()?.to_dot(current, attributes),
        "delayed_echo" => {
            echo::delayed_echo_server(Config::default().machine.delay())?.to_dot(current, attributes)
        }
        "echo_client" => echo::echo_client()?.to_dot(current, attributes),
        other => return Err(format!("unknown machine '{}'", other).into()),
    };
    Ok(dot)
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let wire = config.machine.wire;
    tracing::info!("Starting eventstate server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Machine: {}", config.machine.name);
    tracing::info!("  Wire format: {}", wire);

    let server_config = ServerConfig::from(&config.network);
    let line_type = config.machine.line_type.clone();
    match config.machine.name.as_str() {
        "echo" => run_server(server_config, echo::echo_server_protocol(wire)?, line_type).await?,
        "delayed_echo" => {
            tracing::info!("  Echo delay: {:?}", config.machine.delay());
            let protocol = echo::delayed_echo_server_protocol(wire, config.machine.delay())?;
            run_server(server_config, protocol, line_type).await?
        }
        "logging_echo" => {
            let log = EchoLog::default();
            let protocol = echo::logging_echo_server_protocol(wire, Arc::clone(&log))?;
            run_server(server_config, protocol, line_type).await?;
            for line in log.lock().iter() {
                tracing::info!("  {}", line);
            }
        }
        other => {
            let err = eventstate_transport::ConfigError::ValidationError(format!(
                "unknown machine '{}'",
                other
            ));
            tracing::error!("{}", err);
            return Err(err.into());
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn run_server<D: Send + 'static>(
    config: ServerConfig,
    protocol: Protocol<D>,
    line_type: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let protocol = match line_type {
        Some(line_type) => protocol.with_line_type(line_type),
        None => protocol,
    };
    let server = Arc::new(Server::new(config, protocol));

    let shutdown_server = Arc::clone(&server);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    server.run().await?;
    Ok(())
}
