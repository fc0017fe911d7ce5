//! Courier Server - city courier dispatch backend
//!
//! Usage:
//!   courier-server [serve] [--bind ADDR] [--seed N] [--console]
//!   courier-server map [--seed N] [--format compact|detailed|json]
//!   courier-server agent --server ADDR <register|work|position|complete|status|deregister>

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use courier_city::MapFormat;
use courier_protocol::{AgentType, GraphIndex, Response, ResponsePayload, Rgb};
use courier_server::{
    build_dispatch, console, AgentClient, Backend, ConfigOverrides, ServerConfig,
};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "courier-server", version, about = "City courier dispatch backend")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error). RUST_LOG wins when set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the backend (default).
    Serve(ServeArgs),
    /// Build a city from the config and print it.
    Map {
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, value_enum, default_value_t = MapOutput::Compact)]
        format: MapOutput,
    },
    /// Send one request to a running server.
    Agent {
        /// Server address.
        #[arg(long, default_value = "127.0.0.1:5555")]
        server: String,
        /// Request frame length the server expects.
        #[arg(long, default_value_t = courier_protocol::DEFAULT_FRAME_LEN)]
        frame_len: usize,
        #[command(subcommand)]
        action: AgentAction,
    },
}

#[derive(clap::Args, Debug, Default)]
struct ServeArgs {
    /// Listen address, overriding the config file.
    #[arg(long)]
    bind: Option<String>,
    /// Random seed, overriding the config file.
    #[arg(long)]
    seed: Option<u64>,
    /// Show the status console instead of log output.
    #[arg(long)]
    console: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MapOutput {
    Compact,
    Detailed,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AgentKind {
    FastLoad,
    SlowLoad,
}

#[derive(Subcommand, Debug)]
enum AgentAction {
    Register {
        name: String,
        #[arg(long, value_enum, default_value_t = AgentKind::FastLoad)]
        kind: AgentKind,
        /// Color as r,g,b in [0, 1].
        #[arg(long, default_value = "1,0,0", value_parser = parse_rgb)]
        color: Rgb,
    },
    Work {
        name: String,
    },
    Position {
        name: String,
        start: usize,
        end: usize,
        fraction: f32,
    },
    Complete {
        name: String,
    },
    Status {
        name: String,
        text: String,
    },
    Deregister {
        name: String,
    },
}

fn parse_rgb(s: &str) -> Result<Rgb, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("'{p}': {e}")))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [r, g, b] => Ok(Rgb::new(*r, *g, *b)),
        _ => Err("expected three comma-separated channels".into()),
    }
}

fn init_tracing(level: &str, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = if quiet {
        BoxMakeWriter::new(std::io::sink)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    let console_mode = matches!(&command, Command::Serve(args) if args.console);
    init_tracing(&cli.log_level, console_mode);

    match command {
        Command::Serve(args) => serve(cli.config, args).await,
        Command::Map { seed, format } => print_map(cli.config, seed, format),
        Command::Agent {
            server,
            frame_len,
            action,
        } => run_agent(AgentClient::new(server).with_frame_len(frame_len), action).await,
    }
}

fn load_config(path: Option<PathBuf>, overrides: &ConfigOverrides) -> anyhow::Result<ServerConfig> {
    let (mut config, source) = ServerConfig::load(path.as_deref())?;
    match &source {
        Some(p) => tracing::info!(path = %p.display(), "Loaded config"),
        None => tracing::info!("No config file found, using defaults"),
    }
    config.apply(overrides);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn serve(config_path: Option<PathBuf>, args: ServeArgs) -> anyhow::Result<()> {
    let config = load_config(
        config_path,
        &ConfigOverrides {
            bind: args.bind,
            seed: args.seed,
        },
    )?;

    let (dispatch, seed) = build_dispatch(&config).context("building the city")?;
    tracing::info!(
        seed,
        nodes = dispatch.graph().node_count(),
        edges = dispatch.graph().edge_count(),
        "City ready"
    );

    let mut backend = Backend::launch(&config, dispatch)
        .await
        .with_context(|| format!("starting server on {}", config.server.bind))?;
    tracing::info!(addr = %backend.addr, "Courier dispatch running");

    if args.console {
        let handle = backend.handle.clone();
        tokio::select! {
            res = console::run_status_console(handle) => res?,
            res = backend.wait() => res?,
        }
    } else {
        tokio::select! {
            res = backend.wait() => res?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
            }
        }
    }

    backend.shutdown();
    Ok(())
}

fn print_map(
    config_path: Option<PathBuf>,
    seed: Option<u64>,
    format: MapOutput,
) -> anyhow::Result<()> {
    let config = load_config(config_path, &ConfigOverrides { bind: None, seed })?;
    let (dispatch, seed) = build_dispatch(&config).context("building the city")?;
    let graph = dispatch.graph();

    match format {
        MapOutput::Compact => print!("{}", graph.render(MapFormat::Compact)),
        MapOutput::Detailed => print!("{}", graph.render(MapFormat::Detailed)),
        MapOutput::Json => {
            let activation: Vec<_> = graph.activation_sequence().collect();
            let doc = serde_json::json!({
                "seed": seed,
                "graph": graph,
                "activation": activation,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }
    Ok(())
}

async fn run_agent(client: AgentClient, action: AgentAction) -> anyhow::Result<()> {
    let response = match action {
        AgentAction::Register { name, kind, color } => {
            let agent_type = match kind {
                AgentKind::FastLoad => AgentType::FastLoadSlowMove,
                AgentKind::SlowLoad => AgentType::SlowLoadFastMove,
            };
            let registered = client.register(&name, color, agent_type).await?;
            let map = registered.parse_map()?;
            println!(
                "registered at node {} ({} nodes, {} edges)",
                registered.node,
                map.node_count(),
                map.edge_count()
            );
            return Ok(());
        }
        AgentAction::Work { name } => client.request_work(&name).await?,
        AgentAction::Position {
            name,
            start,
            end,
            fraction,
        } => {
            client
                .update_position(&name, GraphIndex(start), GraphIndex(end), fraction)
                .await?
        }
        AgentAction::Complete { name } => client.complete_task(&name).await?,
        AgentAction::Status { name, text } => client.update_status(&name, &text).await?,
        AgentAction::Deregister { name } => client.deregister(&name).await?,
    };
    print_response(&response);
    Ok(())
}

fn print_response(response: &Response) {
    match &response.payload {
        ResponsePayload::Work {
            task_name,
            destination,
        } => println!("{}: '{}' to node {}", response.status, task_name.trim_end(), destination),
        _ => println!("{}", response.status),
    }
}
