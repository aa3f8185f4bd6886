//! Burrow - Hierarchical registry for running tunnels
//!
//! `burrow serve` loads the tunnel file and exposes the registry over RPC;
//! the other subcommands are thin clients for a running server.

use anyhow::{Context, Result};
use burrow_config::{TunnelFactory, DEFAULT_TUNNEL_FILE};
use burrow_registry::GroupSummary;
use burrow_rpc::{RpcClient, RpcServer, TunnelInfo, DEFAULT_HOST, DEFAULT_PORT};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Burrow - Group, move and look up tunnels over RPC
#[derive(Parser, Debug)]
#[command(name = "burrow")]
#[command(about = "Hierarchical tunnel registry with an RPC front door", long_about = None)]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    serve: ServeArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the tunnel file and serve the registry (default)
    Serve,
    /// Check that the server answers
    Ping(ClientArgs),
    /// List tunnels held directly by the scoped group
    List(ClientArgs),
    /// List every tunnel in the scoped group and its descendants
    ListAllBelow(ClientArgs),
    /// List the tunnels of a child group
    ListGroup {
        /// Child group name
        group: String,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Show the immediate child groups
    Groups(ClientArgs),
    /// Show every group below the scoped group
    AllGroups(ClientArgs),
    /// Show the children of a child group
    GroupGroups {
        /// Child group name
        group: String,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Find a tunnel by identifier
    Find {
        /// Tunnel identifier
        id: String,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Find every tunnel of a type
    FindType {
        /// Tunnel type tag
        kind: String,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Move a tunnel into a child group, creating it if needed
    Move {
        /// Tunnel identifier
        id: String,
        /// Target group name
        group: String,
        #[command(flatten)]
        client: ClientArgs,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Tunnel file to load
    #[arg(short, long, env = "BURROW_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Address to bind the RPC listener on
    #[arg(long, env = "BURROW_HOST", default_value = DEFAULT_HOST, global = true)]
    host: String,

    /// Port to bind the RPC listener on
    #[arg(short, long, env = "BURROW_PORT", default_value_t = DEFAULT_PORT, global = true)]
    port: u16,
}

#[derive(Args, Debug)]
struct ClientArgs {
    /// Server address (host:port)
    #[arg(short, long, env = "BURROW_SERVER", default_value = "127.0.0.1:7676")]
    server: String,

    /// Group to address, as a slash-separated path of child names
    #[arg(long)]
    scope: Option<String>,

    /// Print raw JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let command = cli.command.unwrap_or(Commands::Serve);
    if let Err(e) = handle_command(command, cli.serve).await {
        error!("{:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn handle_serve(args: ServeArgs) -> Result<()> {
    let factory = TunnelFactory::default();

    let tunnels = match args.config {
        Some(path) => factory
            .load(&path)
            .with_context(|| format!("Failed to load tunnels from {:?}", path))?,
        None if Path::new(DEFAULT_TUNNEL_FILE).exists() => factory
            .load(Path::new(DEFAULT_TUNNEL_FILE))
            .context("Failed to load default tunnel file")?,
        None => {
            warn!(
                "No {} found, starting with an empty registry",
                DEFAULT_TUNNEL_FILE
            );
            Vec::new()
        }
    };

    let count = tunnels.len();
    let server = RpcServer::new(&args.host, args.port, tunnels).await?;
    info!(
        tunnels = count,
        "Tunnel registry ready on {}",
        server.local_addr()?
    );

    tokio::select! {
        result = server.serve() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}

async fn handle_command(command: Commands, serve: ServeArgs) -> Result<()> {
    match command {
        Commands::Serve => handle_serve(serve).await?,
        Commands::Ping(args) => {
            connect(&args).await?.ping().await?;
            println!("ok");
        }
        Commands::List(args) => {
            let ids = connect(&args).await?.list().await?;
            print_ids(&ids, args.json)?;
        }
        Commands::ListAllBelow(args) => {
            let ids = connect(&args).await?.list_all_below().await?;
            print_ids(&ids, args.json)?;
        }
        Commands::ListGroup { group, client } => {
            let ids = connect(&client).await?.list_group(&group).await?;
            print_ids(&ids, client.json)?;
        }
        Commands::Groups(args) => {
            let groups = connect(&args).await?.groups().await?;
            print_groups(&groups, args.json)?;
        }
        Commands::AllGroups(args) => {
            let groups = connect(&args).await?.all_groups().await?;
            print_groups(&groups, args.json)?;
        }
        Commands::GroupGroups { group, client } => {
            let groups = connect(&client).await?.group_groups(&group).await?;
            print_groups(&groups, client.json)?;
        }
        Commands::Find { id, client } => {
            let info = connect(&client).await?.find(&id).await?;
            print_tunnels(std::slice::from_ref(&info), client.json)?;
        }
        Commands::FindType { kind, client } => {
            let matches = connect(&client).await?.find_a_type(&kind).await?;
            print_tunnels(&matches, client.json)?;
        }
        Commands::Move { id, group, client } => {
            connect(&client).await?.move_tunnel(&id, &group).await?;
            println!("Moved {} to {}", id, group);
        }
    }

    Ok(())
}

async fn connect(args: &ClientArgs) -> Result<RpcClient> {
    let client = RpcClient::connect(&args.server).await?;
    Ok(client.with_scope(parse_scope(args.scope.as_deref())))
}

fn parse_scope(scope: Option<&str>) -> Vec<String> {
    scope
        .unwrap_or_default()
        .split('/')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn print_ids(ids: &[String], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(ids)?);
        return Ok(());
    }

    if ids.is_empty() {
        println!("No tunnels");
        return Ok(());
    }

    for id in ids {
        println!("{}", id);
    }
    Ok(())
}

fn print_groups(groups: &[GroupSummary], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(groups)?);
        return Ok(());
    }

    if groups.is_empty() {
        println!("No groups");
        return Ok(());
    }

    println!("{:<20} {:<30} GROUPS", "NAME", "TUNNELS");
    for group in groups {
        println!(
            "{:<20} {:<30} {}",
            group.name,
            group.tunnels.join(","),
            group.groups.join(",")
        );
    }
    Ok(())
}

fn print_tunnels(tunnels: &[TunnelInfo], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(tunnels)?);
        return Ok(());
    }

    println!("{:<20} {:<14} {:<7} GROUP", "ID", "TYPE", "PORT");
    for tunnel in tunnels {
        let group = if tunnel.group.is_empty() {
            "-"
        } else {
            tunnel.group.as_str()
        };
        println!(
            "{:<20} {:<14} {:<7} {}",
            tunnel.id, tunnel.kind, tunnel.port, group
        );
    }
    Ok(())
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
