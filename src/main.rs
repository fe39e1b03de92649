use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use fanout::commands;
use fanout::dns::RecordType;
use fanout::lifecycle::Lifecycle;
use fanout::notice::Notice;
use fanout::proxy::{self, ProxyConfig};
use fanout::resolver::EngineConfig;
use fanout::store::DataDir;

#[derive(Parser)]
#[command(name = "fanout")]
#[command(about = "DNS proxy that races upstream servers", long_about = None)]
struct Cli {
    /// Directory holding servers.json, records.json, cache.json and blocklist.json
    #[arg(long, global = true, default_value = ".")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the proxy
    Run(RunArgs),
    /// Manage upstream servers
    #[command(subcommand)]
    Server(ServerCommand),
    /// Inspect or prune the record cache
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Manage the block list
    #[command(subcommand)]
    Block(BlockCommand),
    /// Manage static records
    #[command(subcommand)]
    Record(RecordCommand),
}

#[derive(Parser)]
struct RunArgs {
    /// Local port to listen on
    #[arg(short, long, default_value = "5353")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Last-resort upstream (ip:port) for globally routed names
    #[arg(long)]
    fallback: Option<SocketAddr>,

    /// Per-upstream timeout in milliseconds
    #[arg(long, default_value = "2000")]
    timeout_ms: u64,

    /// Hosts-format block list, as a path or http(s) URL (repeatable)
    #[arg(long = "blocklist")]
    blocklists: Vec<String>,

    /// Let non-authoritative replies win the race
    #[arg(long)]
    accept_non_authoritative: bool,

    /// Seconds between stats log lines
    #[arg(long, default_value = "60")]
    stats_interval: u64,

    /// Log every query at info level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum ServerCommand {
    /// Add a server, e.g. `server add 192.168.1.1 whitelist:corp.example port:5353`
    Add { address: String, params: Vec<String> },
    /// Change parameters of an existing server
    Update { address: String, params: Vec<String> },
    Remove { address: String },
    List,
}

#[derive(Subcommand)]
enum CacheCommand {
    List,
    /// Remove one entry; type and value disambiguate
    Remove {
        name: String,
        rtype: Option<RecordType>,
        value: Option<String>,
    },
    /// Drop expired entries
    Purge,
}

#[derive(Subcommand)]
enum BlockCommand {
    Add { domains: Vec<String> },
    Remove { domains: Vec<String> },
    Clear,
    List,
    /// Merge a hosts-format file or URL
    Load { source: String },
}

#[derive(Subcommand)]
enum RecordCommand {
    Add {
        name: String,
        rtype: RecordType,
        value: String,
        #[arg(long, default_value = "300")]
        ttl: u32,
    },
    /// Remove all records for a name, optionally of one type
    Remove { name: String, rtype: Option<RecordType> },
    List,
}

fn print_notices(notices: &[Notice]) {
    for notice in notices {
        println!("{}", notice);
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let dir = DataDir::new(&cli.data_dir);

    let notices = match cli.command {
        Command::Run(args) => {
            let ip = args.bind.parse().context("invalid bind address")?;
            let config = ProxyConfig {
                bind_addr: SocketAddr::new(ip, args.port),
                data_dir: cli.data_dir,
                upstream_timeout: Duration::from_millis(args.timeout_ms),
                engine: EngineConfig {
                    fallback: args.fallback,
                    require_authoritative: !args.accept_non_authoritative,
                },
                blocklists: args.blocklists,
                stats_interval: Duration::from_secs(args.stats_interval.max(1)),
                verbose: args.verbose,
            };
            proxy::run(config, Arc::new(Lifecycle::new())).await?;
            return Ok(());
        }
        Command::Server(ServerCommand::Add { address, params }) => {
            commands::server_add(&dir, &address, &params)?
        }
        Command::Server(ServerCommand::Update { address, params }) => {
            commands::server_update(&dir, &address, &params)?
        }
        Command::Server(ServerCommand::Remove { address }) => {
            commands::server_remove(&dir, &address)?
        }
        Command::Server(ServerCommand::List) => {
            for server in commands::server_list(&dir)? {
                println!("{}", server);
            }
            return Ok(());
        }
        Command::Cache(CacheCommand::List) => {
            for entry in commands::cache_list(&dir)? {
                println!("{}", entry);
            }
            return Ok(());
        }
        Command::Cache(CacheCommand::Remove { name, rtype, value }) => {
            commands::cache_remove(&dir, &name, rtype, value.as_deref())?
        }
        Command::Cache(CacheCommand::Purge) => commands::cache_purge(&dir)?,
        Command::Block(BlockCommand::Add { domains }) => commands::block_add(&dir, &domains)?,
        Command::Block(BlockCommand::Remove { domains }) => commands::block_remove(&dir, &domains)?,
        Command::Block(BlockCommand::Clear) => commands::block_clear(&dir)?,
        Command::Block(BlockCommand::List) => {
            for domain in commands::block_list(&dir)? {
                println!("{}", domain);
            }
            return Ok(());
        }
        Command::Block(BlockCommand::Load { source }) => commands::block_load(&dir, &source).await?,
        Command::Record(RecordCommand::Add { name, rtype, value, ttl }) => {
            commands::record_add(&dir, &name, rtype, &value, ttl)?
        }
        Command::Record(RecordCommand::Remove { name, rtype }) => {
            commands::record_remove(&dir, &name, rtype)?
        }
        Command::Record(RecordCommand::List) => {
            for record in commands::record_list(&dir)? {
                println!("{} {} {} ttl={}", record.name, record.rtype, record.value, record.ttl);
            }
            return Ok(());
        }
    };

    print_notices(&notices);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(execute(cli))
}
