//! `streakforge serve`: wires store, engine, sweeper and API together.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use streakforge::api::{self, ApiState};
use streakforge::combo::spawn_sweeper;
use streakforge::config::EngineConfig;
use streakforge::engine::RewardEngine;
use streakforge::events::{forward, ChannelDispatcher, TracingDispatcher};
use streakforge::store::{MemoryStore, RewardStore, SledStore};

/// Command-line overrides for `serve`
#[derive(Debug, Default)]
struct ServeOptions {
    config_path: Option<PathBuf>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
    memory: bool,
}

enum ServeCommand {
    Run(ServeOptions),
    Help,
}

fn parse_args(args: &[String]) -> anyhow::Result<ServeCommand> {
    let mut options = ServeOptions::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    bail!("--config needs a path");
                };
                options.config_path = Some(PathBuf::from(path));
            }
            "--port" | "-p" => {
                i += 1;
                let Some(port) = args.get(i) else {
                    bail!("--port needs a value");
                };
                options.port = Some(port.parse().with_context(|| format!("invalid port: {port}"))?);
            }
            "--data-dir" | "-d" => {
                i += 1;
                let Some(dir) = args.get(i) else {
                    bail!("--data-dir needs a path");
                };
                options.data_dir = Some(PathBuf::from(dir));
            }
            "--memory" => options.memory = true,
            "--help" | "-h" => return Ok(ServeCommand::Help),
            other => bail!("unknown option: {other}"),
        }
        i += 1;
    }

    Ok(ServeCommand::Run(options))
}

fn print_help() {
    println!("USAGE:");
    println!("    streakforge serve [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <FILE>         TOML config (default: built-in defaults)");
    println!("    -p, --port <PORT>           HTTP port (default: 8080)");
    println!("    -d, --data-dir <DIR>        Database directory (default: ~/.streakforge)");
    println!("        --memory                Keep state in memory only");
    println!("    -h, --help                  Print help");
}

fn load_config(options: &ServeOptions) -> anyhow::Result<EngineConfig> {
    let mut config = match &options.config_path {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(port) = options.port {
        config.server.port = port;
    }
    if let Some(dir) = &options.data_dir {
        config.server.data_dir.clone_from(dir);
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let options = match parse_args(&args)? {
        ServeCommand::Help => {
            print_help();
            return Ok(());
        }
        ServeCommand::Run(options) => options,
    };

    // Initialize logging with EnvFilter to support RUST_LOG
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&options)?;
    info!("Streakforge v{}", streakforge::VERSION);

    if options.memory {
        warn!("Using in-memory store; state is lost on exit");
        serve(Arc::new(MemoryStore::new()), config).await
    } else {
        let dir = &config.server.data_dir;
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let store = SledStore::open(&dir.join("db")).context("opening reward store")?;
        let result = serve(Arc::new(store.clone()), config).await;
        store.flush()?;
        result
    }
}

async fn serve<S>(store: Arc<S>, config: EngineConfig) -> anyhow::Result<()>
where
    S: RewardStore + 'static,
{
    let (dispatcher, events) = ChannelDispatcher::new(config.server.event_queue);
    let consumer = forward(events, TracingDispatcher);

    let engine = Arc::new(RewardEngine::new(store, &config, Arc::new(dispatcher)));
    let sweeper = spawn_sweeper(Arc::clone(engine.combos()));
    let state = Arc::new(ApiState::new(Arc::clone(&engine), config.rng_seed));
    let server = tokio::spawn(api::start_api_server(state, config.server.port));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    server.abort();
    sweeper.shutdown().await;
    drop(engine);
    // Remaining senders die with the aborted server task
    match tokio::time::timeout(Duration::from_secs(2), consumer).await {
        Ok(Ok(delivered)) => info!(delivered, "event consumer drained"),
        Ok(Err(e)) => warn!("event consumer failed: {}", e),
        Err(_) => warn!("event consumer did not drain in time"),
    }
    Ok(())
}
