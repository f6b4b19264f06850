use async_trait::async_trait;
use clap::Parser;
use psba_engine::{
    ClientRecord, MemoryProvisioningStore, PlanParameterCache, PlanParameters, PolicyConfig,
    PolicyEngine, PolicySnapshot, RadiusRouter, RouteError, RoutePolicy, StaticPlanParameters,
};
use radius_model::Packet;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// PSBA - Broadband subscriber RADIUS policy engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "psba")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "psba.json")]
    config_path: String,

    /// Validate configuration and exit
    #[arg(short, long)]
    validate: bool,

    /// Evaluate one JSON request document and print the reply
    #[arg(short, long, value_name = "FILE")]
    request: Option<PathBuf>,

    /// Client records and plan parameters for the in-memory store
    #[arg(short, long, value_name = "FILE")]
    fixtures: Option<PathBuf>,
}

/// Offline data for dry runs
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fixtures {
    clients: Vec<ClientRecord>,
    plan_parameters: PlanParameters,
}

impl Fixtures {
    fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Router used when no upstream transport is attached
struct UnreachableRouter;

#[async_trait]
impl RadiusRouter for UnreachableRouter {
    async fn route(&self, _: Packet, group: &str, _: &RoutePolicy) -> Result<Packet, RouteError> {
        Err(RouteError::Transport(format!(
            "no transport attached for group '{}'",
            group
        )))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load or create configuration (without logging first)
    let config = match PolicyConfig::from_file(&cli.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing_subscriber::registry()
                .with(EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer())
                .init();

            if cli.validate || Path::new(&cli.config_path).exists() {
                eprintln!("Configuration validation failed!");
                eprintln!("   Error: {}", e);
                process::exit(1);
            }

            warn!("Could not load config file from: {}", cli.config_path);
            info!("Creating example configuration at: {}", cli.config_path);

            if let Err(e) = PolicyConfig::example().to_file(&cli.config_path) {
                error!("Error creating example config: {}", e);
                process::exit(1);
            }

            info!("Please edit {} and run again", cli.config_path);
            process::exit(0);
        }
    };

    if cli.validate {
        println!("Configuration validated successfully!");
        println!();
        println!("Configuration summary:");
        println!("  Log level: {}", config.log_level.as_deref().unwrap_or("info"));
        println!("  Client lines: {}", config.clients.len());
        println!("  Realms: {}", config.realms.len());
        println!("  Profiles: {}", config.profiles.len());
        println!("  Checkers: {}", config.checkers.len());
        println!("  Proxy groups: {}", config.proxy_groups.len());
        println!("  Copy targets: {}", config.copy_targets.len());
        println!("  CDR writers: {}", config.cdr_writers.len());
        println!("  Special users: {}", config.special_users.len());
        println!();

        if !config.clients.is_empty() {
            println!("Client lines:");
            for client in &config.clients {
                let status = if client.enabled { "+" } else { "-" };
                let name = client.name.as_deref().unwrap_or("(unnamed)");
                println!("  {} {} - {}", status, client.address, name);
            }
        }
        process::exit(0);
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("PSBA policy engine v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    let fixtures = match &cli.fixtures {
        Some(path) => match Fixtures::from_file(path) {
            Ok(fixtures) => {
                info!(
                    clients = fixtures.clients.len(),
                    plans = fixtures.plan_parameters.len(),
                    "Loaded fixtures from {}",
                    path.display()
                );
                fixtures
            }
            Err(e) => {
                error!("Failed to load fixtures {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => Fixtures::default(),
    };

    let refresh_seconds = config.plan_refresh_seconds;
    let snapshot = match PolicySnapshot::build(config) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let plans = PlanParameterCache::new(Arc::new(StaticPlanParameters(fixtures.plan_parameters))).await;
    let store = Arc::new(MemoryProvisioningStore::from_records(fixtures.clients));

    let engine = match PolicyEngine::new(snapshot, store, Arc::new(UnreachableRouter), plans) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to start engine: {}", e);
            process::exit(1);
        }
    };

    if let Some(path) = &cli.request {
        let code = match evaluate_file(&engine, path).await {
            Ok(()) => 0,
            Err(e) => {
                error!("{}", e);
                1
            }
        };
        process::exit(code);
    }

    let refresh = (refresh_seconds > 0)
        .then(|| engine.plans().spawn_refresh(Duration::from_secs(refresh_seconds)));

    info!("Reading requests from stdin, one JSON document per line");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => evaluate_line(&engine, &line).await,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    engine.plans().stop();
    if let Some(handle) = refresh {
        handle.abort();
    }
    info!("Input closed, shutting down");
}

async fn evaluate_file(engine: &PolicyEngine, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let content = tokio::fs::read_to_string(path).await?;
    let request = Packet::from_json(&content)?;
    let reply = engine.handle(request).await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

async fn evaluate_line(engine: &PolicyEngine, line: &str) {
    let request = match Packet::from_json(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Ignoring malformed request: {}", e);
            return;
        }
    };

    // Failed requests get no reply line
    if let Ok(reply) = engine.handle(request).await {
        match serde_json::to_string(&reply) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to render reply: {}", e),
        }
    }
}
