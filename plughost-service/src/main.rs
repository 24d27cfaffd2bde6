//! plughost service
//!
//! Runs the plugin host until interrupted, or inspects and drives it from
//! the command line:
//! - `serve`: load every installed plugin and wait for Ctrl-C
//! - `list`, `resolve`, `cycles`: read manifests without loading anything
//! - `run`, `call`: load plugins, then run a workflow or a single tool

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

use plughost_core::HostConfig;
use plughost_plugins::{PluginMetadata, PluginSystem};

#[derive(Parser, Debug)]
#[command(name = "plughost")]
#[command(about = "Plugin host: lifecycle, dependency resolution and workflows")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Data directory (plugins and plugin storage live below it)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Load all plugins and run until Ctrl-C
    Serve,
    /// List installed plugin manifests
    List,
    /// Show the dependency-first load order for a plugin
    Resolve {
        id: String,
    },
    /// Report dependency cycles from one plugin, or from all of them
    Cycles {
        id: Option<String>,
    },
    /// Execute a workflow
    Run {
        workflow: String,
        /// Inputs as a JSON object
        #[arg(long, default_value = "{}")]
        inputs: String,
    },
    /// Execute a single tool
    Call {
        tool: String,
        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("plughost=info".parse()?)
        .add_directive("plughost_plugins=info".parse()?)
        .add_directive("plughost_workflows=info".parse()?)
        .add_directive("plugin=info".parse()?);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from /etc/plughost/environment (if exists)
    plughost_core::config::load_environment();

    let args = Args::parse();
    init_tracing(args.json)?;

    let mut config = HostConfig::from_env();
    if let Some(dir) = args.data_dir {
        let from_env = config;
        config = HostConfig {
            secret_key: from_env.secret_key,
            http_timeout_secs: from_env.http_timeout_secs,
            user_agent: from_env.user_agent,
            enforce_dependencies: from_env.enforce_dependencies,
            ..HostConfig::with_data_dir(dir)
        };
    }

    let system = PluginSystem::new(config).await?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let report = system.initialize().await?;
            for (id, error) in &report.failed {
                warn!(plugin_id = %id, "Not loaded: {}", error);
            }
            info!(loaded = report.loaded.len(), "plughost running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            system.shutdown().await;
        }
        Commands::List => {
            let loader = system.loader();
            loader.scan().await?;
            let resolver = loader.resolver().read().await;
            let manifests: Vec<&PluginMetadata> = resolver
                .plugin_ids()
                .iter()
                .filter_map(|id| resolver.get(id))
                .collect();
            print_json(&manifests)?;
        }
        Commands::Resolve { id } => {
            system.loader().scan().await?;
            let result = system.loader().resolver().read().await.resolve(&id);
            print_json(&result)?;
        }
        Commands::Cycles { id } => {
            system.loader().scan().await?;
            let resolver = system.loader().resolver().read().await;
            let cycles = match id {
                Some(id) => resolver.detect_cycles(&id),
                None => resolver.detect_all_cycles(),
            };
            print_json(&cycles)?;
        }
        Commands::Run { workflow, inputs } => {
            let inputs: HashMap<String, Value> =
                serde_json::from_str(&inputs).context("--inputs must be a JSON object")?;
            system.initialize().await?;
            let result = system.engine().execute(&workflow, inputs).await;
            system.shutdown().await;
            print_json(&result?)?;
        }
        Commands::Call { tool, params } => {
            let params: Value =
                serde_json::from_str(&params).context("--params must be valid JSON")?;
            system.initialize().await?;
            let result = system.engine().execute_tool(&tool, params).await;
            system.shutdown().await;
            print_json(&result?)?;
        }
    }

    Ok(())
}
