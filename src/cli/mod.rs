pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{config, StoreBackend};
use crate::model::{ModelRegistry, RegistryOptions};
use crate::schemas;
use crate::store::{self, DocumentStore};
use crate::tenant::CustomerRegistry;

#[derive(Parser)]
#[command(name = "campus")]
#[command(about = "Campus CLI - tenant administration and seeding for the campus store")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Customer (tenant) registration and status")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },

    #[command(about = "Seed a tenant's collections from a fixture file")]
    Seed(commands::seed::SeedArgs),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Store, entity registry and customer registry built from the process config
pub struct Backend {
    pub store: Arc<dyn DocumentStore>,
    pub registry: Arc<ModelRegistry>,
    pub customers: Arc<CustomerRegistry>,
}

impl Backend {
    pub async fn connect() -> anyhow::Result<Self> {
        let config = config();
        if config.store.backend == StoreBackend::Memory {
            tracing::warn!("Using the in-memory store; changes are lost when the command exits");
        }
        let store = store::connect(config).await?;
        let mut registry = ModelRegistry::new(store.clone(), RegistryOptions::from_config(config));
        schemas::register_all(&mut registry)?;
        Ok(Self {
            customers: Arc::new(CustomerRegistry::new(store.clone())),
            registry: Arc::new(registry),
            store,
        })
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let backend = Backend::connect().await?;

    match cli.command {
        Commands::Tenant { cmd } => commands::tenant::handle(cmd, &backend, output_format).await,
        Commands::Seed(args) => commands::seed::handle(args, &backend, output_format).await,
    }
}
