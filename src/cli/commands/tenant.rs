use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::{Backend, OutputFormat};

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "List all customers")]
    List,

    #[command(about = "Register a new customer")]
    Register {
        #[arg(help = "Display name")]
        name: String,
        #[arg(help = "Slug clients send in the tenant header")]
        slug: String,
    },

    #[command(about = "Allow requests for a customer again")]
    Activate {
        #[arg(help = "Customer slug")]
        slug: String,
    },

    #[command(about = "Reject requests for a customer without deleting its data")]
    Deactivate {
        #[arg(help = "Customer slug")]
        slug: String,
    },
}

pub async fn handle(cmd: TenantCommands, backend: &Backend, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TenantCommands::List => {
            let customers = backend.customers.list().await?;

            if customers.is_empty() {
                return output_empty_collection(&output_format, "tenants", "No customers registered");
            }

            match output_format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&json!({ "tenants": customers }))?);
                }
                OutputFormat::Text => {
                    println!("{:<20} {:<20} {:<25} {:<8} {}", "SLUG", "PREFIX", "NAME", "ACTIVE", "CREATED");
                    println!("{}", "-".repeat(90));

                    for customer in &customers {
                        println!(
                            "{:<20} {:<20} {:<25} {:<8} {}",
                            customer.slug,
                            customer.collection_prefix,
                            customer.name,
                            if customer.is_active { "yes" } else { "no" },
                            customer.created_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
            }

            Ok(())
        }
        TenantCommands::Register { name, slug } => {
            let customer = backend.customers.register(&name, &slug).await?;
            output_success(
                &output_format,
                &format!("Registered '{}' with collection prefix '{}'", customer.slug, customer.collection_prefix),
                Some(serde_json::to_value(&customer)?),
            )
        }
        TenantCommands::Activate { slug } => {
            let customer = backend.customers.set_active(&slug, true).await?;
            output_success(&output_format, &format!("Activated '{}'", customer.slug), None)
        }
        TenantCommands::Deactivate { slug } => {
            let customer = backend.customers.set_active(&slug, false).await?;
            output_success(&output_format, &format!("Deactivated '{}'", customer.slug), None)
        }
    }
}
