use clap::Args;
use std::path::PathBuf;

use crate::cli::utils::output_success;
use crate::cli::{Backend, OutputFormat};
use crate::seed::{seed_tenant, Fixtures};

#[derive(Args)]
pub struct SeedArgs {
    #[arg(help = "Customer slug to seed")]
    pub slug: String,

    #[arg(long, short, help = "Fixture file (YAML or JSON)")]
    pub file: PathBuf,
}

pub async fn handle(args: SeedArgs, backend: &Backend, output_format: OutputFormat) -> anyhow::Result<()> {
    let fixtures = Fixtures::from_path(&args.file)?;
    let report = seed_tenant(&backend.registry, &backend.customers, &args.slug, &fixtures).await?;

    if let OutputFormat::Text = output_format {
        for entity in &report.entities {
            if entity.skipped {
                println!("  {:<12} {:<30} skipped (not empty)", entity.entity, entity.collection);
            } else {
                println!("  {:<12} {:<30} {} inserted", entity.entity, entity.collection, entity.inserted);
            }
        }
    }

    let inserted: usize = report.entities.iter().map(|e| e.inserted).sum();
    output_success(
        &output_format,
        &format!("Seeded tenant '{}' ({} documents)", report.tenant, inserted),
        Some(serde_json::to_value(&report)?),
    )
}
