use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use jobpulse_clean::skills::{default_skill_seed, load_skill_seed, SkillGateway, VocabExtractor};
use jobpulse_clean::{validate_location, JobDataCleaner, LocationCheck};
use jobpulse_core::RawRecord;
use jobpulse_scrape::{FixturePortal, PortalClient, ScrapeConfig, ScrapeOrchestrator};
use jobpulse_storage::{seed_skills, JobStore, PgStore, StorageLoader};

#[derive(Debug, Parser)]
#[command(name = "jobpulse")]
#[command(about = "India job market ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations.
    Migrate,
    /// Pre-populate the skill dimension from a vocabulary file.
    SeedSkills {
        /// Path to a category -> skill names JSON file; embedded vocabulary
        /// when omitted.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Scrape portal fixtures, clean, extract skills, and load.
    Scrape {
        /// Directory holding per-portal fixture trees.
        #[arg(long)]
        fixtures: PathBuf,
    },
    /// Run raw record files through the clean/extract/load pipeline.
    Ingest {
        /// JSON files, each an array of raw records.
        files: Vec<PathBuf>,
    },
    /// Re-check every stored location against the current allow list.
    AuditLocations,
    /// Print row counts across the schema.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate => {
            let store = store_from_env().await?;
            store.run_migrations().await?;
            println!("migrations applied");
        }
        Commands::SeedSkills { path } => {
            let seed = match path {
                Some(path) => load_skill_seed(&path)?,
                None => default_skill_seed(),
            };
            let store = store_from_env().await?;
            let seeded = seed_skills(&store, &seed).await?;
            println!("seeded {seeded} skills across {} categories", seed.len());
        }
        Commands::Scrape { fixtures } => {
            let portals = portal_list();
            let clients: Vec<Arc<dyn PortalClient>> = portals
                .iter()
                .map(|portal| {
                    Arc::new(FixturePortal::new(portal, &fixtures)) as Arc<dyn PortalClient>
                })
                .collect();
            let orchestrator = ScrapeOrchestrator::new(clients, ScrapeConfig::from_env());
            let outcome = orchestrator.run().await;
            println!(
                "scrape run {} finished: {} records, {} failed combinations, {} calls",
                outcome.run_id,
                outcome.records.len(),
                outcome.failures.len(),
                outcome.calls
            );
            ingest_records(outcome.records).await?;
        }
        Commands::Ingest { files } => {
            let mut records = Vec::new();
            for path in &files {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let mut batch: Vec<RawRecord> = serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?;
                info!(file = %path.display(), records = batch.len(), "loaded raw records");
                records.append(&mut batch);
            }
            ingest_records(records).await?;
        }
        Commands::AuditLocations => {
            let store = store_from_env().await?;
            let cities = store.list_location_cities().await?;
            let mut invalid = 0usize;
            for (location_id, city) in &cities {
                if let LocationCheck::Rejected(reason) = validate_location(city) {
                    invalid += 1;
                    println!("location {location_id} \"{city}\": {reason}");
                }
            }
            println!("{} locations audited, {} invalid", cities.len(), invalid);
        }
        Commands::Stats => {
            let store = store_from_env().await?;
            let stats = store.stats().await?;
            println!(
                "jobs={} companies={} skills={} locations={}",
                stats.jobs, stats.companies, stats.skills, stats.locations
            );
        }
    }

    Ok(())
}

async fn store_from_env() -> Result<PgStore> {
    let url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let store = PgStore::connect(&url)
        .await
        .context("connecting to the database")?;
    Ok(store)
}

fn portal_list() -> Vec<String> {
    std::env::var("SCRAPE_PORTALS")
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| vec!["indeed".to_string(), "linkedin".to_string()])
}

async fn ingest_records(records: Vec<RawRecord>) -> Result<()> {
    let cleaner = JobDataCleaner::new();
    let (cleaned, quality) = cleaner.clean(records);
    println!(
        "cleaned {} of {} records ({:.1}% removed)",
        quality.cleaned,
        quality.original,
        quality.removal_percent()
    );
    for (reason, count) in quality.top_rejections(5) {
        println!("  {reason}: {count}");
    }

    let gateway = SkillGateway::new(Arc::new(VocabExtractor::from_seed(&default_skill_seed())));
    let skills = gateway.extract_for_batch(&cleaned);

    let store = store_from_env().await?;
    let loader = StorageLoader::new(Arc::new(store));
    let report = loader.load(&cleaned, &skills).await;
    println!(
        "loaded: {} inserted, {} skipped, {} errored",
        report.inserted, report.skipped, report.errored
    );
    Ok(())
}
