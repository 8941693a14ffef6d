//! gally-sync
//!
//! Pushes a declared catalog structure to a Gally instance. Connection
//! settings come from `GALLY_*` environment variables or a `.env` file.

use std::fmt;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use gally_core::GallyClient;
use gally_sync::{Structure, StructureSynchronizer, SyncReport, config};
use tracing_subscriber::EnvFilter;

/// Synchronize catalogs, source fields and options with Gally.
#[derive(Parser)]
#[command(name = "gally-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file describing the desired structure
    #[arg(short, long)]
    structure: PathBuf,

    /// Delete remote entities missing from the structure file
    #[arg(long)]
    clean: bool,

    /// Report what would be deleted without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Fail when a reference matches several remote entities
    #[arg(long)]
    strict: bool,

    /// Only run the given stages (repeatable)
    #[arg(long, value_enum)]
    only: Vec<Stage>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Stage {
    Catalogs,
    SourceFields,
    Options,
}

impl Stage {
    const ALL: [Stage; 3] = [Stage::Catalogs, Stage::SourceFields, Stage::Options];

    fn as_str(self) -> &'static str {
        match self {
            Stage::Catalogs => "catalogs",
            Stage::SourceFields => "source fields",
            Stage::Options => "options",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn selected_stages(only: &[Stage]) -> Vec<Stage> {
    Stage::ALL
        .into_iter()
        .filter(|stage| only.is_empty() || only.contains(stage))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let configuration = config::from_env().context("invalid gally configuration")?;
    let mut structure = Structure::load(&cli.structure)
        .with_context(|| format!("failed to load {:?}", cli.structure))?;
    let client = GallyClient::new(&configuration)?;
    let synchronizer = StructureSynchronizer::new(client).with_strict_references(cli.strict);

    let mut failed_deletions = 0;
    for stage in selected_stages(&cli.only) {
        let report = run_stage(&synchronizer, &mut structure, stage, &cli)
            .await
            .with_context(|| format!("failed to synchronize {stage}"))?;
        println!("{stage}: {}", report.summary());
        failed_deletions += report.failures.len();
    }

    if failed_deletions > 0 {
        anyhow::bail!("{failed_deletions} orphan deletion(s) failed");
    }
    Ok(())
}

async fn run_stage(
    synchronizer: &StructureSynchronizer,
    structure: &mut Structure,
    stage: Stage,
    cli: &Cli,
) -> Result<SyncReport, gally_core::GallyError> {
    match stage {
        Stage::Catalogs => {
            synchronizer
                .sync_all_localized_catalogs(&mut structure.localized_catalogs, cli.clean, cli.dry_run)
                .await
        }
        Stage::SourceFields => {
            synchronizer
                .sync_all_source_fields(&mut structure.source_fields, cli.clean, cli.dry_run)
                .await
        }
        Stage::Options => {
            synchronizer
                .sync_all_source_field_options(
                    &mut structure.source_field_options,
                    cli.clean,
                    cli.dry_run,
                )
                .await
        }
    }
}
