mod config;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use coexpress_core::{CorrelationLookup, IngestConfig, MatrixIngestor, ProvenanceSpec};
use coexpress_store::SqliteCorrelationStore;
use config::CoexprConfig;
use std::path::PathBuf;
use tracing::info;

/// Gene co-expression correlation tool
#[derive(Parser)]
#[command(name = "coexpress")]
#[command(about = "Ingest, look up and verify gene-pair correlations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database; overrides the configured path
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Preset {
    Archs4,
    Harmonizome,
}

#[derive(Subcommand)]
enum Command {
    /// Load a correlation matrix into the store
    Ingest {
        matrix: PathBuf,

        #[arg(long, value_enum, default_value = "archs4")]
        preset: Preset,

        /// Key rows and columns by UniProt accession (Harmonizome files only)
        #[arg(long)]
        uniprot: bool,

        /// Provenance name; defaults to the preset's source
        #[arg(long)]
        source_name: Option<String>,

        #[arg(long)]
        source_url: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        subcategory: Option<String>,
    },

    /// Print every stored correlation for a gene pair
    Lookup { gene1: String, gene2: String },

    /// Recompute correlations from an HDF5 file and compare them with a matrix file
    Verify {
        h5: PathBuf,
        matrix: PathBuf,

        /// Gene pair as `A,B`; repeatable
        #[arg(long = "pair", required = true, value_parser = parse_pair)]
        pairs: Vec<(String, String)>,

        #[arg(long, value_enum, default_value = "archs4")]
        preset: Preset,

        /// Write the TSV report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(',') {
        Some((a, b)) if !a.trim().is_empty() && !b.trim().is_empty() => {
            Ok((a.trim().to_string(), b.trim().to_string()))
        }
        _ => Err(format!("expected GENE1,GENE2, got '{raw}'")),
    }
}

/// Matrix format of `preset` with the configured staging and chunking settings.
fn preset_config(base: &IngestConfig, preset: Preset) -> IngestConfig {
    let format = match preset {
        Preset::Archs4 => IngestConfig::archs4(),
        Preset::Harmonizome => IngestConfig::harmonizome(),
    };
    IngestConfig {
        staging_path: base.staging_path.clone(),
        chunk_size: base.chunk_size,
        triangle: base.triangle,
        progress_interval: base.progress_interval,
        ..format
    }
}

#[cfg(feature = "hdf5")]
fn verify(
    config: &CoexprConfig,
    h5: PathBuf,
    matrix: PathBuf,
    pairs: &[(String, String)],
    preset: Preset,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    use coexpress_core::{GenePairCorrelator, LoaderRegistry, verify_against_matrix, write_verification_tsv};

    let registry = LoaderRegistry::new(config.layout.clone());
    let loader = registry.get_or_open(&h5)?;
    let correlator = GenePairCorrelator::new(loader, config.correlation.clone());
    let file = std::fs::File::open(&matrix).with_context(|| format!("Cannot open {}", matrix.display()))?;
    let rows = verify_against_matrix(
        &correlator,
        std::io::BufReader::new(file),
        &preset_config(&config.ingest, preset),
        pairs,
    )?;
    match output {
        Some(path) => write_verification_tsv(&rows, std::fs::File::create(&path)?)?,
        None => write_verification_tsv(&rows, std::io::stdout().lock())?,
    }
    Ok(())
}

#[cfg(not(feature = "hdf5"))]
fn verify(
    _config: &CoexprConfig,
    _h5: PathBuf,
    _matrix: PathBuf,
    _pairs: &[(String, String)],
    _preset: Preset,
    _output: Option<PathBuf>,
) -> anyhow::Result<()> {
    anyhow::bail!("verify needs HDF5 support; rebuild with `--features hdf5`")
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coexpress=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    let cli = Cli::parse();
    let mut config = CoexprConfig::load()?.apply_env_overrides();
    if let Some(db) = cli.db {
        config.store.database_path = db;
    }
    config.validate()?;

    match cli.command {
        Command::Ingest { matrix, preset, uniprot, source_name, source_url, category, subcategory } => {
            let mut ingest = preset_config(&config.ingest, preset);
            if uniprot {
                ingest = ingest.keyed_by_uniprot();
            }
            let mut provenance = match (preset, source_name) {
                (_, Some(name)) => ProvenanceSpec::new(name),
                (Preset::Archs4, None) => ProvenanceSpec::archs4(),
                (Preset::Harmonizome, None) => ProvenanceSpec::new("Harmonizome"),
            };
            if let Some(url) = source_url {
                provenance = provenance.with_url(url);
            }
            if let Some(category) = category {
                provenance = provenance.with_category(category);
            }
            if let Some(subcategory) = subcategory {
                provenance = provenance.with_subcategory(subcategory);
            }

            let mut store = SqliteCorrelationStore::open(&config.store.database_path)?;
            let report = MatrixIngestor::new(ingest)?
                .ingest_file(&matrix, &provenance, &mut store)
                .with_context(|| format!("Ingestion of {} failed", matrix.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Lookup { gene1, gene2 } => {
            let store = SqliteCorrelationStore::open(&config.store.database_path)?;
            let values = store.correlations(&gene1, &gene2)?;
            info!(gene1 = %gene1, gene2 = %gene2, found = values.len(), "Lookup complete");
            if values.is_empty() {
                println!("No stored correlation for {gene1} / {gene2}");
            }
            for (provenance, value) in values {
                println!("{gene1}\t{gene2}\t{value}\t{provenance}");
            }
        }
        Command::Verify { h5, matrix, pairs, preset, output } => {
            verify(&config, h5, matrix, &pairs, preset, output)?;
        }
    }
    Ok(())
}
