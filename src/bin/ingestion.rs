//! Ingestion binary entry point.
//!
//! Runs the one-off build phase: parses `metadata.csv` into the paper index and
//! splits the embeddings CSV into shard files plus the shard index. Indexes
//! that already exist in the project folder are loaded instead of rebuilt.
//!
//! # Examples
//!
//! Build with the default layout:
//! ```bash
//! ingestion
//! ```
//!
//! Build another release into a custom folder:
//! ```bash
//! ingestion --data-folder /data/cord19 --dataset 2020-06-15 --project-folder out
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cord19_papers::{
    BuildOptions, BuildStats, Corpus, CorpusLayout, Stopwatch, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_SHARD_COUNT,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Ingestion CLI for building the CORD-19 paper and embedding indexes
#[derive(Parser, Debug)]
#[command(
    name = "ingestion",
    version,
    about = "Build the CORD-19 paper index and embedding shards",
    long_about = "Parses the CORD-19 metadata into a paper index and splits the precomputed embeddings \
                  into shard files. Existing indexes in the project folder are reused.

EXAMPLES:
  Default layout:
    ingestion

  Another release:
    ingestion --dataset 2020-06-15 --embeddings-file cord_19_embeddings_2020-06-15.csv

  Fewer, larger shards:
    ingestion --shard-count 20 --log-level debug"
)]
struct IngestionArgs {
    /// Folder holding the downloaded CORD-19 releases
    #[arg(long, value_name = "DIR", default_value = "cord19_data")]
    data_folder: PathBuf,

    /// Release folder inside the data folder
    #[arg(long, value_name = "NAME", default_value = "2020-05-31")]
    dataset: String,

    /// Embeddings CSV inside the release folder [default: cord_19_embeddings_<dataset>.csv]
    #[arg(long, value_name = "FILE")]
    embeddings_file: Option<String>,

    /// Folder the indexes and shards are written to
    #[arg(long, value_name = "DIR", default_value = "project_data")]
    project_folder: PathBuf,

    /// Number of shards to spread the embeddings over
    #[arg(long, value_name = "N", default_value_t = DEFAULT_SHARD_COUNT)]
    shard_count: usize,

    /// Required embedding length
    #[arg(long, value_name = "N", default_value_t = DEFAULT_EMBEDDING_DIMENSION)]
    dimension: usize,

    /// Accept whatever length the first embedding has
    #[arg(long, conflicts_with = "dimension")]
    infer_dimension: bool,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

impl IngestionArgs {
    fn layout(&self) -> CorpusLayout {
        let embeddings_file = self
            .embeddings_file
            .clone()
            .unwrap_or_else(|| format!("cord_19_embeddings_{}.csv", self.dataset));

        CorpusLayout {
            cord19_data_folder: self.data_folder.clone(),
            current_dataset: self.dataset.clone(),
            embeddings_file,
            project_data_folder: self.project_folder.clone(),
            ..CorpusLayout::default()
        }
    }

    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            shard_count: self.shard_count,
            expected_dimension: (!self.infer_dimension).then_some(self.dimension),
        }
    }
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Create a progress bar counting written shards
fn create_progress_bar(shard_count: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(shard_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} shards | Embeddings: {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

fn print_summary(corpus: &Corpus, papers_built: bool, stats: Option<&BuildStats>, stopwatch: &Stopwatch) {
    let status = |built: bool| if built { "built" } else { "loaded" };

    println!("\n╔════════════════════════════════════════╗");
    println!("║      Ingestion Completed               ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Papers ({:>6}):       {:>15} ║", status(papers_built), corpus.papers().len());
    println!("║ Embeddings ({:>6}):   {:>15} ║", status(stats.is_some()), corpus.store().index().len());
    if let Some(stats) = stats {
        println!("║ Rows read:            {:>16} ║", stats.rows_read);
        println!("║ Duplicates skipped:   {:>16} ║", stats.duplicates_skipped);
        println!("║ Shards written:       {:>16} ║", stats.shards_written);
        let dimension = stats.dimension.map_or_else(|| "-".to_string(), |d| d.to_string());
        println!("║ Dimension:            {:>16} ║", dimension);
    }
    println!("║ Elapsed time:         {:>16} ║", stopwatch.formatted_runtime());
    println!("╚════════════════════════════════════════╝");
}

fn main() -> Result<()> {
    let args = IngestionArgs::parse();

    init_logging(&args.log_level).context("Failed to initialize logging")?;

    info!("Starting CORD-19 ingestion");
    debug!("CLI arguments: {:?}", args);

    let stopwatch = Stopwatch::new();
    let layout = args.layout();

    let dataset_dir = layout.dataset_dir();
    if !dataset_dir.is_dir() {
        warn!("Release folder does not exist: {:?}", dataset_dir);
    }
    info!("Release folder: {:?}", dataset_dir);
    info!("Project folder: {:?}", layout.project_data_folder);

    let progress = create_progress_bar(args.shard_count)?;
    progress.set_message("0");

    let (corpus, report) = Corpus::open_with_progress(layout, args.build_options(), |stats| {
        progress.set_position(stats.shards_written as u64);
        progress.set_message(stats.embeddings_written.to_string());
    })
    .context("Failed to build the CORD-19 indexes")?;

    match &report.embeddings_built {
        Some(stats) => progress.finish_with_message(stats.embeddings_written.to_string()),
        None => progress.finish_and_clear(),
    }

    print_summary(&corpus, report.papers_built, report.embeddings_built.as_ref(), &stopwatch);

    if let Some(stats) = &report.embeddings_built {
        let unembedded = corpus.papers().len().saturating_sub(stats.embeddings_written);
        if unembedded > 0 {
            warn!("{} papers have no embedding", unembedded);
        }
    }

    info!("Ingestion completed successfully");
    Ok(())
}
