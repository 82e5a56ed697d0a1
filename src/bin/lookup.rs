//! Lookup binary entry point.
//!
//! Looks papers up by `cord_uid` in a built corpus and prints their metadata,
//! text or embedding. Supports single lookups and an interactive REPL.
//!
//! # Examples
//!
//! Metadata and embedding summary:
//! ```bash
//! lookup --uid ug7v899j
//! ```
//!
//! Full text of a random paper:
//! ```bash
//! lookup --random --show full-text
//! ```
//!
//! Interactive mode:
//! ```bash
//! lookup --interactive
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use cord19_papers::{
    BuildOptions, Corpus, CorpusError, CorpusLayout, Embedding, PaperRecord, Stopwatch, StoreError,
    DEFAULT_EMBEDDING_DIMENSION, DEFAULT_SHARD_COUNT,
};
use rand::Rng;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Number of embedding components shown in the table view
const EMBEDDING_PREVIEW: usize = 5;

/// Output format for a paper summary
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Raw content to print instead of the summary
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ShowMode {
    /// Title and abstract
    Abstract,
    /// Body text of the best document parse
    Content,
    /// Title, abstract and body text
    FullText,
    /// The embedding as a JSON array
    Embedding,
}

/// Lookup CLI for reading papers out of a built corpus
#[derive(Parser, Debug)]
#[command(
    name = "lookup",
    version,
    about = "Look up CORD-19 papers and their embeddings by cord_uid",
    long_about = "Reads papers from the indexes built by the ingestion binary. Prints a summary \
                  (table or JSON) or the raw text or embedding of a paper.

EXAMPLES:
  Summary:
    lookup --uid ug7v899j

  JSON summary:
    lookup --uid ug7v899j --format json

  Full text of a random paper:
    lookup --random --show full-text

  Interactive mode:
    lookup --interactive"
)]
struct Args {
    /// Paper to look up
    #[arg(long, value_name = "UID", conflicts_with_all = ["random", "interactive"])]
    uid: Option<String>,

    /// Look up a random paper
    #[arg(long, conflicts_with = "interactive")]
    random: bool,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Summary format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Print this content instead of the summary
    #[arg(long, value_enum)]
    show: Option<ShowMode>,

    /// Folder holding the downloaded CORD-19 releases
    #[arg(long, value_name = "DIR", default_value = "cord19_data")]
    data_folder: PathBuf,

    /// Release folder inside the data folder
    #[arg(long, value_name = "NAME", default_value = "2020-05-31")]
    dataset: String,

    /// Folder holding the built indexes and shards
    #[arg(long, value_name = "DIR", default_value = "project_data")]
    project_folder: PathBuf,

    /// Number of shards, used only if the indexes still need to be built
    #[arg(long, value_name = "N", default_value_t = DEFAULT_SHARD_COUNT)]
    shard_count: usize,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

/// Embedding of `cord_uid`, or `None` if the paper was never embedded
fn find_embedding(corpus: &mut Corpus, cord_uid: &str) -> Result<Option<Embedding>> {
    match corpus.embedding(cord_uid) {
        Ok(embedding) => Ok(Some(embedding)),
        Err(CorpusError::Store(StoreError::NotFound(_))) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to load the embedding of {}", cord_uid)),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

/// Format a paper summary as a two-column table
fn format_paper_table(paper: &PaperRecord, embedding: Option<&Embedding>) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Field").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
    ]);

    let documents = paper.document_files().count();
    let embedding_cell = match embedding {
        Some(embedding) => {
            let preview = embedding
                .iter()
                .take(EMBEDDING_PREVIEW)
                .map(|v| format!("{:.4}", v))
                .collect::<Vec<_>>()
                .join(", ");
            Cell::new(format!("{} dims [{}, ...]", embedding.len(), preview)).fg(Color::Green)
        }
        None => Cell::new("none").fg(Color::Red),
    };

    table.add_row(vec![Cell::new("cord_uid"), Cell::new(&paper.cord_uid)]);
    table.add_row(vec![Cell::new("Title"), Cell::new(&paper.title)]);
    table.add_row(vec![
        Cell::new("Authors"),
        Cell::new(truncate(&paper.authors.join("; "), 120)),
    ]);
    table.add_row(vec![Cell::new("Published"), Cell::new(&paper.publish_time)]);
    table.add_row(vec![Cell::new("Abstract"), Cell::new(truncate(&paper.abstract_text, 300))]);
    table.add_row(vec![Cell::new("Documents"), Cell::new(documents)]);
    table.add_row(vec![Cell::new("Embedding"), embedding_cell]);

    table.to_string()
}

/// Format a paper summary as JSON
fn format_paper_json(paper: &PaperRecord, embedding: Option<&Embedding>) -> Result<String> {
    let value = serde_json::json!({
        "paper": paper,
        "embedding": embedding,
    });
    serde_json::to_string_pretty(&value).with_context(|| "Failed to serialize paper to JSON")
}

/// Render `cord_uid` the way the current settings ask for
fn render_paper(
    corpus: &mut Corpus,
    cord_uid: &str,
    format: OutputFormat,
    show: Option<ShowMode>,
) -> Result<String> {
    debug!("Rendering paper {} (format={:?}, show={:?})", cord_uid, format, show);

    match show {
        Some(ShowMode::Abstract) => Ok(corpus.title_abstract(cord_uid)?),
        Some(ShowMode::Content) => Ok(corpus.content(cord_uid)?),
        Some(ShowMode::FullText) => Ok(corpus.full_text(cord_uid)?),
        Some(ShowMode::Embedding) => {
            let embedding = corpus.embedding(cord_uid)?;
            serde_json::to_string(&embedding).with_context(|| "Failed to serialize embedding")
        }
        None => {
            let embedding = find_embedding(corpus, cord_uid)?;
            let paper = corpus.paper(cord_uid)?;
            match format {
                OutputFormat::Table => Ok(format_paper_table(paper, embedding.as_ref())),
                OutputFormat::Json => format_paper_json(paper, embedding.as_ref()),
            }
        }
    }
}

/// Pick a random paper identifier
fn random_uid(corpus: &Corpus) -> Result<String> {
    let papers = corpus.papers();
    if papers.is_empty() {
        anyhow::bail!("The paper index is empty");
    }

    let position = rand::thread_rng().gen_range(0..papers.len());
    papers
        .get_index(position)
        .map(|paper| paper.cord_uid.clone())
        .with_context(|| format!("No paper at position {}", position))
}

fn print_help() {
    println!("Commands:");
    println!("  <uid>                 - Look up a paper");
    println!("  /random               - Look up a random paper");
    println!("  /show MODE            - Print abstract, content, full-text or embedding");
    println!("  /show summary         - Print the summary again");
    println!("  /format table         - Use table output format");
    println!("  /format json          - Use JSON output format");
    println!("  /help                 - Show this help");
    println!("  Ctrl+D or Ctrl+C      - Exit");
}

/// Look up one paper and print it, reporting failures without exiting
fn lookup_and_print(corpus: &mut Corpus, cord_uid: &str, format: OutputFormat, show: Option<ShowMode>) {
    let stopwatch = Stopwatch::new();
    match render_paper(corpus, cord_uid, format, show) {
        Ok(output) => {
            println!("{}", output);
            println!("\n[{}]", stopwatch.formatted_runtime());
        }
        Err(e) => eprintln!("Lookup failed: {:#}", e),
    }
}

/// Run interactive REPL mode
fn run_interactive(corpus: &mut Corpus, mut format: OutputFormat, mut show: Option<ShowMode>) -> Result<()> {
    println!("Interactive CORD-19 Lookup ({} papers)", corpus.papers().len());
    print_help();
    println!();

    let mut rl = DefaultEditor::new().with_context(|| "Failed to create readline editor")?;

    loop {
        match rl.readline("Lookup> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line).ok(); // Ignore errors from adding to history

                if !line.starts_with('/') {
                    lookup_and_print(corpus, line, format, show);
                    continue;
                }

                let parts: Vec<&str> = line.split_whitespace().collect();
                match parts[0] {
                    "/help" => print_help(),
                    "/random" => match random_uid(corpus) {
                        Ok(cord_uid) => {
                            println!("Paper <{}>", cord_uid);
                            lookup_and_print(corpus, &cord_uid, format, show);
                        }
                        Err(e) => eprintln!("{}", e),
                    },
                    "/show" => {
                        if parts.len() != 2 {
                            eprintln!("Usage: /show [abstract|content|full-text|embedding|summary]");
                            continue;
                        }
                        if parts[1] == "summary" {
                            show = None;
                            println!("Showing the paper summary");
                            continue;
                        }
                        match ShowMode::from_str(parts[1], true) {
                            Ok(mode) => {
                                show = Some(mode);
                                println!("Showing {:?}", mode);
                            }
                            Err(_) => eprintln!("Invalid mode: {}", parts[1]),
                        }
                    }
                    "/format" => {
                        if parts.len() != 2 {
                            eprintln!("Usage: /format [table|json]");
                            continue;
                        }
                        match OutputFormat::from_str(parts[1], true) {
                            Ok(new_format) => {
                                format = new_format;
                                println!("Set output format to {:?}", format);
                            }
                            Err(_) => eprintln!("Invalid format: must be 'table' or 'json'"),
                        }
                    }
                    _ => eprintln!("Unknown command: {}. Type /help for available commands.", parts[0]),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level);

    if !args.interactive && !args.random && args.uid.is_none() {
        anyhow::bail!(
            "One of --uid, --random or --interactive must be specified.\n\
             Use --help for usage information."
        );
    }

    let layout = CorpusLayout {
        cord19_data_folder: args.data_folder.clone(),
        current_dataset: args.dataset.clone(),
        project_data_folder: args.project_folder.clone(),
        ..CorpusLayout::default()
    };
    let options = BuildOptions {
        shard_count: args.shard_count,
        expected_dimension: Some(DEFAULT_EMBEDDING_DIMENSION),
    };

    let stopwatch = Stopwatch::new();
    info!("Loading the CORD-19 indexes from {:?}", layout.project_data_folder);
    let mut corpus = Corpus::open(layout, options).with_context(|| {
        "Failed to open the CORD-19 corpus.\n\
         Run the ingestion binary first to build the indexes."
    })?;
    info!(
        "Loaded {} papers in {}",
        corpus.papers().len(),
        stopwatch.formatted_runtime()
    );

    if args.interactive {
        return run_interactive(&mut corpus, args.format, args.show);
    }

    let cord_uid = match args.uid {
        Some(cord_uid) => cord_uid,
        None => random_uid(&corpus)?,
    };

    let output = render_paper(&mut corpus, &cord_uid, args.format, args.show)?;
    println!("{}", output);

    Ok(())
}
