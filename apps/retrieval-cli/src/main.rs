//! Command-line front end for local collections: ingest chunk files, query,
//! delete, and manage snapshots. Results are printed to stdout as JSON.

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use retrieval_core::config::{expand_path, Config};
use retrieval_core::{logging, Chunk, QueryRequest, SearchType};
use retrieval_hybrid::CollectionManager;

const INGEST_BATCH: usize = 500;

#[derive(Parser, Debug)]
#[command(name = "retrieval", about = "Hybrid keyword + similarity retrieval over local collections", version)]
struct Cli {
    /// Override `base_dir` from the configuration
    #[arg(long, global = true, env = "APP_BASE_DIR")]
    base_dir: Option<String>,

    /// Log level or filter directive (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Disable colored log output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upsert chunks from a JSON-lines file and persist the collection
    Ingest { collection: String, file: String },

    /// Query a collection and print the hit bundle
    Query {
        collection: String,
        text: String,
        #[arg(short, long)]
        k: Option<usize>,
        /// Metadata filter as JSON, e.g. '{"lang": "en"}'
        #[arg(long = "where")]
        where_filter: Option<String>,
        /// Document-text filter as JSON, e.g. '{"$contains": "water"}'
        #[arg(long)]
        where_document: Option<String>,
        /// keyword, vector or hybrid
        #[arg(long)]
        search_type: Option<String>,
    },

    /// Delete chunks by id and persist the collection
    Delete {
        collection: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Archive the persisted artifacts of a collection
    Snapshot {
        collection: String,
        #[arg(long)]
        name: Option<String>,
    },

    /// Restore a collection's files from a snapshot archive
    Rollback { collection: String, archive: String },

    /// List known collections with their live chunk counts
    List,
}

fn parse_json(arg: Option<&str>, flag: &str) -> anyhow::Result<Option<serde_json::Value>> {
    arg.map(|s| serde_json::from_str(s).with_context(|| format!("--{flag} is not valid JSON"))).transpose()
}

fn read_chunks(path: &Path) -> anyhow::Result<Vec<Chunk>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut chunks = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk = serde_json::from_str(&line).with_context(|| format!("{}:{}", path.display(), n + 1))?;
        chunks.push(chunk);
    }
    Ok(chunks)
}

fn ingest(manager: &CollectionManager, collection: &str, path: &Path) -> anyhow::Result<serde_json::Value> {
    let chunks = read_chunks(path)?;
    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    for batch in chunks.chunks(INGEST_BATCH) {
        manager.upsert(collection, batch)?;
        pb.inc(batch.len() as u64);
    }
    let persisted = manager.flush(collection)?;
    pb.finish_with_message("persisted");
    Ok(serde_json::json!({ "collection": collection, "upserted": chunks.len(), "persisted": persisted }))
}

fn run(cli: Cli, manager: &CollectionManager) -> anyhow::Result<serde_json::Value> {
    let output = match cli.command {
        Command::Ingest { collection, file } => {
            manager.init()?;
            ingest(manager, &collection, &expand_path(file))?
        }
        Command::Query { collection, text, k, where_filter, where_document, search_type } => {
            manager.init()?;
            let request = QueryRequest {
                collection,
                query: text,
                k,
                where_filter: parse_json(where_filter.as_deref(), "where")?,
                where_document: parse_json(where_document.as_deref(), "where-document")?,
                search_type: search_type.as_deref().map(str::parse::<SearchType>).transpose()?,
            };
            serde_json::to_value(manager.search(&request)?)?
        }
        Command::Delete { collection, ids } => {
            manager.init()?;
            let removed = manager.delete(&collection, &ids)?;
            manager.flush(&collection)?;
            serde_json::json!({ "collection": collection, "removed": removed })
        }
        Command::Snapshot { collection, name } => {
            let archive: PathBuf = manager.export_snapshot(&collection, name.as_deref())?;
            serde_json::json!({ "collection": collection, "archive": archive })
        }
        Command::Rollback { collection, archive } => {
            let restored = manager.rollback_snapshot(&collection, &expand_path(archive))?;
            serde_json::json!({ "collection": collection, "restored": restored })
        }
        Command::List => {
            manager.init()?;
            let mut listed = Vec::new();
            for name in manager.collections()? {
                let chunks = manager.get(&name)?.map(|c| c.len()).transpose()?;
                listed.push(serde_json::json!({ "name": name, "chunks": chunks }));
            }
            serde_json::json!({ "collections": listed })
        }
    };
    Ok(output)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    let mut settings = config.settings()?;
    if let Some(base_dir) = &cli.base_dir {
        settings.base_dir = expand_path(base_dir);
    }
    let log_level = cli.log_level.clone().or_else(|| settings.log_level.clone());
    logging::init_logging(log_level.as_deref(), cli.no_color)?;
    tracing::debug!(base_dir = %settings.base_dir.display(), "settings loaded");

    let manager = CollectionManager::new(settings);
    let output = run(cli, &manager)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
