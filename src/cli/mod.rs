//! CLI command definitions and handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::completion::OpenAiChat;
use crate::embedding::{has_api_key, EmbeddingProvider, OpenAiEmbedding};
use crate::engine::{EngineConfig, RagEngine};
use crate::extractor::extract_file;
use crate::knowledge::{fragments_from_parts, LanceVectorStore};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docqa")]
#[command(version, about = "Ask questions over your own documents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a document (txt, md, pdf) to the index
    Ingest {
        /// File to ingest
        file: PathBuf,

        /// Source identifier stored with the fragments (defaults to the
        /// file name)
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Ask a question over the ingested documents
    Ask {
        /// The question
        question: String,

        /// Restrict retrieval to one source document
        #[arg(short, long)]
        source: Option<String>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show ranked retrieval candidates without generating an answer
    Search {
        /// Search query
        query: String,

        /// Number of candidates
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Restrict to one source document
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Show index status
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// Run a parsed command.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest { file, source } => cmd_ingest(&file, source).await,
        Commands::Ask {
            question,
            source,
            json,
        } => cmd_ask(&question, source.as_deref(), json).await,
        Commands::Search {
            query,
            limit,
            source,
        } => cmd_search(&query, limit, source.as_deref()).await,
        Commands::Status => cmd_status().await,
    }
}

/// Data directory (~/.docqa/).
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docqa")
}

/// Assemble the pipeline with the real providers.
async fn open_engine() -> Result<RagEngine> {
    if !has_api_key() {
        bail!(
            "API key not set.\n\n\
             Set it with:\n  \
             export OPENAI_API_KEY=your-api-key"
        );
    }

    let embedder = Arc::new(OpenAiEmbedding::from_env().context("failed to create embedder")?);
    let store = Arc::new(
        LanceVectorStore::open(&get_data_dir().join("chunks.lance"), embedder.dimension())
            .await
            .context("failed to open vector store")?,
    );
    let chat = Arc::new(OpenAiChat::from_env().context("failed to create chat client")?);

    Ok(RagEngine::new(embedder, store, chat, EngineConfig::default()))
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_ingest(file: &Path, source: Option<String>) -> Result<()> {
    let source = source.unwrap_or_else(|| {
        file.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string()
    });

    println!("[*] Extracting text from {}...", file.display());

    let extracted = extract_file(file).await?;
    let engine = open_engine().await?;

    println!("[*] Embedding and storing fragments...");

    // PDFs arrive pre-split by page; both paths converge on fragments.
    let report = match extracted.parts {
        Some(parts) => {
            engine
                .ingest_fragments(fragments_from_parts(parts, &source))
                .await?
        }
        None => engine.ingest_text(&extracted.text, &source).await?,
    };

    if report.chunks_stored == 0 {
        println!("[!] Nothing to ingest: the file contained no text.");
    } else {
        println!(
            "[OK] Stored {} fragment(s) from source \"{}\"",
            report.chunks_stored, source
        );
    }

    Ok(())
}

async fn cmd_ask(question: &str, source: Option<&str>, json: bool) -> Result<()> {
    let engine = open_engine().await?;

    let response = engine.ask(question, source).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{}", response.answer);

    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for s in &response.sources {
            println!("  {} (similarity {:.2})", s.source, s.similarity);
        }
    }

    Ok(())
}

async fn cmd_search(query: &str, limit: usize, source: Option<&str>) -> Result<()> {
    let engine = open_engine().await?;

    let results = engine.search(query, limit, source).await?;

    if results.is_empty() {
        println!("[!] No matches.");
        return Ok(());
    }

    println!("[OK] {} candidate(s):\n", results.len());
    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} (chunk {}/{})",
            i + 1,
            r.similarity,
            r.source,
            r.chunk_index + 1,
            r.total_chunks
        );
        println!("   {}", truncate_text(&r.content, 200));
        println!();
    }

    Ok(())
}

async fn cmd_status() -> Result<()> {
    println!("docqa v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = get_data_dir();
    println!("[*] Data directory: {}", data_dir.display());

    if has_api_key() {
        println!("[OK] API key: set");
    } else {
        println!("[!] API key: not set");
        println!("    Set it with: export OPENAI_API_KEY=your-key");
        return Ok(());
    }

    let engine = open_engine().await?;
    match engine.count().await {
        Ok(count) => println!("[OK] Stored fragments: {count}"),
        Err(e) => println!("[!] Could not read index: {e}"),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Truncate for display, UTF-8 safe.
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace(['\n', '\r'], " ");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_data_dir_has_app_suffix() {
        let dir = get_data_dir();
        assert!(dir.ends_with(".docqa"));
    }
}
