mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sinhala_rag_core::{
    ChunkingOptions, Embedder, GeminiEmbedder, GeminiGenerator, KnowledgeBaseStatus,
    LexicalEmbedder, QdrantStore, RagService, RetrievalOptions, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_GEMINI_DIMENSIONS, DEFAULT_GENERATION_MODEL,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "sinhala-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Folder holding the source PDF documents
    #[arg(long, env = "UPLOADS_DIR", default_value = "uploads")]
    uploads_dir: PathBuf,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "sinhala_accounting_docs")]
    qdrant_collection: String,

    /// Soft upper bound on chunk length, in characters
    #[arg(long, env = "CHUNK_SIZE", default_value = "1000")]
    chunk_size: usize,

    /// Chunk overlap; every ten units carry one word into the next chunk
    #[arg(long, env = "CHUNK_OVERLAP", default_value = "200")]
    chunk_overlap: usize,

    /// Number of chunks retrieved per question
    #[arg(long, env = "TOP_K", default_value = "5")]
    top_k: usize,

    /// Timeout for each index or generation call, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "60")]
    request_timeout_secs: u64,

    /// Gemini model used for answers
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_GENERATION_MODEL)]
    gemini_model: String,

    /// Gemini embedding model
    #[arg(long, env = "GEMINI_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Vector width requested from the embedding model
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_GEMINI_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Embed with local hashed features instead of Gemini
    #[arg(long, env = "LOCAL_EMBEDDINGS", default_value_t = false)]
    local_embeddings: bool,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, default_value = "")]
    gemini_api_key: String,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk the uploaded PDFs and index them.
    Ingest {
        /// Rebuild the collection even when it already holds records.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Answer one question and print the result.
    Ask {
        question: String,
    },
    /// Print the native-script form of a Latin-typed query.
    Normalize {
        query: String,
    },
    /// Suggest native terms for a partial Latin-typed word.
    Suggest {
        partial: String,
    },
    /// Print collection statistics as JSON.
    Stats,
    /// Run the HTTP API.
    Serve {
        /// Address to bind.
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:5000")]
        bind: String,
    },
}

impl Cli {
    fn chunking(&self) -> ChunkingOptions {
        ChunkingOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            ..ChunkingOptions::default()
        }
    }

    fn retrieval(&self) -> RetrievalOptions {
        RetrievalOptions {
            top_k: self.top_k,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    fn build_service(&self) -> RagService<QdrantStore, GeminiGenerator> {
        let api_key = self.gemini_api_key.trim();
        if api_key.is_empty() {
            warn!("GEMINI_API_KEY is not set; Gemini calls will fail");
        }

        let embedder: Arc<dyn Embedder> = if self.local_embeddings {
            info!("using local lexical embeddings");
            Arc::new(LexicalEmbedder::default())
        } else {
            Arc::new(GeminiEmbedder::new(
                api_key,
                &self.embedding_model,
                self.embedding_dimensions,
            ))
        };
        let index = QdrantStore::new(
            &self.qdrant_url,
            &self.qdrant_collection,
            embedder.dimensions(),
        );
        let generator = GeminiGenerator::new(api_key, &self.gemini_model);

        RagService::new(index, generator)
            .with_embedder(embedder)
            .with_options(self.chunking(), self.retrieval())
    }
}

fn report_setup(status: &KnowledgeBaseStatus) {
    match status {
        KnowledgeBaseStatus::FolderCreated => {
            println!("created empty uploads folder; add PDF files and run again")
        }
        KnowledgeBaseStatus::NoDocuments => println!("no PDF files to ingest"),
        KnowledgeBaseStatus::AlreadyIndexed(count) => {
            println!("collection already holds {count} chunks; use --force to rebuild")
        }
        KnowledgeBaseStatus::NothingExtracted { skipped } => {
            println!("0 chunks ingested ({skipped} files skipped)")
        }
        KnowledgeBaseStatus::Indexed { records, skipped } => println!(
            "{records} chunks ingested ({skipped} files skipped) at {}",
            Utc::now().to_rfc3339()
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "sinhala-rag boot"
    );

    let service = cli.build_service();

    match &cli.command {
        Command::Ingest { force } => {
            let status = if *force {
                service.rebuild_knowledge_base(&cli.uploads_dir).await
            } else {
                service.ensure_knowledge_base(&cli.uploads_dir).await
            }
            .context("ingestion failed")?;
            report_setup(&status);
        }
        Command::Ask { question } => {
            println!("{}", service.answer(question).await);
        }
        Command::Normalize { query } => {
            println!("{}", service.normalize_query(query));
        }
        Command::Suggest { partial } => {
            for suggestion in service.suggest(partial) {
                println!("{suggestion}");
            }
        }
        Command::Stats => {
            let stats = service.collection_stats().await;
            println!(
                "{}",
                serde_json::to_string_pretty(&stats).context("failed to encode stats")?
            );
        }
        Command::Serve { bind } => {
            match service.ensure_knowledge_base(&cli.uploads_dir).await {
                Ok(status) => info!(?status, "knowledge base ready"),
                Err(error) => warn!(error = %error, "knowledge base setup failed; serving anyway"),
            }
            server::run_server(Arc::new(service), bind).await?;
        }
    }

    Ok(())
}
