mod answering;
mod caching;
mod chunking;
mod costing;
mod embedding;
mod parsing;
mod pipeline;
mod roles;
mod serving;
mod transcript;
mod vectordb;

use clap::{Parser, Subcommand};

use crate::{
    pipeline::Pipeline,
    serving::{RagServer, ServerOptions},
};

#[derive(Parser)]
struct CliArgs {
    #[command(subcommand)]
    cmd: Commands,
}
#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse, chunk and embed the documents in a given directory (plus any web
    /// pages listed in the `WEBPAGES_URLS` environment variable), and upload
    /// them to a vector store.
    /// Uses PdfExtract for parsing, the OpenAI API for embeddings and Qdrant as a vector database.
    Load {
        // Parser options
        /// The path to the directory containing the files for the RAG pipeline
        #[arg(short, long)]
        directory: String,

        // Chunking options
        /// Chunk window size, in characters
        #[arg(long, default_value_t = chunking::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Overlap between consecutive chunk windows, in characters
        #[arg(long, default_value_t = chunking::DEFAULT_CHUNK_OVERLAP)]
        chunk_overlap: usize,

        // Embedding options
        /// OpenAI embedding model used for chunks and queries
        #[arg(long, default_value_t = embedding::DEFAULT_EMBEDDING_MODEL.to_string())]
        embedding_model: String,

        /// Dimension of the embedding vectors
        #[arg(long, default_value_t = embedding::DEFAULT_EMBEDDING_DIM)]
        embedding_dim: u64,

        // VectorDB options
        /// URL for a Qdrant vector store instance.
        /// If your Qdrant instance needs an API key, make sure that
        /// it is available as `QDRANT_API_KEY` in your environment
        #[arg(long)]
        qdrant_url: String,

        /// Name of the collection for the Qdrant vector store.
        #[arg(long)]
        collection_name: String,
    },
    /// Serve the retrieval-augmented chatbot as an API server.
    Serve {
        /// URL for a Qdrant vector store instance.
        /// If your Qdrant instance needs an API key, make sure that
        /// it is available as `QDRANT_API_KEY` in your environment
        #[arg(long)]
        qdrant_url: String,

        /// Name of the collection for the Qdrant vector store.
        #[arg(long)]
        collection_name: String,

        /// OpenAI API key.
        /// It is not advised to pass the key as an option
        /// to the CLI command: you should set it
        /// as the `OPENAI_API_KEY` environment variable.
        #[arg(long, default_value = None)]
        openai_api_key: Option<String>,

        /// OpenAI model used for answer generation. Defaults to the
        /// `OPENAI_MODEL_NAME` environment variable, then to 'gpt-4.1'.
        #[arg(long, default_value = None)]
        openai_model: Option<String>,

        /// OpenAI embedding model used for queries and webpage ingestion.
        #[arg(long, default_value = None)]
        embedding_model: Option<String>,

        /// Dimension of the embedding vectors.
        #[arg(long, default_value = None)]
        embedding_dim: Option<u64>,

        /// Chunk window size for webpage ingestion, in characters.
        #[arg(long, default_value = None)]
        chunk_size: Option<usize>,

        /// Overlap between consecutive chunk windows, in characters.
        #[arg(long, default_value = None)]
        chunk_overlap: Option<usize>,

        /// Directory for the on-disk query cache. Defaults to './.ophelia-cache'.
        #[arg(long, default_value = None)]
        cache_dir: Option<String>,

        /// Redis URL for the role prompt store. Defaults to the `REDIS_URL`
        /// environment variable; without either, the roles endpoints are disabled.
        #[arg(long, default_value = None)]
        redis_url: Option<String>,

        /// Port for the server to run on. Defaults to 8000.
        #[arg(short, long, default_value = None)]
        port: Option<u16>,

        /// Host for the server to run on. Defaults to '0.0.0.0'.
        #[arg(long, default_value = None)]
        host: Option<String>,

        /// Request rate limit per minute. Defaults to 100.
        #[arg(long, default_value = None)]
        rate_limit_per_minute: Option<u32>,

        /// Allowed CORS origin (e.g. 'https://mydomain.com'). Defaults to '*' (all origins allowed) if not provided.
        /// While this argument has no effect for local development, it is advisable to set it for production deployments.
        #[arg(long, default_value = None)]
        cors: Option<String>,

        // logging
        /// Logging level. Defaults to 'info'. Available values: 'info', 'debug', 'error', 'warning', 'trace'
        #[arg(long, default_value = None)]
        log_level: Option<String>,

        /// Wether or not to activate JSON logging. Defaults to false (uses compact logging by default).
        #[arg(long, default_value_t = false)]
        log_json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenvy::dotenv().is_err() {
        eprintln!("No .env file found, reading configuration from the environment");
    }
    let args = CliArgs::parse();
    match args.cmd {
        Commands::Load {
            directory,
            chunk_size,
            chunk_overlap,
            embedding_model,
            embedding_dim,
            qdrant_url,
            collection_name,
        } => {
            let pipeline = Pipeline::new(
                directory,
                chunk_size,
                chunk_overlap,
                embedding_model,
                qdrant_url,
                collection_name,
                embedding_dim,
            );
            pipeline.run().await?;
        }
        Commands::Serve {
            qdrant_url,
            collection_name,
            openai_api_key,
            openai_model,
            embedding_model,
            embedding_dim,
            chunk_size,
            chunk_overlap,
            cache_dir,
            redis_url,
            port,
            host,
            rate_limit_per_minute,
            cors,
            log_level,
            log_json,
        } => {
            let server = RagServer::new(ServerOptions {
                qdrant_url,
                collection_name,
                openai_api_key,
                openai_model,
                embedding_model,
                embedding_dim,
                chunk_size,
                chunk_overlap,
                cache_dir,
                redis_url,
                port,
                host,
                rate_limit_per_minute,
                cors,
                log_level,
                log_json,
            });
            server.serve().await?;
        }
    }
    Ok(())
}
