use async_openai::{Client, config::OpenAIConfig};

use crate::{
    chunking::chunk_text,
    embedding::embed_chunks,
    parsing::{Parser, fetch_webpage, webpages_from_env},
    vectordb::VectorDB,
};

pub struct Pipeline {
    // Parsing options
    pub directory_path: String,
    // Chunking options
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    // Embedding options
    pub embedding_model: String,
    // VectorDB options
    qdrant_url: String,
    pub collection_name: String,
    pub embedding_dim: u64,
}

impl Pipeline {
    pub fn new(
        directory_path: String,
        chunk_size: usize,
        chunk_overlap: usize,
        embedding_model: String,
        qdrant_url: String,
        collection_name: String,
        embedding_dim: u64,
    ) -> Self {
        Self {
            directory_path,
            chunk_size,
            chunk_overlap,
            embedding_model,
            qdrant_url,
            collection_name,
            embedding_dim,
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            anyhow::anyhow!("OPENAI_API_KEY should be set in the environment to embed documents")
        })?;
        let openai_client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
        let parser = Parser::new(self.directory_path.clone());
        let vectordb = VectorDB::new(
            self.qdrant_url.clone(),
            self.collection_name.clone(),
            self.embedding_dim,
        );
        let mut documents = parser.parse().await?;
        for url in webpages_from_env() {
            match fetch_webpage(&url).await {
                Ok(text) => documents.push(text),
                Err(e) => eprintln!("Could not fetch {}: {}", url, e),
            }
        }
        vectordb.create_collection().await?;
        for document in documents {
            let mut chunks = chunk_text(&document, self.chunk_size, self.chunk_overlap);
            chunks = embed_chunks(&openai_client, &self.embedding_model, chunks).await?;
            vectordb.upload_embeddings(chunks).await?;
        }
        Ok(())
    }
}
