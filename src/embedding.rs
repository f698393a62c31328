use async_openai::{Client, config::OpenAIConfig, types::embeddings::CreateEmbeddingRequestArgs};

use crate::chunking::Chunk;

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIM: u64 = 1536;

const EMBED_BATCH_SIZE: usize = 64;

pub async fn embed_chunks(
    client: &Client<OpenAIConfig>,
    model: &str,
    mut chunks: Vec<Chunk>,
) -> anyhow::Result<Vec<Chunk>> {
    let total = chunks.len();
    println!("Starting to embed {:?} chunks", total);
    let mut done = 0;
    for batch in chunks.chunks_mut(EMBED_BATCH_SIZE) {
        let inputs: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let request = CreateEmbeddingRequestArgs::default()
            .model(model)
            .input(inputs)
            .build()?;
        let response = client.embeddings().create(request).await?;
        if response.data.len() != batch.len() {
            return Err(anyhow::anyhow!(
                "Embedding API returned {} vectors for {} inputs",
                response.data.len(),
                batch.len()
            ));
        }
        for data in response.data {
            batch[data.index as usize].embedding = Some(data.embedding);
        }
        done += batch.len();
        println!("Progress: {:?}/{:?}", done, total);
    }
    Ok(chunks)
}

pub async fn embed_text(
    client: &Client<OpenAIConfig>,
    model: &str,
    text: &str,
) -> anyhow::Result<Vec<f32>> {
    let request = CreateEmbeddingRequestArgs::default()
        .model(model)
        .input(text.to_string())
        .build()?;
    let mut response = client.embeddings().create(request).await?;
    match response.data.pop() {
        Some(data) => Ok(data.embedding),
        None => Err(anyhow::anyhow!("Embedding API returned no vector")),
    }
}
