use qdrant_client::{
    Payload, Qdrant,
    qdrant::{
        CreateCollectionBuilder, Distance, PointStruct, QueryPointsBuilder,
        UpsertPointsBuilder, VectorParamsBuilder, value::Kind,
    },
};
use uuid::Uuid;

use crate::chunking::Chunk;

#[derive(Debug, Clone)]
pub struct VectorDB {
    pub collection_name: String,
    pub url: String,
    pub embedding_dim: u64,
}

impl VectorDB {
    pub fn new(url: String, collection_name: String, embedding_dim: u64) -> Self {
        Self {
            collection_name,
            url,
            embedding_dim,
        }
    }

    fn client(&self) -> anyhow::Result<Qdrant> {
        let client = Qdrant::from_url(&self.url)
            .api_key(std::env::var("QDRANT_API_KEY"))
            .build()?;
        Ok(client)
    }

    pub async fn create_collection(&self) -> anyhow::Result<()> {
        let client = self.client()?;
        println!("Starting to create collection {}", self.collection_name);
        let collection_exists = client.collection_exists(&self.collection_name).await?;
        if collection_exists {
            println!("Collection {} already exists", self.collection_name);
            return Ok(());
        }
        let response = client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection_name).vectors_config(
                    VectorParamsBuilder::new(self.embedding_dim, Distance::Cosine),
                ),
            )
            .await?;
        if response.result {
            println!("Collection {} successfully created", self.collection_name);
            Ok(())
        } else {
            eprintln!(
                "There was an error creating collection: {}",
                self.collection_name
            );
            Err(anyhow::anyhow!(
                "There was an error creating the Qdrant collection"
            ))
        }
    }

    pub async fn upload_embeddings(&self, chunks: Vec<Chunk>) -> anyhow::Result<()> {
        let client = self.client()?;
        let collection_exists = client.collection_exists(&self.collection_name).await?;
        if !collection_exists {
            eprintln!(
                "Collection {} does not exist. Please run `create_collection` before using this function",
                self.collection_name
            );
            return Err(anyhow::anyhow!(
                "Collection does not exist. Please run `create_collection` before using this function"
            ));
        }
        println!(
            "Starting to upload embeddings to collection {}",
            self.collection_name
        );
        let mut points: Vec<PointStruct> = vec![];
        for (i, chunk) in chunks.into_iter().enumerate() {
            let embedding = match chunk.embedding {
                Some(e) => e,
                None => {
                    eprintln!(
                        "Chunk {:?} does not have an associated embedding, skipping...",
                        i
                    );
                    continue;
                }
            };
            let mut payload = Payload::new();
            payload.insert("content", chunk.content);
            let point = PointStruct::new(Uuid::new_v4().to_string(), embedding, payload);
            points.push(point);
        }
        if points.is_empty() {
            eprintln!("No embedded chunks to upload");
            return Ok(());
        }
        let response = client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points))
            .await?;
        match response.result {
            Some(r) => {
                if r.status >= 200 && r.status <= 299 {
                    println!("All the vectors have been succcessfully uploaded");
                } else {
                    eprintln!(
                        "There was an error while uploading vectors. Status: {:?}",
                        r.status
                    );
                    return Err(anyhow::anyhow!(
                        "There was an error while uploading vectors"
                    ));
                }
            }
            None => {
                eprintln!("The uploading operation did not produce any result");
                return Err(anyhow::anyhow!(
                    "The uploading operation did not produce any result"
                ));
            }
        }
        Ok(())
    }

    pub async fn check_collection_ready(&self) -> anyhow::Result<bool> {
        let client = self.client()?;
        let collection_exists = client.collection_exists(&self.collection_name).await?;
        if !collection_exists {
            eprintln!(
                "Collection {} does not exist. Please run `create_collection` before using this function",
                self.collection_name
            );
            return Err(anyhow::anyhow!(
                "Collection does not exist. Please run `create_collection` before using this function"
            ));
        }
        let result = client.collection_info(&self.collection_name).await?;
        let collection_info = match result.result {
            Some(r) => r,
            None => {
                eprintln!("Could not retrieve collection information");
                return Err(anyhow::anyhow!("Could not retrieve collection information"));
            }
        };
        match collection_info.points_count {
            Some(p) => {
                if p > 0 {
                    println!("Collection is loaded and ready to be used");
                    Ok(true)
                } else {
                    eprintln!("Collection does not have any data points");
                    Ok(false)
                }
            }
            None => {
                eprintln!("Could not retrieve the number of data points in the collection");
                Err(anyhow::anyhow!(
                    "Could not retrieve the number of data points in the collection"
                ))
            }
        }
    }

    pub async fn search(&self, embedding: Vec<f32>, limit: u64) -> anyhow::Result<Vec<String>> {
        let client = self.client()?;
        let query = QueryPointsBuilder::new(&self.collection_name)
            .query(embedding)
            .limit(limit)
            .with_payload(true);
        let results = client.query(query).await?;
        let mut contents: Vec<String> = vec![];
        for res in results.result {
            let content = match res.payload.get("content").and_then(|v| v.kind.as_ref()) {
                Some(Kind::StringValue(s)) => s.clone(),
                _ => {
                    eprintln!("Point does not have an associated text content");
                    continue;
                }
            };
            contents.push(content);
        }

        Ok(contents)
    }
}
