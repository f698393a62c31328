use std::collections::HashMap;

use tokio::io::AsyncWriteExt;

const DEFAULT_CACHE_DIR: &str = "./.ophelia-cache";
const CACHE_ENTRY: &str = "query-cache";
const WRITE_CHUNK_SIZE: usize = 1024;

/// On-disk cache of retrieved passages, keyed by the literal query string.
/// The whole map lives in one record that is rewritten on every insert; no
/// normalization of keys, no TTL, no size bound.
#[derive(Debug)]
pub struct QueryCache {
    pub directory: String,
    entries: HashMap<String, Vec<String>>,
}

impl QueryCache {
    pub async fn open(directory: Option<String>) -> Self {
        let cache_dir = match directory {
            Some(s) => s,
            None => DEFAULT_CACHE_DIR.to_string(),
        };
        let entries = match cacache::read(&cache_dir, CACHE_ENTRY).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    eprintln!("Could not decode the query cache, starting empty: {}", e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            directory: cache_dir,
            entries,
        }
    }

    pub fn get(&self, query: &str) -> Option<&Vec<String>> {
        self.entries.get(query)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn insert(
        &mut self,
        query: String,
        passages: Vec<String>,
    ) -> anyhow::Result<()> {
        self.entries.insert(query, passages);
        self.persist().await
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let encoded = serde_json::to_vec(&self.entries)?;
        let mut fd = cacache::Writer::create(&self.directory, CACHE_ENTRY).await?;
        for chunk in encoded.chunks(WRITE_CHUNK_SIZE) {
            fd.write_all(chunk).await?;
        }
        fd.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_cache_dir(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("ophelia-cache-{}-{}", name, std::process::id()))
            .to_string_lossy()
            .to_string()
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let dir = test_cache_dir("roundtrip");
        let mut cache = QueryCache::open(Some(dir.clone())).await;
        cache
            .insert("what is rust?".to_string(), vec!["a language".to_string()])
            .await
            .unwrap();
        assert_eq!(
            cache.get("what is rust?"),
            Some(&vec!["a language".to_string()])
        );
        let _ = cacache::clear(&dir).await;
    }

    #[tokio::test]
    async fn test_keys_are_exact_match() {
        let dir = test_cache_dir("exact");
        let mut cache = QueryCache::open(Some(dir.clone())).await;
        cache
            .insert("What is Rust?".to_string(), vec!["ctx".to_string()])
            .await
            .unwrap();
        assert!(cache.get("what is rust?").is_none());
        assert!(cache.get("What is Rust? ").is_none());
        assert!(cache.get("What is Rust?").is_some());
        let _ = cacache::clear(&dir).await;
    }

    #[tokio::test]
    async fn test_cache_survives_reopen() {
        let dir = test_cache_dir("reopen");
        {
            let mut cache = QueryCache::open(Some(dir.clone())).await;
            cache
                .insert("persisted?".to_string(), vec!["yes".to_string()])
                .await
                .unwrap();
        }
        let reopened = QueryCache::open(Some(dir.clone())).await;
        assert_eq!(reopened.get("persisted?"), Some(&vec!["yes".to_string()]));
        let _ = cacache::clear(&dir).await;
    }

    #[tokio::test]
    async fn test_missing_record_starts_empty() {
        let dir = test_cache_dir("empty");
        let cache = QueryCache::open(Some(dir)).await;
        assert!(cache.is_empty());
        assert_eq!(cache.len(), 0);
    }
}
