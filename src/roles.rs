use std::collections::HashMap;

use redis::AsyncCommands;

const ROLES_KEY: &str = "roles";

/// Named system prompts ("roles") kept in a Redis hash, one field per role.
#[derive(Clone)]
pub struct RoleStore {
    client: redis::Client,
}

impl RoleStore {
    pub fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> anyhow::Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Returns false when a role with this name already exists.
    pub async fn create(&self, name: &str, content: &str) -> anyhow::Result<bool> {
        let mut conn = self.connection().await?;
        let created: bool = conn.hset_nx(ROLES_KEY, name, content).await?;
        Ok(created)
    }

    pub async fn get(&self, name: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.connection().await?;
        let content: Option<String> = conn.hget(ROLES_KEY, name).await?;
        Ok(content)
    }

    pub async fn all(&self) -> anyhow::Result<HashMap<String, String>> {
        let mut conn = self.connection().await?;
        let roles: HashMap<String, String> = conn.hgetall(ROLES_KEY).await?;
        Ok(roles)
    }

    /// Returns false when no role with this name exists.
    pub async fn delete(&self, name: &str) -> anyhow::Result<bool> {
        let mut conn = self.connection().await?;
        let removed: u64 = conn.hdel(ROLES_KEY, name).await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_role_store_roundtrip() {
        let url = match std::env::var("REDIS_URL") {
            Ok(s) => s,
            Err(_) => {
                println!("Skipping test because Redis is not available");
                return;
            }
        };
        let store = RoleStore::connect(&url).unwrap();
        let name = format!("test-role-{}", std::process::id());
        let _ = store.delete(&name).await;
        assert!(store.create(&name, "Act as a pirate").await.unwrap());
        assert!(!store.create(&name, "Act as a pirate").await.unwrap());
        assert_eq!(
            store.get(&name).await.unwrap(),
            Some("Act as a pirate".to_string())
        );
        assert!(store.all().await.unwrap().contains_key(&name));
        assert!(store.delete(&name).await.unwrap());
        assert!(!store.delete(&name).await.unwrap());
        assert_eq!(store.get(&name).await.unwrap(), None);
    }
}
