use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::FederationProvider;

/// Short-lived, single-use SSO state entries.
#[async_trait]
pub trait StateCache: Send + Sync {
    async fn put_state(
        &self,
        state: &str,
        provider: FederationProvider,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error>;

    /// Remove and return the provider stored for `state` in one atomic step.
    async fn take_state(&self, state: &str) -> Result<Option<String>, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

fn state_key(state: &str) -> String {
    format!("sso_state:{}", state)
}

#[derive(Clone)]
pub struct RedisService {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisService {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // Use ConnectionManager for automatic reconnection
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl StateCache for RedisService {
    async fn put_state(
        &self,
        state: &str,
        provider: FederationProvider,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(state_key(state))
            .arg(provider.as_str())
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to store SSO state: {}", e))
    }

    async fn take_state(&self, state: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GETDEL")
            .arg(state_key(state))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to consume SSO state: {}", e))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// Process-local state cache with the same expiry and single-use semantics.
#[derive(Default)]
pub struct InMemoryStateCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateCache for InMemoryStateCache {
    async fn put_state(
        &self,
        state: &str,
        provider: FederationProvider,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("State cache mutex poisoned: {}", e))?
            .insert(state_key(state), (provider.as_str().to_string(), expires_at));
        Ok(())
    }

    async fn take_state(&self, state: &str) -> Result<Option<String>, anyhow::Error> {
        let entry = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("State cache mutex poisoned: {}", e))?
            .remove(&state_key(state));
        Ok(entry
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(provider, _)| provider))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_is_single_use() {
        let cache = InMemoryStateCache::new();
        cache
            .put_state("abc", FederationProvider::Github, 300)
            .await
            .unwrap();

        assert_eq!(cache.take_state("abc").await.unwrap().as_deref(), Some("github"));
        assert_eq!(cache.take_state("abc").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_expired_state_is_rejected() {
        let cache = InMemoryStateCache::new();
        cache
            .put_state("abc", FederationProvider::Google, 0)
            .await
            .unwrap();

        assert_eq!(cache.take_state("abc").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires running Redis
    async fn test_redis_state_round_trip() {
        let config = crate::config::RedisConfig {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string()),
        };
        let redis = RedisService::new(&config).await.unwrap();
        redis
            .put_state("it-state", FederationProvider::Github, 30)
            .await
            .unwrap();
        assert_eq!(
            redis.take_state("it-state").await.unwrap().as_deref(),
            Some("github")
        );
        assert_eq!(redis.take_state("it-state").await.unwrap(), None);
    }
}
