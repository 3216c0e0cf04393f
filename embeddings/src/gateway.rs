//! Cache-through, concurrency-bounded access to an embedding provider.
//!
//! Every lookup goes cache first. Misses are fetched on spawned tasks that
//! each hold one permit of the gateway's semaphore, so at most
//! `max_concurrent_requests` provider calls are outstanding across all clones
//! of a gateway, however many requests overlap. Separate gateways share one
//! cap through [`EmbeddingGateway::with_permits`].
//!
//! A fetch that fails or times out is logged and leaves the key uncached;
//! the caller sees "no vector".

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::Embedding;
use crate::cache::{EmbeddingCache, Namespace};
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest};

/// Configuration for the embedding gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Provider calls allowed in flight at once through one gateway.
    pub max_concurrent_requests: usize,

    /// Per-call timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 6,
            request_timeout_ms: 15_000,
        }
    }
}

/// Resolves text to embeddings through the cache and a bounded provider.
///
/// Cheap to clone; clones share the provider, cache and permits.
#[derive(Clone)]
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl EmbeddingGateway {
    /// Create a gateway in front of `provider`.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<EmbeddingCache>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            permits: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Draw fetch permits from `permits` instead of the gateway's own
    /// semaphore.
    pub fn with_permits(mut self, permits: Arc<Semaphore>) -> Self {
        self.permits = permits;
        self
    }

    /// Name of the provider behind this gateway.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn permits(&self) -> &Arc<Semaphore> {
        &self.permits
    }

    /// The cache this gateway reads and fills.
    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Permits not currently held by a fetch.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Resolve one key, swallowing failures.
    ///
    /// `key` is expected to be already normalized; it is both the cache key
    /// and the text sent to the provider.
    pub async fn resolve(&self, namespace: Namespace, key: &str) -> Option<Embedding> {
        if key.trim().is_empty() {
            return None;
        }
        if let Some(hit) = self.cache.get(namespace, key).await {
            return Some(hit);
        }
        self.spawn_fetch(namespace, key.to_string()).await
    }

    /// Resolve a batch of keys concurrently.
    ///
    /// Duplicate and blank keys are dropped. Keys that could not be resolved
    /// are simply absent from the result.
    pub async fn resolve_many<I, S>(
        &self,
        namespace: Namespace,
        keys: I,
    ) -> HashMap<String, Embedding>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = keys
            .into_iter()
            .map(|k| k.as_ref().to_string())
            .filter(|k| !k.trim().is_empty())
            .collect();

        let mut resolved = HashMap::with_capacity(unique.len());
        let mut misses = Vec::new();
        for key in unique {
            match self.cache.get(namespace, &key).await {
                Some(hit) => {
                    resolved.insert(key, hit);
                }
                None => misses.push(key),
            }
        }

        if !misses.is_empty() {
            debug!(
                "Fetching {} {namespace} embeddings ({} cached)",
                misses.len(),
                resolved.len()
            );
        }

        let fetched = join_all(misses.into_iter().map(|key| async move {
            let embedding = self.spawn_fetch(namespace, key.clone()).await;
            (key, embedding)
        }))
        .await;

        resolved.extend(
            fetched
                .into_iter()
                .filter_map(|(key, embedding)| embedding.map(|e| (key, e))),
        );
        resolved
    }

    /// Run the fetch on its own task so it finishes (and fills the cache)
    /// even if the caller is dropped.
    async fn spawn_fetch(&self, namespace: Namespace, key: String) -> Option<Embedding> {
        let gateway = self.clone();
        let handle = tokio::spawn(async move {
            match gateway.fetch(namespace, &key).await {
                Ok(embedding) => Some(embedding),
                Err(e) => {
                    warn!("Embedding lookup failed ({namespace}) for {key:?}: {e}");
                    None
                }
            }
        });

        match handle.await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Embedding task aborted ({namespace}): {e}");
                None
            }
        }
    }

    /// Fetch from the provider while holding a permit, then cache.
    async fn fetch(&self, namespace: Namespace, key: &str) -> Result<Embedding> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| EmbeddingError::ApiRequest(e.to_string()))?;

        // Another request may have filled the key while this one queued.
        if let Some(hit) = self.cache.get(namespace, key).await {
            return Ok(hit);
        }

        let request = EmbeddingRequest::new(key);
        let response = tokio::time::timeout(self.timeout, self.provider.embed(request))
            .await
            .map_err(|_| EmbeddingError::Timeout {
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })??;

        if response.embedding.is_empty() {
            return Err(EmbeddingError::InvalidResponse(
                "empty embedding vector".to_string(),
            ));
        }

        self.cache
            .put(namespace, key, response.embedding.clone())
            .await;
        Ok(response.embedding)
    }
}
