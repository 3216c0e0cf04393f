//! # Embeddings
//!
//! This crate provides the vector layer of the reviewer-matching engine:
//! turning text into embeddings, caching them with per-namespace expiry and
//! comparing them.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors through an
//!   [`EmbeddingProvider`]
//! - **TTL Caching**: Four independently expiring namespaces (token, skill,
//!   field, reviewer) behind one generic [`TtlCache`]
//! - **Bounded Gateway**: At most N provider calls in flight per gateway (or per
//!   shared permit pool), with failures degraded to "no vector"
//! - **Similarity**: Clamped cosine similarity and element-wise means
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingGateway ──► EmbeddingCache ──► TtlCache (x4)          │
//! │       │                                     │                   │
//! │       ▼                                     ▼                   │
//! │  Semaphore ──► EmbeddingProvider         Clock                  │
//! │                     │                                           │
//! │                     ▼                                           │
//! │               OpenAI / stub                                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod similarity;

pub use cache::{
    CacheStats, CacheTtls, Clock, EmbeddingCache, ManualClock, Namespace, SystemClock, TtlCache,
};
pub use error::{EmbeddingError, Result};
pub use gateway::{EmbeddingGateway, GatewayConfig};
pub use provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIProvider};
pub use similarity::{average, cosine_similarity};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
