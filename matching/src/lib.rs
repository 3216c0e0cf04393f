//! # Reviewer Matching
//!
//! Suggests reviewers for submitted capstone topics by semantic similarity
//! between the topic text and each reviewer's skills, balanced against
//! current workload and past review performance.
//!
//! ## Features
//!
//! - **Dual-threshold skill matching**: a skill must fit the whole topic and
//!   at least one specific field
//! - **Token evidence**: the topic n-grams that explain each match
//! - **Availability-first ranking**: fewer active assignments wins, score
//!   breaks ties
//! - **Narratives**: a two-paragraph explanation from a prompt provider, with
//!   a deterministic template when the provider is missing or misbehaves
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      ReviewerSuggester                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  TopicContext ──► TextNormalizer ──► EmbeddingGateway           │
//! │                                          │                      │
//! │                                          ▼                      │
//! │  SkillMatcher ──► TokenEvidenceExtractor ──► Scorer             │
//! │                                               │                 │
//! │                                               ▼                 │
//! │                 SuggestionRanker ──► ExplanationComposer        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use capstone_matching::{ReviewerCandidate, ReviewerSuggester, SuggestOptions, TopicContext};
//!
//! let suggester = ReviewerSuggester::builder()
//!     .with_embedding_provider(provider)
//!     .build()?;
//!
//! let topic = TopicContext::titled("Blockchain supply chain tracking");
//! let pool = vec![ReviewerCandidate::new(1, "Tran An").with_skill("Blockchain", 4)];
//! let outcome = suggester.suggest(&topic, &pool, &SuggestOptions::default()).await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod model;
pub mod narrative;
pub mod prompt;
pub mod ranking;
pub mod repository;
pub mod scoring;
pub mod skills;
pub mod text;

pub use config::{
    CacheConfig, EvidenceConfig, MatchThresholds, MatchingConfig, NarrativeConfig, ScoringConfig,
};
pub use engine::{ReviewerSuggester, ReviewerSuggesterBuilder, SuggestionService};
pub use error::{MatchError, Result};
pub use model::{
    Eligibility, MatchEvidence, MatchedSkill, NarrativeSource, PerformanceSnapshot,
    ReviewerCandidate, ReviewerId, ReviewerSkill, SuggestOptions, SuggestionOutcome,
    SuggestionResult, TokenEvidence, TopicContext, TopicField,
};
pub use narrative::{CircuitBreaker, ComposedNarrative, ExplanationComposer};
pub use prompt::{OpenAIChatProvider, PromptError, PromptProvider};
pub use repository::{
    InMemoryReviewerRepository, InMemoryTopicRepository, ReviewerRepository, TopicRepository,
};
