//! Demo of reviewer suggestion.
//!
//! Uses OpenAI when OPENAI_API_KEY is set, otherwise a small keyword
//! embedder so the demo runs offline.
//!
//! Usage: cargo run -p capstone-matching --example suggest_demo

use std::sync::Arc;

use async_trait::async_trait;
use capstone_embeddings::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIProvider,
};
use capstone_matching::{
    OpenAIChatProvider, PerformanceSnapshot, ReviewerCandidate, ReviewerSuggester,
    SuggestOptions, TopicContext, TopicField,
};
use tracing_subscriber::EnvFilter;

const THEMES: [&[&str]; 4] = [
    &["blockchain", "chain", "ledger", "supply", "contract", "traceab"],
    &["machine", "learning", "model", "predict", "neural"],
    &["mobile", "android", "ios", "app"],
    &["database", "sql", "query", "storage"],
];

struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword-demo"
    }

    fn default_model(&self) -> &str {
        "keyword-demo"
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> capstone_embeddings::Result<EmbeddingResponse> {
        let mut embedding = vec![0.05; THEMES.len() + 1];
        for word in request.text.split_whitespace() {
            match THEMES
                .iter()
                .position(|theme| theme.iter().any(|k| word.starts_with(k)))
            {
                Some(axis) => embedding[axis] += 1.0,
                None => embedding[THEMES.len()] += 0.1,
            }
        }
        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: "keyword-demo".to_string(),
            tokens_used: None,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("capstone_matching=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let openai = OpenAIProvider::new();
    let mut builder = ReviewerSuggester::builder();
    builder = if openai.is_available() {
        println!("Using OpenAI embeddings and narratives\n");
        builder
            .with_embedding_provider(Arc::new(openai))
            .with_prompt_provider(Arc::new(OpenAIChatProvider::new()))
    } else {
        println!("OPENAI_API_KEY not set; using the offline keyword embedder\n");
        builder.with_embedding_provider(Arc::new(KeywordEmbedder))
    };
    let suggester = builder.build()?;

    let topic = TopicContext::titled("Blockchain-based supply chain traceability")
        .with_field(
            TopicField::TranslatedTitle,
            "Truy xuất nguồn gốc chuỗi cung ứng dựa trên blockchain",
        )
        .with_field(
            TopicField::Description,
            "A ledger that records every hand-over of agricultural goods so buyers can \
             verify origin.",
        )
        .with_field(TopicField::Category, "Distributed systems");

    let reliable = PerformanceSnapshot {
        quality_rating: Some(0.9),
        on_time_rate: Some(0.95),
        average_score_given: Some(0.7),
        ..PerformanceSnapshot::default()
    };

    let pool = vec![
        ReviewerCandidate::new(11, "Tran Minh")
            .with_skill("Blockchain", 4)
            .with_skill("Smart Contracts", 3)
            .with_active_assignments(2)
            .with_performance(reliable.clone()),
        ReviewerCandidate::new(12, "Nguyen Lan")
            .with_skill("Supply Chain Management", 3)
            .with_active_assignments(1),
        ReviewerCandidate::new(13, "Le Hoa")
            .with_skill("Machine Learning", 4)
            .with_performance(reliable),
        ReviewerCandidate::new(14, "Pham Quang")
            .with_skill("Blockchain", 4)
            .with_active_assignments(5),
        ReviewerCandidate::new(15, "Vo Thu"),
    ];

    let outcome = suggester
        .suggest(&topic, &pool, &SuggestOptions::new(3).with_narrative(true))
        .await?;

    println!("Ranked reviewers:");
    for (rank, s) in outcome.suggestions.iter().enumerate() {
        println!(
            "  {}. {} | overall {:.2} | skill {:.2} | workload {:.2} | eligible: {}",
            rank + 1,
            s.label(),
            s.overall_score,
            s.skill_match_score,
            s.workload_score,
            s.eligibility.eligible
        );
        if !s.matched_skills.is_empty() {
            println!("     matched: {}", s.matched_skills.join(", "));
        }
        for (field, tokens) in &s.evidence.per_field_top_tokens {
            let tokens: Vec<&str> = tokens.iter().map(|t| t.token.as_str()).collect();
            println!("     {field}: {}", tokens.join(" | "));
        }
        for reason in &s.eligibility.reasons {
            println!("     not eligible: {reason}");
        }
    }

    if !outcome.messages.is_empty() {
        println!("\nMessages:");
        for message in &outcome.messages {
            println!("  - {message}");
        }
    }

    if let Some(narrative) = &outcome.narrative {
        println!("\nNarrative ({:?}):\n{narrative}", outcome.narrative_source);
    }

    let stats = suggester.cache_stats().await;
    println!("\nCached embeddings: {}", stats.live_entries());

    Ok(())
}
