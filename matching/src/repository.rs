//! Sources of topics and reviewer candidates.
//!
//! Persistence lives outside this crate; these traits are the seam. The
//! in-memory implementations back tests and the demo.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{MatchError, Result};
use crate::model::{ReviewerCandidate, TopicContext};

/// Loads topic text by id.
#[async_trait]
pub trait TopicRepository: Send + Sync {
    async fn get_context(&self, topic_id: &str) -> Result<TopicContext>;
}

/// Loads the pool of reviewer candidates.
#[async_trait]
pub trait ReviewerRepository: Send + Sync {
    /// Candidates holding `role`.
    async fn get_candidates(&self, role: &str) -> Result<Vec<ReviewerCandidate>>;
}

/// Topics held in memory.
#[derive(Default)]
pub struct InMemoryTopicRepository {
    topics: RwLock<HashMap<String, TopicContext>>,
}

impl InMemoryTopicRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, topic_id: impl Into<String>, topic: TopicContext) {
        self.topics.write().await.insert(topic_id.into(), topic);
    }
}

#[async_trait]
impl TopicRepository for InMemoryTopicRepository {
    async fn get_context(&self, topic_id: &str) -> Result<TopicContext> {
        self.topics
            .read()
            .await
            .get(topic_id)
            .cloned()
            .ok_or_else(|| MatchError::TopicNotFound(topic_id.to_string()))
    }
}

/// Reviewers held in memory, each with a set of roles.
#[derive(Default)]
pub struct InMemoryReviewerRepository {
    reviewers: RwLock<Vec<(Vec<String>, ReviewerCandidate)>>,
}

impl InMemoryReviewerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reviewer holding the given roles.
    pub async fn insert<I, S>(&self, roles: I, reviewer: ReviewerCandidate)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles = roles.into_iter().map(Into::into).collect();
        self.reviewers.write().await.push((roles, reviewer));
    }
}

#[async_trait]
impl ReviewerRepository for InMemoryReviewerRepository {
    async fn get_candidates(&self, role: &str) -> Result<Vec<ReviewerCandidate>> {
        Ok(self
            .reviewers
            .read()
            .await
            .iter()
            .filter(|(roles, _)| roles.iter().any(|r| r.eq_ignore_ascii_case(role)))
            .map(|(_, reviewer)| reviewer.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_role_filter() {
        tokio_test::block_on(async {
            let repo = InMemoryReviewerRepository::new();
            repo.insert(["reviewer", "lecturer"], ReviewerCandidate::new(1, "An"))
                .await;
            repo.insert(["student"], ReviewerCandidate::new(2, "Binh")).await;

            let reviewers = repo.get_candidates("Reviewer").await.unwrap();
            let ids: Vec<i64> = reviewers.iter().map(|r| r.id).collect();
            assert_eq!(ids, vec![1]);
        });
    }

    #[tokio::test]
    async fn test_missing_topic() {
        let repo = InMemoryTopicRepository::new();
        repo.insert("T-1", TopicContext::titled("Smart farming")).await;

        assert_eq!(
            repo.get_context("T-1").await.unwrap().title,
            "Smart farming"
        );
        assert!(matches!(
            repo.get_context("T-2").await,
            Err(MatchError::TopicNotFound(id)) if id == "T-2"
        ));
    }
}
