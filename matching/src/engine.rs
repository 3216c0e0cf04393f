//! Reviewer suggestion pipeline.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info};

use capstone_embeddings::similarity::average;
use capstone_embeddings::{
    CacheStats, Clock, Embedding, EmbeddingCache, EmbeddingError, EmbeddingGateway,
    EmbeddingProvider, Namespace, SystemClock,
};

use crate::config::MatchingConfig;
use crate::error::{MatchError, Result};
use crate::evidence::{FieldCandidates, TokenEvidenceExtractor};
use crate::model::{
    Eligibility, MatchEvidence, ReviewerCandidate, ReviewerId, SuggestOptions, SuggestionOutcome,
    SuggestionResult, TopicContext, TopicField,
};
use crate::narrative::ExplanationComposer;
use crate::prompt::PromptProvider;
use crate::ranking::SuggestionRanker;
use crate::repository::{ReviewerRepository, TopicRepository};
use crate::scoring::{Scorer, round_to};
use crate::skills::{SkillMatcher, TopicVectors};
use crate::text::TextNormalizer;

/// Suggests reviewers for capstone topics.
///
/// Owns every stage of the pipeline:
/// - Topic and skill embedding through a cached, bounded gateway
/// - Per-skill semantic matching and token evidence
/// - Scoring, eligibility and availability-first ranking
/// - An optional narrative for the shortlist
pub struct ReviewerSuggester {
    config: MatchingConfig,
    gateway: EmbeddingGateway,
    normalizer: TextNormalizer,
    matcher: SkillMatcher,
    extractor: TokenEvidenceExtractor,
    scorer: Scorer,
    ranker: SuggestionRanker,
    composer: ExplanationComposer,
}

/// Vectors shared by every reviewer of one request.
struct ResolvedTopic {
    vectors: TopicVectors,
    candidates: FieldCandidates,
    tokens: HashMap<String, Embedding>,
    skills: HashMap<String, Embedding>,
}

impl ReviewerSuggester {
    pub fn builder() -> ReviewerSuggesterBuilder {
        ReviewerSuggesterBuilder::new()
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn composer(&self) -> &ExplanationComposer {
        &self.composer
    }

    /// Entry counts of the embedding cache.
    pub async fn cache_stats(&self) -> CacheStats {
        self.gateway.cache().stats().await
    }

    /// Rank `candidates` for `topic`.
    ///
    /// Reviewers at workload capacity and reviewers without skills are not
    /// scored; each is reported in `messages` instead. Embedding failures
    /// only weaken the evidence and never fail the request.
    pub async fn suggest(
        &self,
        topic: &TopicContext,
        candidates: &[ReviewerCandidate],
        options: &SuggestOptions,
    ) -> Result<SuggestionOutcome> {
        if topic.is_empty() {
            return Err(MatchError::EmptyTopic);
        }
        if candidates.is_empty() {
            return Err(MatchError::EmptyCandidatePool);
        }

        let mut outcome = SuggestionOutcome::default();
        let pool: Vec<&ReviewerCandidate> = candidates
            .iter()
            .filter(|reviewer| match self.skip_reason(reviewer) {
                Some(reason) => {
                    debug!("Skipping reviewer {}: {reason}", reviewer.id);
                    outcome.messages.push(format!("Skipped {}: {reason}.", reviewer.label()));
                    false
                }
                None => true,
            })
            .collect();

        if pool.is_empty() {
            outcome
                .messages
                .push("No reviewer has both free capacity and recorded skills.".to_string());
        } else {
            let resolved = self.resolve_topic(topic, &pool).await;
            let scored =
                join_all(pool.iter().map(|reviewer| self.evaluate(reviewer, &resolved))).await;
            for result in &scored {
                for (field, similarity) in &result.evidence.per_field_max_similarity {
                    let best = outcome.topic_field_scores.entry(*field).or_insert(0.0);
                    *best = best.max(*similarity);
                }
            }
            outcome.suggestions = self.ranker.rank(scored, options.max_results.max(1));
        }

        if options.include_narrative {
            let narrative = self.composer.compose(&outcome.suggestions).await;
            outcome.messages.extend(narrative.warnings);
            outcome.narrative = Some(narrative.text);
            outcome.narrative_source = Some(narrative.source);
        }

        info!(
            "Suggested {} of {} reviewers ({} skipped)",
            outcome.suggestions.len(),
            candidates.len(),
            candidates.len() - pool.len()
        );
        Ok(outcome)
    }

    /// Whether `reviewer` may review `topic`, with reasons when not.
    pub async fn check_eligibility(
        &self,
        reviewer: &ReviewerCandidate,
        topic: &TopicContext,
    ) -> Result<Eligibility> {
        if topic.is_empty() {
            return Err(MatchError::EmptyTopic);
        }
        if let Some(reason) = self.skip_reason(reviewer) {
            return Ok(Eligibility::ineligible(reason));
        }

        let resolved = self.resolve_topic(topic, &[reviewer]).await;
        Ok(self.evaluate(reviewer, &resolved).await.eligibility)
    }

    fn skip_reason(&self, reviewer: &ReviewerCandidate) -> Option<String> {
        if self.scorer.is_saturated(reviewer.active_assignments) {
            return Some(format!(
                "{} active assignments reaches the limit of {}",
                reviewer.active_assignments, self.config.scoring.workload_capacity
            ));
        }
        if !reviewer.has_skills() {
            return Some("reviewer has no recorded skills".to_string());
        }
        None
    }

    /// Embed the topic fields, the pool's skills and the topic n-grams.
    async fn resolve_topic(
        &self,
        topic: &TopicContext,
        pool: &[&ReviewerCandidate],
    ) -> ResolvedTopic {
        let field_keys: Vec<(TopicField, String)> = topic
            .non_empty_fields()
            .map(|(field, text)| (field, self.normalizer.normalize(text)))
            .filter(|(_, key)| !key.is_empty())
            .collect();
        let field_vectors = self
            .gateway
            .resolve_many(Namespace::Field, field_keys.iter().map(|(_, key)| key))
            .await;

        let fields: BTreeMap<TopicField, Embedding> = field_keys
            .iter()
            .filter_map(|(field, key)| Some((*field, field_vectors.get(key)?.clone())))
            .collect();

        let mut topic_vector = average(fields.values());
        if topic_vector.is_none() {
            let combined = self.normalizer.normalize(&topic.combined_text());
            debug!("No field vector resolved; embedding the whole topic");
            topic_vector = self.gateway.resolve(Namespace::Field, &combined).await;
        }

        let skill_keys: BTreeSet<String> = pool
            .iter()
            .flat_map(|reviewer| SkillMatcher::distinct_skills(reviewer))
            .map(|(key, _, _)| key)
            .collect();
        let skills = self.gateway.resolve_many(Namespace::Skill, &skill_keys).await;

        let candidates = self.extractor.candidates(topic, &self.normalizer);
        let tokens = self
            .gateway
            .resolve_many(
                Namespace::Token,
                candidates.values().flatten().map(|gram| &gram.normalized),
            )
            .await;

        debug!(
            "Resolved {} field, {} skill and {} token vectors",
            fields.len(),
            skills.len(),
            tokens.len()
        );

        ResolvedTopic {
            vectors: TopicVectors {
                topic: topic_vector,
                fields,
            },
            candidates,
            tokens,
            skills,
        }
    }

    /// Mean of a reviewer's skill vectors, cached under the reviewer id and
    /// skill set so that a changed profile gets a fresh vector. A mean over
    /// only some of the skills is returned but not cached.
    async fn reviewer_vector(
        &self,
        reviewer: &ReviewerCandidate,
        skills: &HashMap<String, Embedding>,
    ) -> Option<Embedding> {
        let keys: Vec<String> = SkillMatcher::distinct_skills(reviewer)
            .into_iter()
            .map(|(key, _, _)| key)
            .collect();
        let cache_key = format!("{}|{}", reviewer.id, keys.join(","));

        let cache = self.gateway.cache();
        if let Some(hit) = cache.get(Namespace::Reviewer, &cache_key).await {
            return Some(hit);
        }

        let vector = average(keys.iter().filter_map(|key| skills.get(key)))?;
        if keys.iter().all(|key| skills.contains_key(key)) {
            cache
                .put(Namespace::Reviewer, cache_key, vector.clone())
                .await;
        } else {
            debug!("Partial skill vectors for reviewer {}; not caching", reviewer.id);
        }
        Some(vector)
    }

    async fn evaluate(
        &self,
        reviewer: &ReviewerCandidate,
        resolved: &ResolvedTopic,
    ) -> SuggestionResult {
        let reviewer_vector = self.reviewer_vector(reviewer, &resolved.skills).await;
        let assessment = self.matcher.assess(
            reviewer,
            &resolved.vectors,
            &resolved.skills,
            reviewer_vector.as_ref(),
        );
        let tokens = self.extractor.extract(
            &resolved.candidates,
            &assessment,
            &resolved.tokens,
            &resolved.skills,
            reviewer_vector.as_ref(),
        );

        let breakdown = self.scorer.score(reviewer, assessment.skill_match_score);
        let eligibility = self.scorer.eligibility(
            reviewer,
            assessment.has_matches(),
            assessment.skill_match_score,
        );

        SuggestionResult {
            reviewer_id: reviewer.id,
            display_name: reviewer.display_name.clone(),
            active_assignments: reviewer.active_assignments,
            skill_match_score: breakdown.skill_match,
            workload_score: breakdown.workload,
            performance_score: breakdown.performance,
            overall_score: breakdown.overall,
            matched_skills: assessment.matched.iter().map(|s| s.tag.clone()).collect(),
            evidence: MatchEvidence {
                per_field_max_similarity: assessment
                    .per_field_max
                    .iter()
                    .map(|(field, sim)| (*field, round_to(f64::from(*sim), 5)))
                    .collect(),
                matched_skills: assessment.matched,
                per_field_top_tokens: tokens,
            },
            eligibility,
        }
    }
}

/// Builder for [`ReviewerSuggester`].
pub struct ReviewerSuggesterBuilder {
    config: MatchingConfig,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    prompt_provider: Option<Arc<dyn PromptProvider>>,
    clock: Arc<dyn Clock>,
    cache: Option<Arc<EmbeddingCache>>,
    gateway: Option<EmbeddingGateway>,
}

impl ReviewerSuggesterBuilder {
    pub fn new() -> Self {
        Self {
            config: MatchingConfig::default(),
            embedding_provider: None,
            prompt_provider: None,
            clock: Arc::new(SystemClock),
            cache: None,
            gateway: None,
        }
    }

    pub fn with_config(mut self, config: MatchingConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the embedding provider. Required unless a gateway is given.
    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the narrative provider. Without one, narratives use the template.
    pub fn with_prompt_provider(mut self, provider: Arc<dyn PromptProvider>) -> Self {
        self.prompt_provider = Some(provider);
        self
    }

    /// Clock for cache expiry and the quota breaker.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing cache instead of creating one from the config.
    pub fn with_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use an existing gateway, sharing its provider, cache and concurrency
    /// cap with every other suggester built on it. Takes precedence over
    /// [`with_embedding_provider`](Self::with_embedding_provider) and
    /// [`with_cache`](Self::with_cache).
    pub fn with_gateway(mut self, gateway: EmbeddingGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn build(self) -> Result<ReviewerSuggester> {
        self.config.validate()?;
        let config = self.config;

        let gateway = match self.gateway {
            Some(gateway) => gateway,
            None => {
                let provider = self
                    .embedding_provider
                    .ok_or(MatchError::Embedding(EmbeddingError::ProviderNotConfigured))?;
                let cache = self.cache.unwrap_or_else(|| {
                    Arc::new(EmbeddingCache::new(
                        &config.cache.ttls,
                        config.cache.max_entries_per_namespace,
                        self.clock.clone(),
                    ))
                });
                EmbeddingGateway::new(provider, cache, &config.gateway)
            }
        };

        info!(
            "Reviewer suggester using embedding provider {}",
            gateway.provider_name()
        );

        Ok(ReviewerSuggester {
            gateway,
            normalizer: TextNormalizer::new(),
            matcher: SkillMatcher::new(config.thresholds.clone()),
            extractor: TokenEvidenceExtractor::new(
                config.thresholds.clone(),
                config.evidence.clone(),
            ),
            scorer: Scorer::new(config.scoring.clone(), &config.thresholds),
            ranker: SuggestionRanker,
            composer: ExplanationComposer::new(
                self.prompt_provider,
                config.narrative.clone(),
                self.clock,
            ),
            config,
        })
    }
}

impl Default for ReviewerSuggesterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Id-based access to the suggester through topic and reviewer repositories.
pub struct SuggestionService {
    suggester: ReviewerSuggester,
    topics: Arc<dyn TopicRepository>,
    reviewers: Arc<dyn ReviewerRepository>,
}

impl SuggestionService {
    pub fn new(
        suggester: ReviewerSuggester,
        topics: Arc<dyn TopicRepository>,
        reviewers: Arc<dyn ReviewerRepository>,
    ) -> Self {
        Self {
            suggester,
            topics,
            reviewers,
        }
    }

    pub fn suggester(&self) -> &ReviewerSuggester {
        &self.suggester
    }

    /// Suggest reviewers for a stored topic from the configured role's pool.
    pub async fn suggest_for_topic(
        &self,
        topic_id: &str,
        options: &SuggestOptions,
    ) -> Result<SuggestionOutcome> {
        let topic = self.topics.get_context(topic_id).await?;
        let pool = self.load_pool().await?;
        debug!("Suggesting reviewers for topic {topic_id} from {} candidates", pool.len());
        self.suggester.suggest(&topic, &pool, options).await
    }

    /// Eligibility of one reviewer from the pool.
    pub async fn check_eligibility(
        &self,
        reviewer_id: ReviewerId,
        topic: &TopicContext,
    ) -> Result<Eligibility> {
        let reviewer = self
            .load_pool()
            .await?
            .into_iter()
            .find(|r| r.id == reviewer_id)
            .ok_or(MatchError::ReviewerNotFound(reviewer_id))?;
        self.suggester.check_eligibility(&reviewer, topic).await
    }

    async fn load_pool(&self) -> Result<Vec<ReviewerCandidate>> {
        self.reviewers
            .get_candidates(&self.suggester.config().candidate_role)
            .await
    }
}
