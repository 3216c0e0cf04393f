//! Token evidence: which words of the topic explain a match.
//!
//! Only n-grams backed by a matched skill (or, for reviewers with no matched
//! skill, n-grams almost identical to the reviewer's profile) are reported.

use std::collections::{BTreeMap, HashMap};

use ordered_float::OrderedFloat;

use capstone_embeddings::Embedding;
use capstone_embeddings::similarity::similarity_or_zero;

use crate::config::{EvidenceConfig, MatchThresholds};
use crate::model::{TokenEvidence, TopicContext, TopicField};
use crate::scoring::round_to;
use crate::skills::SkillAssessment;
use crate::text::{NGram, TextNormalizer};

/// N-gram candidates per field, before any reviewer is considered.
pub type FieldCandidates = BTreeMap<TopicField, Vec<NGram>>;

/// Extracts per-field token evidence for reviewers.
#[derive(Debug, Clone)]
pub struct TokenEvidenceExtractor {
    thresholds: MatchThresholds,
    config: EvidenceConfig,
}

impl TokenEvidenceExtractor {
    pub fn new(thresholds: MatchThresholds, config: EvidenceConfig) -> Self {
        Self { thresholds, config }
    }

    /// Scan the first n-grams of every non-empty field and keep the
    /// meaningful ones.
    pub fn candidates(&self, topic: &TopicContext, normalizer: &TextNormalizer) -> FieldCandidates {
        topic
            .non_empty_fields()
            .filter_map(|(field, text)| {
                let grams: Vec<NGram> = normalizer
                    .ngrams(text)
                    .into_iter()
                    .take(self.config.max_candidates_per_field)
                    .filter(|g| normalizer.is_meaningful_token(&g.normalized))
                    .collect();
                (!grams.is_empty()).then_some((field, grams))
            })
            .collect()
    }

    /// Evidence for one reviewer.
    ///
    /// `token_vectors` and `skill_vectors` are keyed by normalized text.
    /// Tokens without a vector contribute nothing.
    pub fn extract(
        &self,
        candidates: &FieldCandidates,
        assessment: &SkillAssessment,
        token_vectors: &HashMap<String, Embedding>,
        skill_vectors: &HashMap<String, Embedding>,
        reviewer_vector: Option<&Embedding>,
    ) -> BTreeMap<TopicField, Vec<TokenEvidence>> {
        let mut evidence = BTreeMap::new();

        for (field, grams) in candidates {
            let mut accepted: Vec<TokenEvidence> = grams
                .iter()
                .filter_map(|gram| {
                    let token_vector = token_vectors.get(&gram.normalized)?;
                    if assessment.has_matches() {
                        self.skill_backed(*field, gram, token_vector, assessment, skill_vectors)
                    } else {
                        self.reviewer_backed(gram, token_vector, reviewer_vector?)
                    }
                })
                .collect();

            if accepted.is_empty() {
                continue;
            }
            rank_and_dedupe(&mut accepted, self.config.max_tokens_per_field);
            evidence.insert(*field, accepted);
        }

        evidence
    }

    /// Accept a token through its closest field-relevant skill.
    fn skill_backed(
        &self,
        field: TopicField,
        gram: &NGram,
        token_vector: &Embedding,
        assessment: &SkillAssessment,
        skill_vectors: &HashMap<String, Embedding>,
    ) -> Option<TokenEvidence> {
        let (skill, similarity) = assessment
            .skills
            .iter()
            .filter(|s| s.field(field) >= self.thresholds.skill_field)
            .filter_map(|s| {
                let vector = skill_vectors.get(&s.key)?;
                Some((s, similarity_or_zero(token_vector, vector)))
            })
            .max_by_key(|(_, sim)| OrderedFloat(*sim))?;

        let accepted = skill.matched
            && similarity >= self.thresholds.token_skill
            && skill.topic_similarity >= self.thresholds.skill_topic;
        if !accepted {
            return None;
        }

        let combined = similarity * skill.field(field) * skill.topic_similarity;
        Some(TokenEvidence {
            token: gram.original.clone(),
            skill: Some(skill.tag.clone()),
            similarity: round_to(f64::from(similarity), 5),
            score: round_to(f64::from(combined), 5),
        })
    }

    /// Narrow fallback for reviewers without any matched skill: the token
    /// must be nearly identical to the reviewer profile and specific enough.
    fn reviewer_backed(
        &self,
        gram: &NGram,
        token_vector: &Embedding,
        reviewer_vector: &Embedding,
    ) -> Option<TokenEvidence> {
        let specific = gram.word_count > 1
            || gram.normalized.chars().count() >= self.thresholds.fallback_token_min_len;
        if !specific {
            return None;
        }

        let similarity = similarity_or_zero(token_vector, reviewer_vector);
        if similarity < self.thresholds.token_reviewer_fallback {
            return None;
        }

        Some(TokenEvidence {
            token: gram.original.clone(),
            skill: None,
            similarity: round_to(f64::from(similarity), 5),
            score: round_to(
                f64::from(similarity * self.thresholds.fallback_token_weight),
                5,
            ),
        })
    }
}

/// Best score first, then more words, then longer text; drop
/// case-insensitive duplicates and keep at most `limit`.
fn rank_and_dedupe(tokens: &mut Vec<TokenEvidence>, limit: usize) {
    tokens.sort_by(|a, b| {
        OrderedFloat(b.score)
            .cmp(&OrderedFloat(a.score))
            .then_with(|| b.word_count().cmp(&a.word_count()))
            .then_with(|| b.token.chars().count().cmp(&a.token.chars().count()))
    });

    let mut seen = std::collections::HashSet::new();
    tokens.retain(|t| seen.insert(t.token.to_lowercase()));
    tokens.truncate(limit);
}
