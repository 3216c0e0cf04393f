//! Per-skill semantic matching.
//!
//! A skill is only a match when it is close to the topic as a whole *and*
//! to at least one specific field. Topic-level similarity alone lets broad
//! skills match almost anything; the field requirement keeps e.g.
//! "blockchain" away from an unrelated music-app topic.

use std::collections::{BTreeMap, HashMap};

use capstone_embeddings::Embedding;
use capstone_embeddings::similarity::similarity_or_zero;

use crate::config::MatchThresholds;
use crate::model::{MatchedSkill, ReviewerCandidate, TopicField};
use crate::scoring::round_to;
use crate::text::normalize;

/// Resolved vectors for one topic.
#[derive(Debug, Clone, Default)]
pub struct TopicVectors {
    /// Mean of the field vectors (or the whole-context embedding).
    pub topic: Option<Embedding>,

    /// One vector per resolved field.
    pub fields: BTreeMap<TopicField, Embedding>,
}

/// Similarities of one reviewer skill against the topic.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillSimilarity {
    /// Tag as recorded for the reviewer.
    pub tag: String,

    /// Normalized tag; the skill-vector key.
    pub key: String,

    pub level: u8,
    pub topic_similarity: f32,
    pub field_similarity: BTreeMap<TopicField, f32>,
    pub matched: bool,
}

impl SkillSimilarity {
    /// Best similarity against any single field.
    pub fn max_field_similarity(&self) -> f32 {
        self.field_similarity
            .values()
            .copied()
            .fold(0.0, f32::max)
    }

    pub fn field(&self, field: TopicField) -> f32 {
        self.field_similarity.get(&field).copied().unwrap_or(0.0)
    }
}

/// Outcome of matching one reviewer's skills.
#[derive(Debug, Clone, Default)]
pub struct SkillAssessment {
    /// Every skill with a resolved vector.
    pub skills: Vec<SkillSimilarity>,

    /// Matched skills, best topic similarity first.
    pub matched: Vec<MatchedSkill>,

    /// Highest similarity per field over all skills, matched or not.
    pub per_field_max: BTreeMap<TopicField, f32>,

    /// Score used for ranking, rounded to 5 decimals.
    pub skill_match_score: f64,

    /// Topic-to-reviewer similarity, computed only when nothing matched.
    pub fallback_similarity: Option<f32>,
}

impl SkillAssessment {
    pub fn has_matches(&self) -> bool {
        !self.matched.is_empty()
    }

    /// The assessed skill for a normalized tag.
    pub fn skill(&self, key: &str) -> Option<&SkillSimilarity> {
        self.skills.iter().find(|s| s.key == key)
    }
}

/// Decides which of a reviewer's skills semantically match a topic.
#[derive(Debug, Clone)]
pub struct SkillMatcher {
    thresholds: MatchThresholds,
}

impl SkillMatcher {
    pub fn new(thresholds: MatchThresholds) -> Self {
        Self { thresholds }
    }

    /// Distinct normalized skill tags of a reviewer, keeping the highest
    /// level when a tag appears more than once.
    pub fn distinct_skills(reviewer: &ReviewerCandidate) -> Vec<(String, String, u8)> {
        let mut by_key: BTreeMap<String, (String, u8)> = BTreeMap::new();
        for skill in &reviewer.skills {
            let key = normalize(&skill.tag);
            if key.is_empty() {
                continue;
            }
            by_key
                .entry(key)
                .and_modify(|(_, level)| *level = (*level).max(skill.level))
                .or_insert_with(|| (skill.tag.trim().to_string(), skill.level));
        }
        by_key
            .into_iter()
            .map(|(key, (tag, level))| (key, tag, level))
            .collect()
    }

    /// Match every resolved skill of `reviewer` against the topic.
    ///
    /// Skills without a vector are skipped. `reviewer_vector` is only used
    /// when no skill passes both thresholds.
    pub fn assess(
        &self,
        reviewer: &ReviewerCandidate,
        topic: &TopicVectors,
        skill_vectors: &HashMap<String, Embedding>,
        reviewer_vector: Option<&Embedding>,
    ) -> SkillAssessment {
        let mut assessment = SkillAssessment::default();

        for (key, tag, level) in Self::distinct_skills(reviewer) {
            let Some(skill_vector) = skill_vectors.get(&key) else {
                continue;
            };

            let topic_similarity = topic
                .topic
                .as_ref()
                .map_or(0.0, |t| similarity_or_zero(t, skill_vector));

            let field_similarity: BTreeMap<TopicField, f32> = topic
                .fields
                .iter()
                .map(|(field, vector)| (*field, similarity_or_zero(vector, skill_vector)))
                .collect();

            for (field, sim) in &field_similarity {
                let best = assessment.per_field_max.entry(*field).or_insert(0.0);
                *best = best.max(*sim);
            }

            let mut skill = SkillSimilarity {
                tag,
                key,
                level,
                topic_similarity,
                field_similarity,
                matched: false,
            };
            skill.matched = topic_similarity >= self.thresholds.skill_topic
                && skill.max_field_similarity() >= self.thresholds.skill_field;

            if skill.matched {
                assessment.matched.push(MatchedSkill {
                    tag: skill.tag.clone(),
                    level: skill.level,
                    topic_similarity: round_to(f64::from(topic_similarity), 5),
                    field_similarity: round_to(f64::from(skill.max_field_similarity()), 5),
                });
            }
            assessment.skills.push(skill);
        }

        assessment.matched.sort_by(|a, b| {
            b.topic_similarity
                .total_cmp(&a.topic_similarity)
                .then_with(|| b.level.cmp(&a.level))
                .then_with(|| a.tag.cmp(&b.tag))
        });

        assessment.skill_match_score = match assessment.matched.first() {
            Some(best) => best.topic_similarity,
            None => {
                let fallback = match (topic.topic.as_ref(), reviewer_vector) {
                    (Some(t), Some(r)) => similarity_or_zero(t, r),
                    _ => 0.0,
                };
                assessment.fallback_similarity = Some(fallback);
                if fallback >= self.thresholds.reviewer_fallback {
                    round_to(f64::from(fallback), 5)
                } else {
                    0.0
                }
            }
        };

        assessment
    }
}
