//! Configuration for the reviewer matcher.
//!
//! All similarity thresholds and weights were tuned empirically. They live
//! here rather than in code so they can be adjusted (and the matching tests
//! re-run) without touching the pipeline.

use serde::{Deserialize, Serialize};

use capstone_embeddings::{CacheTtls, GatewayConfig};

use crate::error::{MatchError, Result};

/// Configuration for the reviewer matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Similarity thresholds.
    pub thresholds: MatchThresholds,

    /// Score weights.
    pub scoring: ScoringConfig,

    /// Token evidence limits.
    pub evidence: EvidenceConfig,

    /// Embedding cache configuration.
    pub cache: CacheConfig,

    /// Embedding gateway configuration.
    pub gateway: GatewayConfig,

    /// Narrative configuration.
    pub narrative: NarrativeConfig,

    /// Role filter used when loading candidates from a repository.
    pub candidate_role: String,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            thresholds: MatchThresholds::default(),
            scoring: ScoringConfig::default(),
            evidence: EvidenceConfig::default(),
            cache: CacheConfig::default(),
            gateway: GatewayConfig::default(),
            narrative: NarrativeConfig::default(),
            candidate_role: "reviewer".to_string(),
        }
    }
}

impl MatchingConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| MatchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the matcher cannot work with.
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        let unit = [
            ("thresholds.skill_topic", t.skill_topic),
            ("thresholds.skill_field", t.skill_field),
            ("thresholds.token_skill", t.token_skill),
            ("thresholds.reviewer_fallback", t.reviewer_fallback),
            ("thresholds.token_reviewer_fallback", t.token_reviewer_fallback),
            ("thresholds.eligibility", t.eligibility),
            ("thresholds.fallback_token_weight", t.fallback_token_weight),
        ];
        let s = &self.scoring;
        let weights = [
            ("scoring.skill_weight", s.skill_weight as f32),
            ("scoring.workload_weight", s.workload_weight as f32),
            ("scoring.performance_weight", s.performance_weight as f32),
            ("scoring.quality_weight", s.quality_weight as f32),
            ("scoring.on_time_weight", s.on_time_weight as f32),
            ("scoring.average_score_weight", s.average_score_weight as f32),
        ];
        for (name, value) in unit.into_iter().chain(weights) {
            if !(0.0..=1.0).contains(&value) {
                return Err(MatchError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if s.workload_capacity == 0 {
            return Err(MatchError::Config(
                "scoring.workload_capacity must be at least 1".to_string(),
            ));
        }
        if self.gateway.max_concurrent_requests == 0 {
            return Err(MatchError::Config(
                "gateway.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.evidence.max_tokens_per_field == 0 {
            return Err(MatchError::Config(
                "evidence.max_tokens_per_field must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Similarity thresholds used by skill and token matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchThresholds {
    /// Minimum skill-to-topic similarity for a matched skill.
    pub skill_topic: f32,

    /// Minimum best skill-to-field similarity for a matched skill, and for a
    /// skill to be considered when scanning a field's tokens.
    pub skill_field: f32,

    /// Minimum token-to-skill similarity for token evidence.
    pub token_skill: f32,

    /// Minimum topic-to-reviewer similarity when no skill matched.
    pub reviewer_fallback: f32,

    /// Minimum token-to-reviewer similarity for fallback token evidence.
    pub token_reviewer_fallback: f32,

    /// Minimum skill match score for eligibility without matched skills.
    pub eligibility: f32,

    /// Shortest single word accepted as fallback token evidence.
    pub fallback_token_min_len: usize,

    /// Score multiplier for fallback token evidence.
    pub fallback_token_weight: f32,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            skill_topic: 0.60,
            skill_field: 0.30,
            token_skill: 0.45,
            reviewer_fallback: 0.50,
            token_reviewer_fallback: 0.95,
            eligibility: 0.25,
            fallback_token_min_len: 6,
            fallback_token_weight: 0.8,
        }
    }
}

/// Weights of the final score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub skill_weight: f64,
    pub workload_weight: f64,
    pub performance_weight: f64,

    /// Active assignments at which a reviewer is full. Reviewers at or above
    /// this count are not scored at all.
    pub workload_capacity: u32,

    pub quality_weight: f64,
    pub on_time_weight: f64,
    pub average_score_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            skill_weight: 0.5,
            workload_weight: 0.3,
            performance_weight: 0.2,
            workload_capacity: 5,
            quality_weight: 0.5,
            on_time_weight: 0.3,
            average_score_weight: 0.2,
        }
    }
}

/// Limits for token evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// N-grams scanned per field.
    pub max_candidates_per_field: usize,

    /// Accepted tokens kept per field.
    pub max_tokens_per_field: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            max_candidates_per_field: 24,
            max_tokens_per_field: 8,
        }
    }
}

/// Embedding cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttls: CacheTtls,
    pub max_entries_per_namespace: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttls: CacheTtls::default(),
            max_entries_per_namespace: 50_000,
        }
    }
}

/// Narrative generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    /// Phrase the first paragraph must start with.
    pub opening_phrase: String,

    /// Phrase the translated paragraph starts with in the fallback.
    pub translated_opening_phrase: String,

    /// Candidates described in the prompt.
    pub max_candidates_in_prompt: usize,

    /// Matched skills listed per candidate in the prompt.
    pub max_skills_in_prompt: usize,

    /// Provider call timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// How long the provider is skipped after it reports quota exhaustion.
    pub quota_cooldown_secs: u64,

    /// Message reported while the provider's quota is exhausted.
    pub quota_notice: String,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            opening_phrase: "Recommended reviewers:".to_string(),
            translated_opening_phrase: "Người phản biện được đề xuất:".to_string(),
            max_candidates_in_prompt: 5,
            max_skills_in_prompt: 4,
            request_timeout_ms: 30_000,
            quota_cooldown_secs: 15 * 60,
            quota_notice: "The narrative service has reached its usage quota; a template \
                           summary is shown instead."
                .to_string(),
        }
    }
}
