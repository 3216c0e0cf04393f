//! Data model for topics, reviewer candidates and suggestions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a reviewer.
pub type ReviewerId = i64;

/// Named text fields of a capstone topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TopicField {
    Title,
    TranslatedTitle,
    Category,
    Description,
    Objectives,
    Problem,
    Content,
    Context,
}

impl TopicField {
    /// Every field, in display order.
    pub const ALL: [TopicField; 8] = [
        TopicField::Title,
        TopicField::TranslatedTitle,
        TopicField::Category,
        TopicField::Description,
        TopicField::Objectives,
        TopicField::Problem,
        TopicField::Content,
        TopicField::Context,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TopicField::Title => "Title",
            TopicField::TranslatedTitle => "TranslatedTitle",
            TopicField::Category => "Category",
            TopicField::Description => "Description",
            TopicField::Objectives => "Objectives",
            TopicField::Problem => "Problem",
            TopicField::Content => "Content",
            TopicField::Context => "Context",
        }
    }
}

impl fmt::Display for TopicField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The text of a submitted topic. Any field may be empty, but a usable
/// context has at least one non-blank field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicContext {
    pub title: String,
    pub translated_title: String,
    pub category: String,
    pub description: String,
    pub objectives: String,
    pub problem: String,
    pub content: String,
    pub context: String,
}

impl TopicContext {
    /// Create a context with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set one field.
    pub fn with_field(mut self, field: TopicField, text: impl Into<String>) -> Self {
        *self.field_mut(field) = text.into();
        self
    }

    /// Raw text of one field.
    pub fn field(&self, field: TopicField) -> &str {
        match field {
            TopicField::Title => &self.title,
            TopicField::TranslatedTitle => &self.translated_title,
            TopicField::Category => &self.category,
            TopicField::Description => &self.description,
            TopicField::Objectives => &self.objectives,
            TopicField::Problem => &self.problem,
            TopicField::Content => &self.content,
            TopicField::Context => &self.context,
        }
    }

    fn field_mut(&mut self, field: TopicField) -> &mut String {
        match field {
            TopicField::Title => &mut self.title,
            TopicField::TranslatedTitle => &mut self.translated_title,
            TopicField::Category => &mut self.category,
            TopicField::Description => &mut self.description,
            TopicField::Objectives => &mut self.objectives,
            TopicField::Problem => &mut self.problem,
            TopicField::Content => &mut self.content,
            TopicField::Context => &mut self.context,
        }
    }

    /// Non-blank fields with their raw text.
    pub fn non_empty_fields(&self) -> impl Iterator<Item = (TopicField, &str)> {
        TopicField::ALL
            .into_iter()
            .map(|f| (f, self.field(f)))
            .filter(|(_, text)| !text.trim().is_empty())
    }

    /// True when every field is blank.
    pub fn is_empty(&self) -> bool {
        self.non_empty_fields().next().is_none()
    }

    /// All non-blank fields joined with newlines.
    pub fn combined_text(&self) -> String {
        self.non_empty_fields()
            .map(|(_, text)| text.trim())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A skill tag with a proficiency level from 1 (basic) to 4 (expert).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewerSkill {
    pub tag: String,
    pub level: u8,
}

impl ReviewerSkill {
    pub const MIN_LEVEL: u8 = 1;
    pub const MAX_LEVEL: u8 = 4;

    /// Create a skill; the level is clamped into `1..=4`.
    pub fn new(tag: impl Into<String>, level: u8) -> Self {
        Self {
            tag: tag.into(),
            level: level.clamp(Self::MIN_LEVEL, Self::MAX_LEVEL),
        }
    }
}

/// Historical review performance of a reviewer. Missing values count as 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSnapshot {
    pub quality_rating: Option<f64>,
    pub on_time_rate: Option<f64>,
    pub average_score_given: Option<f64>,
    pub total_assignments: Option<u32>,
    pub completed_assignments: Option<u32>,
}

/// A reviewer who may be suggested for a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerCandidate {
    pub id: ReviewerId,
    pub display_name: String,

    /// Unique (tag, level) pairs.
    pub skills: Vec<ReviewerSkill>,

    /// Assignments currently in progress.
    pub active_assignments: u32,

    /// Most recent performance snapshot, if any.
    pub performance: Option<PerformanceSnapshot>,
}

impl ReviewerCandidate {
    pub fn new(id: ReviewerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            skills: Vec::new(),
            active_assignments: 0,
            performance: None,
        }
    }

    /// Add a skill. Exact duplicates are ignored.
    pub fn with_skill(mut self, tag: impl Into<String>, level: u8) -> Self {
        let skill = ReviewerSkill::new(tag, level);
        if !self.skills.contains(&skill) {
            self.skills.push(skill);
        }
        self
    }

    pub fn with_active_assignments(mut self, count: u32) -> Self {
        self.active_assignments = count;
        self
    }

    pub fn with_performance(mut self, snapshot: PerformanceSnapshot) -> Self {
        self.performance = Some(snapshot);
        self
    }

    pub fn has_skills(&self) -> bool {
        self.skills.iter().any(|s| !s.tag.trim().is_empty())
    }

    /// "Name (ID n)" for messages and narratives.
    pub fn label(&self) -> String {
        format!("{} (ID {})", self.display_name, self.id)
    }
}

/// A reviewer skill accepted as a semantic match for the topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedSkill {
    pub tag: String,
    pub level: u8,

    /// Similarity between the skill and the whole topic.
    pub topic_similarity: f64,

    /// Best similarity between the skill and any single field.
    pub field_similarity: f64,
}

/// An n-gram from the topic that supports a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEvidence {
    /// The n-gram as written in the topic.
    pub token: String,

    /// The skill it supports; `None` for reviewer-level fallback evidence.
    pub skill: Option<String>,

    /// Similarity between the token and the skill (or reviewer vector).
    pub similarity: f64,

    /// Ranking score combining token, field and topic similarity.
    pub score: f64,
}

impl TokenEvidence {
    pub fn word_count(&self) -> usize {
        self.token.split_whitespace().count()
    }
}

/// Why a reviewer matches a topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchEvidence {
    pub matched_skills: Vec<MatchedSkill>,

    /// Highest skill similarity seen per field, matched or not.
    pub per_field_max_similarity: BTreeMap<TopicField, f64>,

    /// Accepted n-grams per field, best first.
    pub per_field_top_tokens: BTreeMap<TopicField, Vec<TokenEvidence>>,
}

/// Whether a reviewer may be assigned, and why not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub reasons: Vec<String>,
}

impl Eligibility {
    pub fn eligible() -> Self {
        Self {
            eligible: true,
            reasons: Vec::new(),
        }
    }

    pub fn ineligible(reason: impl Into<String>) -> Self {
        Self {
            eligible: false,
            reasons: vec![reason.into()],
        }
    }
}

/// One scored reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionResult {
    pub reviewer_id: ReviewerId,
    pub display_name: String,
    pub active_assignments: u32,
    pub skill_match_score: f64,
    pub workload_score: f64,
    pub performance_score: f64,
    pub overall_score: f64,

    /// Tags of the matched skills, best first.
    pub matched_skills: Vec<String>,
    pub evidence: MatchEvidence,
    pub eligibility: Eligibility,
}

impl SuggestionResult {
    /// "Name (ID n)" for messages and narratives.
    pub fn label(&self) -> String {
        format!("{} (ID {})", self.display_name, self.reviewer_id)
    }
}

/// Options for one suggestion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestOptions {
    /// Maximum number of ranked suggestions (at least 1).
    pub max_results: usize,

    /// Whether to compose a narrative for the shortlist.
    pub include_narrative: bool,
}

impl SuggestOptions {
    pub fn new(max_results: usize) -> Self {
        Self {
            max_results: max_results.max(1),
            include_narrative: false,
        }
    }

    pub fn with_narrative(mut self, include: bool) -> Self {
        self.include_narrative = include;
        self
    }
}

impl Default for SuggestOptions {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Where a narrative came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
    /// Written by the prompt provider and accepted by the format check.
    Provider,
    /// Built from the deterministic template.
    Fallback,
}

/// Everything a suggestion request returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionOutcome {
    /// Ranked suggestions, best first.
    pub suggestions: Vec<SuggestionResult>,

    pub narrative: Option<String>,
    pub narrative_source: Option<NarrativeSource>,

    /// Skip and warning messages for the caller.
    pub messages: Vec<String>,

    /// Highest skill similarity per field over the whole pool.
    pub topic_field_scores: BTreeMap<TopicField, f64>,
}
