//! Narrative explanations for a ranked shortlist.
//!
//! The composer can operate in two modes:
//! 1. Provider mode: a prompt provider writes the narrative, which must pass
//!    a format check (two paragraphs, fixed opening phrase)
//! 2. Template mode: a deterministic fallback built from the ranking
//!    (always available)
//!
//! The prompt only carries candidate metadata, never token evidence, so the
//! provider has to explain relevance in its own words.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use capstone_embeddings::Clock;
use tracing::{debug, info, warn};

use crate::config::NarrativeConfig;
use crate::model::{NarrativeSource, SuggestionResult};
use crate::prompt::{PromptError, PromptProvider};

const CLOSED: i64 = i64::MIN;

/// Number of candidates presented as primary reviewers.
const PRIMARY_COUNT: usize = 2;

/// Number of candidates presented as backups.
const BACKUP_COUNT: usize = 2;

/// Skills named in the fallback narrative.
const FALLBACK_SKILL_COUNT: usize = 3;

/// Keeps a provider out of rotation for a cooldown after it reports quota
/// exhaustion.
#[derive(Debug)]
pub struct CircuitBreaker {
    open_until_ms: AtomicI64,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            open_until_ms: AtomicI64::new(CLOSED),
            cooldown,
            clock,
        }
    }

    /// Whether calls should currently be skipped.
    pub fn is_open(&self) -> bool {
        let until = self.open_until_ms.load(Ordering::SeqCst);
        until != CLOSED && self.clock.now().timestamp_millis() < until
    }

    /// Open the breaker for one cooldown from now.
    pub fn trip(&self) {
        let cooldown = i64::try_from(self.cooldown.as_millis()).unwrap_or(i64::MAX);
        let until = self.clock.now().timestamp_millis().saturating_add(cooldown);
        self.open_until_ms.store(until, Ordering::SeqCst);
    }
}

/// A narrative and any warnings produced while composing it.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedNarrative {
    pub text: String,
    pub source: NarrativeSource,
    pub warnings: Vec<String>,
}

/// Writes the two-paragraph narrative (explanation, then translation).
pub struct ExplanationComposer {
    provider: Option<Arc<dyn PromptProvider>>,
    config: NarrativeConfig,
    breaker: CircuitBreaker,
}

impl ExplanationComposer {
    pub fn new(
        provider: Option<Arc<dyn PromptProvider>>,
        config: NarrativeConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let breaker = CircuitBreaker::new(Duration::from_secs(config.quota_cooldown_secs), clock);
        Self {
            provider,
            config,
            breaker,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Compose a narrative for `ranked`, falling back to the template on any
    /// provider error, timeout, quota exhaustion or format violation.
    pub async fn compose(&self, ranked: &[SuggestionResult]) -> ComposedNarrative {
        let Some(provider) = &self.provider else {
            return self.fallback_with(Vec::new(), ranked);
        };

        if self.breaker.is_open() {
            debug!("Narrative provider skipped: quota breaker open");
            return self.fallback_with(vec![self.config.quota_notice.clone()], ranked);
        }

        let prompt = self.build_prompt(ranked);
        let after_ms = self.config.request_timeout_ms;
        let response = tokio::time::timeout(
            Duration::from_millis(after_ms),
            provider.complete(&prompt),
        )
        .await
        .unwrap_or(Err(PromptError::Timeout { after_ms }));

        match response {
            Ok(text) => match self.validate(&text) {
                Some(narrative) => {
                    info!("Narrative written by {}", provider.name());
                    ComposedNarrative {
                        text: narrative,
                        source: NarrativeSource::Provider,
                        warnings: Vec::new(),
                    }
                }
                None => {
                    warn!("Narrative from {} failed the format check", provider.name());
                    self.fallback_with(
                        vec![
                            "The generated narrative was malformed; a template summary is shown \
                             instead."
                                .to_string(),
                        ],
                        ranked,
                    )
                }
            },
            Err(e) if e.is_quota_exceeded() => {
                warn!(
                    "Narrative provider {} reported quota exhaustion; pausing it for {}s: {e}",
                    provider.name(),
                    self.config.quota_cooldown_secs
                );
                self.breaker.trip();
                self.fallback_with(vec![self.config.quota_notice.clone()], ranked)
            }
            Err(e) => {
                warn!("Narrative provider {} failed: {e}", provider.name());
                self.fallback_with(
                    vec![
                        "The narrative service is unavailable; a template summary is shown \
                         instead."
                            .to_string(),
                    ],
                    ranked,
                )
            }
        }
    }

    fn fallback_with(
        &self,
        warnings: Vec<String>,
        ranked: &[SuggestionResult],
    ) -> ComposedNarrative {
        ComposedNarrative {
            text: self.fallback(ranked),
            source: NarrativeSource::Fallback,
            warnings,
        }
    }

    /// Prompt describing the shortlist.
    pub fn build_prompt(&self, ranked: &[SuggestionResult]) -> String {
        let mut prompt = String::from(
            "You are helping a capstone coordinator choose reviewers for a submitted topic.\n\
             Candidates, already ranked (fewer active assignments first, then overall match):\n",
        );

        for result in ranked.iter().take(self.config.max_candidates_in_prompt) {
            let skills = result
                .matched_skills
                .iter()
                .take(self.config.max_skills_in_prompt)
                .map(String::as_str)
                .collect::<Vec<_>>();
            let skills = if skills.is_empty() {
                "none".to_string()
            } else {
                skills.join(", ")
            };
            prompt.push_str(&format!(
                "- ID {} | {} | active assignments: {} | overall match: {:.0}% | \
                 skill match: {:.0}% | matched skills: {skills}\n",
                result.reviewer_id,
                result.display_name,
                result.active_assignments,
                result.overall_score * 100.0,
                result.skill_match_score * 100.0,
            ));
        }

        prompt.push_str(&format!(
            "\nWrite exactly two paragraphs separated by one blank line.\n\
             Paragraph 1 is in English and must begin with \"{opening}\". In your own words, \
             explain why the first two candidates fit best and which candidates are backups. \
             Refer to candidates by name and ID.\n\
             Paragraph 2 is a faithful Vietnamese translation of paragraph 1.\n\
             Do not add headings, lists or any other text.",
            opening = self.config.opening_phrase
        ));
        prompt
    }

    /// Accept a response only if it is exactly two paragraphs and the first
    /// starts with the opening phrase. Returns the cleaned narrative.
    pub fn validate(&self, response: &str) -> Option<String> {
        let paragraphs = paragraphs(response);
        let [first, second] = paragraphs.as_slice() else {
            return None;
        };
        if !first.starts_with(&self.config.opening_phrase) {
            return None;
        }
        Some(format!("{first}\n\n{second}"))
    }

    /// Deterministic narrative: the top two candidates as primaries, the
    /// next two as backups, and their most frequent matched skills.
    pub fn fallback(&self, ranked: &[SuggestionResult]) -> String {
        let opening = &self.config.opening_phrase;
        let translated = &self.config.translated_opening_phrase;

        if ranked.is_empty() {
            return format!(
                "{opening} no suitable reviewer could be suggested for this topic from the \
                 current candidate pool.\n\n\
                 {translated} không có người phản biện phù hợp cho đề tài này trong danh sách \
                 hiện tại."
            );
        }

        let primaries: Vec<&SuggestionResult> = ranked.iter().take(PRIMARY_COUNT).collect();
        let backups: Vec<&SuggestionResult> =
            ranked.iter().skip(PRIMARY_COUNT).take(BACKUP_COUNT).collect();
        let shortlist: Vec<&SuggestionResult> =
            primaries.iter().chain(backups.iter()).copied().collect();
        let skills = frequent_skills(&shortlist, FALLBACK_SKILL_COUNT);

        let primary_names = join_labels(&primaries, "and");
        let backup_names = join_labels(&backups, "and");

        let mut english = if primaries.len() > 1 {
            format!("{opening} {primary_names} are the primary choices for this topic")
        } else {
            format!("{opening} {primary_names} is the primary choice for this topic")
        };
        if !skills.is_empty() {
            english.push_str(&format!(", bringing expertise in {}", skills.join(", ")));
        }
        english.push('.');
        if backups.is_empty() {
            english.push_str(" No backup reviewer is currently available.");
        } else {
            english.push_str(&format!(" {backup_names} can serve as backup reviewers."));
        }
        english.push_str(
            " Reviewers with fewer active assignments are listed first to keep the workload \
             balanced.",
        );

        let mut vietnamese = format!(
            "{translated} {} là lựa chọn chính cho đề tài này",
            join_labels(&primaries, "và")
        );
        if !skills.is_empty() {
            vietnamese.push_str(&format!(", với chuyên môn về {}", skills.join(", ")));
        }
        vietnamese.push('.');
        if backups.is_empty() {
            vietnamese.push_str(" Hiện chưa có người phản biện dự phòng.");
        } else {
            vietnamese.push_str(&format!(
                " {} có thể làm người phản biện dự phòng.",
                join_labels(&backups, "và")
            ));
        }
        vietnamese.push_str(
            " Người có ít đề tài đang phản biện hơn được ưu tiên để cân bằng khối lượng \
             công việc.",
        );

        format!("{english}\n\n{vietnamese}")
    }
}

/// Split text into paragraphs on blank lines, joining wrapped lines.
fn paragraphs(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                result.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        result.push(current.join(" "));
    }
    result
}

/// Collapse every whitespace run, line breaks included, to one space.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// "A (ID 1) and B (ID 2)".
fn join_labels(results: &[&SuggestionResult], conjunction: &str) -> String {
    let labels: Vec<String> = results.iter().map(|r| single_line(&r.label())).collect();
    match labels.as_slice() {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} {conjunction} {last}", init.join(", ")),
    }
}

/// Matched skills ordered by how many candidates share them, then by first
/// appearance. Case-insensitive.
fn frequent_skills(results: &[&SuggestionResult], limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize, String)> = HashMap::new();
    let mut order = 0usize;
    for result in results {
        for skill in &result.matched_skills {
            let skill = single_line(skill);
            if skill.is_empty() {
                continue;
            }
            let entry = counts
                .entry(skill.to_lowercase())
                .or_insert_with(|| (0, order, skill));
            entry.0 += 1;
            order += 1;
        }
    }

    let mut ranked: Vec<(usize, usize, String)> = counts.into_values().collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    ranked.into_iter().take(limit).map(|(_, _, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Eligibility, MatchEvidence, ReviewerId};
    use async_trait::async_trait;
    use capstone_embeddings::ManualClock;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    fn result(id: ReviewerId, name: &str, skills: &[&str]) -> SuggestionResult {
        SuggestionResult {
            reviewer_id: id,
            display_name: name.to_string(),
            active_assignments: 1,
            skill_match_score: 0.9,
            workload_score: 0.8,
            performance_score: 0.5,
            overall_score: 0.79,
            matched_skills: skills.iter().map(|s| (*s).to_string()).collect(),
            evidence: MatchEvidence::default(),
            eligibility: Eligibility::eligible(),
        }
    }

    fn shortlist() -> Vec<SuggestionResult> {
        vec![
            result(3, "Tran An", &["Blockchain", "Smart Contracts"]),
            result(2, "Le Binh", &["blockchain", "Logistics"]),
            result(7, "Pham Chi", &["Logistics", "Blockchain"]),
            result(9, "Vo Dung", &["Databases"]),
            result(11, "Ngo Em", &["Rust"]),
        ]
    }

    struct ScriptedProvider {
        reply: std::result::Result<String, fn() -> PromptError>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(err: fn() -> PromptError) -> Self {
            Self {
                reply: Err(err),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PromptProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str) -> std::result::Result<String, PromptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn make_composer(
        provider: Option<Arc<dyn PromptProvider>>,
    ) -> (Arc<ManualClock>, ExplanationComposer) {
        let clock = Arc::new(ManualClock::default());
        let composer =
            ExplanationComposer::new(provider, NarrativeConfig::default(), clock.clone());
        (clock, composer)
    }

    #[test]
    fn test_fallback_has_two_paragraphs_naming_primaries() {
        let (_, composer) = make_composer(None);
        let text = composer.fallback(&shortlist());

        let parts: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with("Recommended reviewers:"));
        assert!(parts[0].contains("(ID 3)"));
        assert!(parts[0].contains("(ID 2)"));
        assert!(parts[0].contains("Pham Chi (ID 7) and Vo Dung (ID 9) can serve as backup"));
        assert!(!parts[0].contains("ID 11"));
        assert!(parts[0].contains("expertise in Blockchain, Logistics, Smart Contracts"));
        assert!(parts[1].starts_with("Người phản biện được đề xuất:"));
    }

    #[test]
    fn test_fallback_single_and_empty() {
        let (_, composer) = make_composer(None);

        let single = composer.fallback(&shortlist()[..1]);
        assert_eq!(single.split("\n\n").count(), 2);
        assert!(single.contains("Tran An (ID 3) is the primary choice"));
        assert!(single.contains("No backup reviewer"));

        let empty = composer.fallback(&[]);
        assert_eq!(empty.split("\n\n").count(), 2);
    }

    #[test]
    fn test_fallback_flattens_line_breaks_in_names_and_skills() {
        let (_, composer) = make_composer(None);
        let ranked = vec![
            result(1, "Tran\n\nAn", &["Blockchain\n\nLedger"]),
            result(2, "Le Binh", &["blockchain  ledger", " \n "]),
            result(3, "Pham\r\n\r\nChi", &[]),
        ];

        let text = composer.fallback(&ranked);
        let parts: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(text.lines().count(), 3);
        assert!(parts[0].contains("Tran An (ID 1) and Le Binh (ID 2) are the primary choices"));
        assert!(parts[0].contains("expertise in Blockchain Ledger."));
        assert!(parts[0].contains("Pham Chi (ID 3) can serve as backup"));
        assert!(parts[1].contains("Tran An (ID 1) và Le Binh (ID 2)"));
    }

    #[test]
    fn test_prompt_carries_metadata_only() {
        let (_, composer) = make_composer(None);
        let mut ranked = shortlist();
        ranked[0].matched_skills = vec!["a", "b", "c", "d", "e"]
            .into_iter()
            .map(String::from)
            .collect();

        let prompt = composer.build_prompt(&ranked);
        assert!(prompt.contains(
            "- ID 3 | Tran An | active assignments: 1 | overall match: 79% | \
             skill match: 90% | matched skills: a, b, c, d\n"
        ));
        assert!(!prompt.contains("a, b, c, d, e"));
        assert!(prompt.contains("ID 11"));
        assert!(prompt.contains("\"Recommended reviewers:\""));
    }

    #[test]
    fn test_validate() {
        let (_, composer) = make_composer(None);
        assert_eq!(
            composer.validate("Recommended reviewers: A.\r\n\r\n  Người phản biện: A.\n"),
            Some("Recommended reviewers: A.\n\nNgười phản biện: A.".to_string())
        );
        assert!(composer.validate("Recommended reviewers: A.").is_none());
        assert!(composer.validate("Reviewers: A.\n\nB.").is_none());
        assert!(composer.validate("Recommended reviewers: A.\n\nB.\n\nC.").is_none());
    }

    #[tokio::test]
    async fn test_provider_narrative_is_used_when_valid() {
        let provider = Arc::new(ScriptedProvider::replying(
            "Recommended reviewers: An and Binh fit.\n\nNgười phản biện: An và Bình.",
        ));
        let (_, composer) = make_composer(Some(provider as Arc<dyn PromptProvider>));

        let narrative = composer.compose(&shortlist()).await;
        assert_eq!(narrative.source, NarrativeSource::Provider);
        assert!(narrative.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_response_falls_back() {
        let provider = Arc::new(ScriptedProvider::replying("Sure! Here are some reviewers."));
        let (_, composer) = make_composer(Some(provider as Arc<dyn PromptProvider>));

        let narrative = composer.compose(&shortlist()).await;
        assert_eq!(narrative.source, NarrativeSource::Fallback);
        assert_eq!(narrative.text, composer.fallback(&shortlist()));
        assert_eq!(narrative.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_quota_opens_breaker_until_cooldown() {
        let provider = Arc::new(ScriptedProvider::failing(|| {
            PromptError::QuotaExceeded("insufficient_quota".to_string())
        }));
        let (clock, composer) = make_composer(Some(provider.clone() as Arc<dyn PromptProvider>));

        let first = composer.compose(&shortlist()).await;
        assert_eq!(first.source, NarrativeSource::Fallback);
        assert_eq!(first.warnings, vec![NarrativeConfig::default().quota_notice]);
        assert!(composer.breaker().is_open());

        let second = composer.compose(&shortlist()).await;
        assert_eq!(second.source, NarrativeSource::Fallback);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(15 * 60));
        assert!(!composer.breaker().is_open());
        composer.compose(&shortlist()).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_provider_error_falls_back_without_tripping() {
        let provider = Arc::new(ScriptedProvider::failing(|| {
            PromptError::ApiRequest("502".to_string())
        }));
        let (_, composer) = make_composer(Some(provider as Arc<dyn PromptProvider>));

        let narrative = composer.compose(&shortlist()).await;
        assert_eq!(narrative.source, NarrativeSource::Fallback);
        assert!(!composer.breaker().is_open());
    }
}
