//! Ordering and truncating scored reviewers.
//!
//! Availability is the primary key: an excellent but busy reviewer ranks
//! behind a good one with fewer active assignments. Score breaks ties.

use ordered_float::OrderedFloat;

use crate::model::SuggestionResult;

/// Orders suggestions by (active assignments asc, overall score desc).
#[derive(Debug, Clone, Copy, Default)]
pub struct SuggestionRanker;

impl SuggestionRanker {
    /// Sort and keep the first `max_results`. Reviewer id is the final
    /// tiebreak so the order is deterministic.
    pub fn rank(
        &self,
        mut results: Vec<SuggestionResult>,
        max_results: usize,
    ) -> Vec<SuggestionResult> {
        results.sort_by(|a, b| {
            a.active_assignments
                .cmp(&b.active_assignments)
                .then_with(|| OrderedFloat(b.overall_score).cmp(&OrderedFloat(a.overall_score)))
                .then_with(|| a.reviewer_id.cmp(&b.reviewer_id))
        });
        results.truncate(max_results);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Eligibility, MatchEvidence, ReviewerId};
    use pretty_assertions::assert_eq;

    fn result(id: ReviewerId, active: u32, score: f64) -> SuggestionResult {
        SuggestionResult {
            reviewer_id: id,
            display_name: format!("Reviewer {id}"),
            active_assignments: active,
            skill_match_score: score,
            workload_score: 0.0,
            performance_score: 0.0,
            overall_score: score,
            matched_skills: Vec::new(),
            evidence: MatchEvidence::default(),
            eligibility: Eligibility::eligible(),
        }
    }

    fn ids(results: &[SuggestionResult]) -> Vec<ReviewerId> {
        results.iter().map(|r| r.reviewer_id).collect()
    }

    #[test]
    fn test_availability_first_then_score() {
        let ranked = SuggestionRanker.rank(
            vec![result(1, 2, 0.7), result(2, 1, 0.5), result(3, 1, 0.9)],
            10,
        );
        assert_eq!(ids(&ranked), vec![3, 2, 1]);
    }

    #[test]
    fn test_truncates_to_max_results() {
        let ranked = SuggestionRanker.rank(
            vec![
                result(4, 0, 0.1),
                result(5, 0, 0.2),
                result(6, 3, 0.99),
                result(7, 0, 0.2),
            ],
            2,
        );
        assert_eq!(ids(&ranked), vec![5, 7]);
    }
}
