//! Fusing skill match, workload and performance into one score.

use crate::config::{MatchThresholds, ScoringConfig};
use crate::model::{Eligibility, PerformanceSnapshot, ReviewerCandidate};

/// Round `value` to `decimals` decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Component scores for one reviewer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub skill_match: f64,
    pub workload: f64,
    pub performance: f64,
    pub overall: f64,
}

/// Computes reviewer scores and eligibility.
#[derive(Debug, Clone)]
pub struct Scorer {
    config: ScoringConfig,
    eligibility_floor: f64,
}

impl Scorer {
    pub fn new(config: ScoringConfig, thresholds: &MatchThresholds) -> Self {
        Self {
            config,
            eligibility_floor: f64::from(thresholds.eligibility),
        }
    }

    /// Whether a reviewer is at or over capacity and must not be scored.
    pub fn is_saturated(&self, active_assignments: u32) -> bool {
        active_assignments >= self.config.workload_capacity
    }

    /// `1 - min(1, active / capacity)`: 1.0 for an idle reviewer, 0.0 at capacity.
    pub fn workload_score(&self, active_assignments: u32) -> f64 {
        let capacity = f64::from(self.config.workload_capacity.max(1));
        let load = (f64::from(active_assignments) / capacity).min(1.0);
        (1.0 - load).max(0.0)
    }

    /// Weighted mix of quality, punctuality and average score given.
    /// Missing values count as 0; no snapshot scores 0.
    pub fn performance_score(&self, snapshot: Option<&PerformanceSnapshot>) -> f64 {
        let Some(snapshot) = snapshot else {
            return 0.0;
        };
        let quality = snapshot.quality_rating.unwrap_or(0.0);
        let on_time = snapshot.on_time_rate.unwrap_or(0.0);
        let average = snapshot.average_score_given.unwrap_or(0.0);
        round_to(
            quality * self.config.quality_weight
                + on_time * self.config.on_time_weight
                + average * self.config.average_score_weight,
            4,
        )
    }

    /// All component scores, overall rounded to 4 decimals.
    pub fn score(&self, reviewer: &ReviewerCandidate, skill_match: f64) -> ScoreBreakdown {
        let workload = self.workload_score(reviewer.active_assignments);
        let performance = self.performance_score(reviewer.performance.as_ref());
        let overall = round_to(
            skill_match * self.config.skill_weight
                + workload * self.config.workload_weight
                + performance * self.config.performance_weight,
            4,
        );
        ScoreBreakdown {
            skill_match,
            workload,
            performance,
            overall,
        }
    }

    /// A reviewer is eligible when they have at least one recorded skill and
    /// either a matched skill or a skill match score above the floor.
    pub fn eligibility(
        &self,
        reviewer: &ReviewerCandidate,
        has_matched_skills: bool,
        skill_match: f64,
    ) -> Eligibility {
        if !reviewer.has_skills() {
            return Eligibility::ineligible("reviewer has no recorded skills");
        }
        if has_matched_skills || skill_match >= self.eligibility_floor {
            return Eligibility::eligible();
        }
        Eligibility::ineligible(format!(
            "no skill is semantically related to this topic (skill match {:.0}%, needs {:.0}%)",
            skill_match * 100.0,
            self.eligibility_floor * 100.0
        ))
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default(), &MatchThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123_456, 4), 0.1235);
        assert_eq!(round_to(0.9, 5), 0.9);
    }

    #[test]
    fn test_workload_score() {
        let scorer = Scorer::default();
        assert_eq!(scorer.workload_score(0), 1.0);
        assert_eq!(scorer.workload_score(2), 0.6);
        assert_eq!(scorer.workload_score(5), 0.0);
        assert_eq!(scorer.workload_score(9), 0.0);
        assert!(scorer.is_saturated(5));
        assert!(!scorer.is_saturated(4));
    }

    #[test]
    fn test_performance_score_defaults_missing_values() {
        let scorer = Scorer::default();
        assert_eq!(scorer.performance_score(None), 0.0);

        let partial = PerformanceSnapshot {
            quality_rating: Some(0.8),
            on_time_rate: None,
            average_score_given: Some(0.5),
            ..PerformanceSnapshot::default()
        };
        assert_eq!(scorer.performance_score(Some(&partial)), 0.5);
    }

    #[test]
    fn test_overall_score() {
        let scorer = Scorer::default();
        let reviewer = ReviewerCandidate::new(1, "Hoa")
            .with_skill("rust", 3)
            .with_active_assignments(1)
            .with_performance(PerformanceSnapshot {
                quality_rating: Some(1.0),
                on_time_rate: Some(1.0),
                average_score_given: Some(1.0),
                ..PerformanceSnapshot::default()
            });

        let breakdown = scorer.score(&reviewer, 0.8);
        assert_eq!(breakdown.workload, 0.8);
        assert_eq!(breakdown.performance, 1.0);
        // 0.8*0.5 + 0.8*0.3 + 1.0*0.2
        assert_eq!(breakdown.overall, 0.84);
    }

    #[test]
    fn test_eligibility_rules() {
        let scorer = Scorer::default();
        let skilled = ReviewerCandidate::new(1, "Hoa").with_skill("rust", 3);
        let unskilled = ReviewerCandidate::new(2, "Binh");

        assert!(scorer.eligibility(&skilled, true, 0.0).eligible);
        assert!(scorer.eligibility(&skilled, false, 0.25).eligible);

        let low = scorer.eligibility(&skilled, false, 0.1);
        assert!(!low.eligible);
        assert_eq!(low.reasons.len(), 1);

        let none = scorer.eligibility(&unskilled, true, 0.9);
        assert!(!none.eligible);
        assert_eq!(none.reasons, vec!["reviewer has no recorded skills".to_string()]);
    }
}
