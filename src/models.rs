//! Data models for rank sampling and uniformity analysis.
//!
//! This module contains the core data structures shared by the store,
//! the sampler, the analyzer and the report generator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer key of a search-result subject, as returned by the endpoint.
pub type Identifier = i64;

/// One identifier together with its per-rank hit counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRow {
    /// The observed identifier.
    pub id: Identifier,
    /// `counts[r]` is how many rounds placed `id` at rank `r`.
    pub counts: Vec<u64>,
}

/// Outcome of a chi-square goodness-of-fit test for one rank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformityTest {
    /// The rank column that was tested.
    pub rank: usize,
    /// Number of categories (distinct identifiers).
    pub categories: usize,
    /// Total observations in the column.
    pub observations: u64,
    /// Pearson's chi-square statistic.
    pub statistic: f64,
    /// Degrees of freedom (categories - 1).
    pub degrees_of_freedom: usize,
    /// Upper-tail probability of the statistic.
    pub p_value: f64,
    /// Significance level the verdict was taken at.
    pub alpha: f64,
}

impl UniformityTest {
    /// True when uniformity is rejected at `alpha`.
    pub fn rejects_uniformity(&self) -> bool {
        self.p_value < self.alpha
    }

    /// Short verdict label.
    pub fn verdict(&self) -> Verdict {
        if self.rejects_uniformity() {
            Verdict::Biased
        } else {
            Verdict::Uniform
        }
    }
}

/// Verdict of a uniformity test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// No detectable deviation from uniform.
    Uniform,
    /// Uniformity rejected.
    Biased,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Uniform => write!(f, "Uniform"),
            Verdict::Biased => write!(f, "Biased"),
        }
    }
}

impl Verdict {
    /// Returns an emoji representation of the verdict.
    pub fn emoji(&self) -> &'static str {
        match self {
            Verdict::Uniform => "🟢",
            Verdict::Biased => "🔴",
        }
    }
}

/// Sample-size plan for reaching the chi-square rule of thumb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplePlan {
    /// Results per round (K).
    pub num_results: usize,
    /// Five expected observations per category.
    pub min_samples: u64,
    /// Twice the minimum, the number of rounds aimed for.
    pub target: u64,
    /// Observations already in the planning column.
    pub current: u64,
    /// Rounds still needed to reach `target`.
    pub additional_rounds: u64,
}

impl SamplePlan {
    /// Plan how many more rounds are needed given `num_results` per round
    /// and `current` observations already stored.
    pub fn new(num_results: usize, current: u64) -> Self {
        let min_samples = 5 * num_results as u64;
        let target = 2 * min_samples;

        Self {
            num_results,
            min_samples,
            target,
            current,
            additional_rounds: target.saturating_sub(current),
        }
    }
}

/// Metadata about the uniformity report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Endpoint that was sampled.
    pub endpoint: String,
    /// Logical table holding the counters.
    pub table: String,
    /// Results per round (K).
    pub num_results: usize,
    /// Distinct identifiers observed.
    pub identifiers: usize,
    /// Rounds recorded in the store.
    pub rounds_recorded: u64,
    /// Rounds collected during this run.
    pub rounds_this_run: u64,
    /// Date and time of the analysis.
    pub analysis_date: DateTime<Utc>,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete uniformity report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Metadata about the report.
    pub metadata: ReportMetadata,
    /// The plan computed before collection, if collection ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<SamplePlan>,
    /// One test per rank, in rank order.
    pub tests: Vec<UniformityTest>,
}

impl Report {
    /// Ranks whose uniformity was rejected.
    pub fn biased_ranks(&self) -> Vec<usize> {
        self.tests
            .iter()
            .filter(|t| t.rejects_uniformity())
            .map(|t| t.rank)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test(rank: usize, p_value: f64) -> UniformityTest {
        UniformityTest {
            rank,
            categories: 4,
            observations: 100,
            statistic: 1.0,
            degrees_of_freedom: 3,
            p_value,
            alpha: 0.05,
        }
    }

    #[test]
    fn test_sample_plan_from_scratch() {
        let plan = SamplePlan::new(109, 0);
        assert_eq!(plan.min_samples, 545);
        assert_eq!(plan.target, 1090);
        assert_eq!(plan.additional_rounds, 1090);
    }

    #[test]
    fn test_sample_plan_saturates() {
        let plan = SamplePlan::new(3, 40);
        assert_eq!(plan.target, 30);
        assert_eq!(plan.additional_rounds, 0);

        let plan = SamplePlan::new(3, 12);
        assert_eq!(plan.additional_rounds, 18);
    }

    #[test]
    fn test_verdict_threshold() {
        assert_eq!(make_test(0, 0.5).verdict(), Verdict::Uniform);
        assert_eq!(make_test(0, 0.01).verdict(), Verdict::Biased);
        // p exactly at alpha is not a rejection
        assert_eq!(make_test(0, 0.05).verdict(), Verdict::Uniform);
    }

    #[test]
    fn test_biased_ranks() {
        let report = Report {
            metadata: ReportMetadata {
                endpoint: "http://localhost".to_string(),
                table: "ranks".to_string(),
                num_results: 3,
                identifiers: 4,
                rounds_recorded: 100,
                rounds_this_run: 0,
                analysis_date: Utc::now(),
                duration_seconds: 0.0,
            },
            plan: None,
            tests: vec![make_test(0, 0.9), make_test(1, 0.001), make_test(2, 0.04)],
        };
        assert_eq!(report.biased_ranks(), vec![1, 2]);
    }
}
