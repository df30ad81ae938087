//! Pearson's chi-square goodness-of-fit test against a uniform distribution.

use crate::models::UniformityTest;
use crate::store::{RankStore, StoreError};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use thiserror::Error;
use tracing::debug;

/// Conventional significance level.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Errors raised while testing a rank column.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("need at least 2 identifiers to test uniformity, found {0}")]
    TooFewCategories(usize),

    #[error("rank column has no observations")]
    NoObservations,

    #[error("chi-square distribution: {0}")]
    Distribution(String),
}

/// Pearson's statistic and p-value for `counts` under a uniform null.
///
/// Every category is expected to hold `total / counts.len()` observations.
/// `rank` and `alpha` are carried into the result unchanged.
pub fn chi_square_uniform(counts: &[u64], rank: usize, alpha: f64) -> Result<UniformityTest, AnalysisError> {
    let categories = counts.len();
    if categories < 2 {
        return Err(AnalysisError::TooFewCategories(categories));
    }

    let observations: u64 = counts.iter().sum();
    if observations == 0 {
        return Err(AnalysisError::NoObservations);
    }

    let expected = observations as f64 / categories as f64;
    let statistic: f64 = counts
        .iter()
        .map(|&observed| {
            let diff = observed as f64 - expected;
            diff * diff / expected
        })
        .sum();

    let degrees_of_freedom = categories - 1;
    let distribution = ChiSquared::new(degrees_of_freedom as f64)
        .map_err(|e| AnalysisError::Distribution(e.to_string()))?;
    let p_value = distribution.sf(statistic);

    Ok(UniformityTest {
        rank,
        categories,
        observations,
        statistic,
        degrees_of_freedom,
        p_value,
        alpha,
    })
}

/// Test the stored counters at `rank` for uniformity.
pub async fn test_uniformity(
    store: &RankStore,
    table: &str,
    rank: usize,
    alpha: f64,
) -> Result<UniformityTest, AnalysisError> {
    let counts = store.read_rank_column(table, rank).await?;
    let result = chi_square_uniform(&counts, rank, alpha)?;

    debug!(
        "Rank {}: chi2={:.3} df={} p={:.4}",
        rank, result.statistic, result.degrees_of_freedom, result.p_value
    );
    Ok(result)
}

/// Test every rank of `table`, in rank order.
pub async fn test_all_ranks(
    store: &RankStore,
    table: &str,
    alpha: f64,
) -> Result<Vec<UniformityTest>, AnalysisError> {
    let num_ranks = store
        .num_ranks(table)
        .await?
        .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

    let mut results = Vec::with_capacity(num_ranks);
    for rank in 0..num_ranks {
        results.push(test_uniformity(store, table, rank, alpha).await?);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_uniform_counts_do_not_reject() {
        let result = chi_square_uniform(&[25, 25, 25, 25], 0, DEFAULT_ALPHA).unwrap();

        assert_eq!(result.categories, 4);
        assert_eq!(result.observations, 100);
        assert_eq!(result.degrees_of_freedom, 3);
        assert!(result.statistic.abs() < 1e-12);
        assert!((result.p_value - 1.0).abs() < 1e-9);
        assert!(!result.rejects_uniformity());
    }

    #[test]
    fn test_skewed_counts_reject() {
        let result = chi_square_uniform(&[70, 10, 10, 10], 1, DEFAULT_ALPHA).unwrap();

        // (45^2 + 3 * 15^2) / 25
        assert!((result.statistic - 108.0).abs() < 1e-9);
        assert!(result.p_value < 0.05);
        assert!(result.rejects_uniformity());
        assert_eq!(result.rank, 1);
    }

    #[test]
    fn test_known_p_value() {
        let result = chi_square_uniform(&[6, 4], 0, DEFAULT_ALPHA).unwrap();
        assert!((result.statistic - 0.4).abs() < 1e-9);

        // chi2 = 5 with 1 degree of freedom
        let result = chi_square_uniform(&[15, 5], 0, DEFAULT_ALPHA).unwrap();
        assert!((result.statistic - 5.0).abs() < 1e-9);
        assert!((result.p_value - 0.025347).abs() < 1e-4);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(matches!(
            chi_square_uniform(&[10], 0, DEFAULT_ALPHA),
            Err(AnalysisError::TooFewCategories(1))
        ));
        assert!(matches!(
            chi_square_uniform(&[], 0, DEFAULT_ALPHA),
            Err(AnalysisError::TooFewCategories(0))
        ));
        assert!(matches!(
            chi_square_uniform(&[0, 0, 0], 0, DEFAULT_ALPHA),
            Err(AnalysisError::NoObservations)
        ));
    }

    #[tokio::test]
    async fn test_all_ranks_from_store() {
        let dir = TempDir::new().unwrap();
        let store = RankStore::open(&dir.path().join("ranks.db")).await.unwrap();
        store.ensure_schema("ranks", 2).await.unwrap();
        store.ensure_rows("ranks", &[1, 2]).await.unwrap();

        // 1 always first: rank 0 column is [10, 0], maximally skewed
        for _ in 0..10 {
            store.record_round("ranks", &[1, 2]).await.unwrap();
        }

        let results = test_all_ranks(&store, "ranks", DEFAULT_ALPHA).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.observations == 10));
        assert!(results.iter().all(|r| r.rejects_uniformity()));

        assert!(matches!(
            test_all_ranks(&store, "missing", DEFAULT_ALPHA).await,
            Err(AnalysisError::Store(StoreError::UnknownTable(_)))
        ));
    }
}
