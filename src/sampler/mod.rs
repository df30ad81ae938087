//! Sampling driver.
//!
//! Runs fetch-and-record rounds strictly one after another with a fixed
//! politeness delay, and plans how many rounds a meaningful test needs.

pub mod progress;

pub use progress::{BarProgress, LogProgress, NullProgress, Progress};

use crate::fetcher::{FetchError, RoundSource};
use crate::models::SamplePlan;
use crate::store::{RankStore, StoreError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a sampling run.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("exploratory request to {0} returned no identifiers; cannot tell how many results a round holds")]
    EmptyExploration(String),
}

/// What a call to [`Sampler::collect`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectSummary {
    /// Rounds written to the store.
    pub rounds_recorded: u64,
    /// Rounds whose response matched nothing.
    pub rounds_empty: u64,
}

/// Drives rounds against one logical table.
pub struct Sampler<'a> {
    store: &'a RankStore,
    table: String,
}

impl<'a> Sampler<'a> {
    pub fn new(store: &'a RankStore, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Learn K from one exploratory round. The round is not recorded.
    pub async fn discover_ranks<S: RoundSource>(source: &mut S) -> Result<usize, SampleError> {
        let ids = source.next_round().await?;
        if ids.is_empty() {
            return Err(SampleError::EmptyExploration(source.describe()));
        }

        info!("Exploratory round returned {} results", ids.len());
        Ok(ids.len())
    }

    /// One-shot plan for reaching twice the minimum sample size at
    /// `rank_to_check`.
    pub async fn plan(&self, num_results: usize, rank_to_check: usize) -> Result<SamplePlan, StoreError> {
        let current: u64 = self
            .store
            .read_rank_column(&self.table, rank_to_check)
            .await?
            .iter()
            .sum();

        let plan = SamplePlan::new(num_results, current);
        debug!("Sample plan: {:?}", plan);
        Ok(plan)
    }

    /// Like [`Sampler::plan`] but never writes. A table that does not exist
    /// yet plans from zero; one registered with a different K is an error.
    pub async fn preview_plan(&self, num_results: usize, rank_to_check: usize) -> Result<SamplePlan, StoreError> {
        match self.store.num_ranks(&self.table).await? {
            Some(stored) if stored != num_results => Err(StoreError::SchemaMismatch {
                table: self.table.clone(),
                stored,
                observed: num_results,
            }),
            Some(_) => self.plan(num_results, rank_to_check).await,
            None if rank_to_check >= num_results => Err(StoreError::RankOutOfRange {
                table: self.table.clone(),
                rank: rank_to_check,
                num_ranks: num_results,
            }),
            None => Ok(SamplePlan::new(num_results, 0)),
        }
    }

    /// Run `num_rounds` rounds, waiting `delay` before each one.
    ///
    /// The first fetch or store error aborts the run; rounds already
    /// committed stay in the store.
    pub async fn collect<S: RoundSource>(
        &self,
        source: &mut S,
        num_rounds: u64,
        delay: Duration,
        progress: &mut dyn Progress,
    ) -> Result<CollectSummary, SampleError> {
        let mut summary = CollectSummary::default();
        progress.begin(num_rounds);

        for index in 1..=num_rounds {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let ids = source.next_round().await?;

            if ids.is_empty() {
                warn!("Round {} matched no identifiers; skipping", index);
                summary.rounds_empty += 1;
            } else {
                self.store.ensure_rows(&self.table, &ids).await?;
                self.store.record_round(&self.table, &ids).await?;
                summary.rounds_recorded += 1;
            }

            progress.round_done(index, &ids);
        }

        progress.finish();
        Ok(summary)
    }
}
