//! Persistent per-identifier rank counters.
//!
//! Counters live in SQLite, one `(id, rank, hits)` row per identifier and
//! rank. The number of ranks per round (K) is registered in `rank_tables`
//! when a logical table is created and checked on every later run, so a
//! change in result-set size fails fast instead of silently shifting ranks.

use crate::models::{Identifier, RankRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Registry of logical tables and their rank count.
const REGISTRY_TABLE: &str = "rank_tables";

/// Errors raised by the rank store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("invalid table name '{0}': use letters, digits and underscores")]
    InvalidTableName(String),

    #[error("table '{table}' was created with {stored} ranks but this run observed {observed}")]
    SchemaMismatch {
        table: String,
        stored: usize,
        observed: usize,
    },

    #[error("table '{0}' has not been created yet")]
    UnknownTable(String),

    #[error("round has {got} identifiers but table '{table}' expects {expected}")]
    RoundSize {
        table: String,
        expected: usize,
        got: usize,
    },

    #[error("no counter row for identifier {id} at rank {rank} in '{table}'")]
    MissingRow {
        table: String,
        id: Identifier,
        rank: usize,
    },

    #[error("rank {rank} is out of range for '{table}' ({num_ranks} ranks)")]
    RankOutOfRange {
        table: String,
        rank: usize,
        num_ranks: usize,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Handle to the SQLite file holding rank counters.
///
/// Every operation goes through an explicit handle; there is a single
/// connection since there is only ever one writer.
#[derive(Debug, Clone)]
pub struct RankStore {
    pool: SqlitePool,
}

impl RankStore {
    /// Open (creating if missing) the database at `path`.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        debug!("Opening rank store at {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                name TEXT PRIMARY KEY NOT NULL COLLATE NOCASE,
                num_ranks INTEGER NOT NULL CHECK (num_ranks > 0)
            );",
            REGISTRY_TABLE
        ))
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Create `table` with `k` ranks if it does not exist yet.
    ///
    /// Fails with [`StoreError::SchemaMismatch`] when the table already
    /// exists with a different rank count.
    pub async fn ensure_schema(&self, table: &str, k: usize) -> StoreResult<()> {
        validate_table_name(table)?;

        if let Some(stored) = self.num_ranks(table).await? {
            if stored != k {
                return Err(StoreError::SchemaMismatch {
                    table: table.to_string(),
                    stored,
                    observed: k,
                });
            }
            debug!("Table '{}' already exists with {} ranks", table, k);
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER NOT NULL,
                rank INTEGER NOT NULL,
                hits INTEGER NOT NULL DEFAULT 0 CHECK (hits >= 0),
                PRIMARY KEY (id, rank)
            );",
            table
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "INSERT INTO {} (name, num_ranks) VALUES (?, ?);",
            REGISTRY_TABLE
        ))
        .bind(table)
        .bind(k as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Created table '{}' with {} ranks", table, k);
        Ok(())
    }

    /// The rank count registered for `table`, or `None` if it was never created.
    pub async fn num_ranks(&self, table: &str) -> StoreResult<Option<usize>> {
        validate_table_name(table)?;

        let stored: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT num_ranks FROM {} WHERE name = ? COLLATE NOCASE;",
            REGISTRY_TABLE
        ))
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stored.map(|k| k as usize))
    }

    /// Insert zeroed counters for every identifier not yet present.
    pub async fn ensure_rows(&self, table: &str, ids: &[Identifier]) -> StoreResult<()> {
        let k = self.require_ranks(table).await?;
        let sql = format!("INSERT OR IGNORE INTO {} (id, rank) VALUES (?, ?);", table);

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for &id in ids {
            for rank in 0..k {
                inserted += sqlx::query(&sql)
                    .bind(id)
                    .bind(rank as i64)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }
        }

        tx.commit().await?;

        if inserted > 0 {
            debug!("Inserted {} counter rows into '{}'", inserted, table);
        }
        Ok(())
    }

    /// Increment the counter at rank `r` of `ordered[r]` for every position.
    ///
    /// All increments commit together or not at all. An empty round records
    /// nothing.
    pub async fn record_round(&self, table: &str, ordered: &[Identifier]) -> StoreResult<()> {
        let k = self.require_ranks(table).await?;

        if ordered.is_empty() {
            return Ok(());
        }
        if ordered.len() != k {
            return Err(StoreError::RoundSize {
                table: table.to_string(),
                expected: k,
                got: ordered.len(),
            });
        }

        let sql = format!(
            "UPDATE {} SET hits = hits + 1 WHERE id = ? AND rank = ?;",
            table
        );

        // Dropping `tx` on an early return rolls the round back.
        let mut tx = self.pool.begin().await?;

        for (rank, &id) in ordered.iter().enumerate() {
            let updated = sqlx::query(&sql)
                .bind(id)
                .bind(rank as i64)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if updated != 1 {
                return Err(StoreError::MissingRow {
                    table: table.to_string(),
                    id,
                    rank,
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// All counter values for `rank`, ordered by identifier.
    pub async fn read_rank_column(&self, table: &str, rank: usize) -> StoreResult<Vec<u64>> {
        let num_ranks = self.require_ranks(table).await?;
        if rank >= num_ranks {
            return Err(StoreError::RankOutOfRange {
                table: table.to_string(),
                rank,
                num_ranks,
            });
        }

        let hits: Vec<i64> = sqlx::query_scalar(&format!(
            "SELECT hits FROM {} WHERE rank = ? ORDER BY id;",
            table
        ))
        .bind(rank as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(hits.into_iter().map(|h| h as u64).collect())
    }

    /// Every identifier with its counters, ordered by identifier.
    pub async fn rows(&self, table: &str) -> StoreResult<Vec<RankRow>> {
        let k = self.require_ranks(table).await?;

        let cells: Vec<(i64, i64, i64)> = sqlx::query_as(&format!(
            "SELECT id, rank, hits FROM {} ORDER BY id, rank;",
            table
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut rows: Vec<RankRow> = Vec::new();
        for (id, rank, hits) in cells {
            if rows.last().map(|row| row.id) != Some(id) {
                rows.push(RankRow {
                    id,
                    counts: vec![0; k],
                });
            }
            if let Some(row) = rows.last_mut() {
                if let Some(slot) = row.counts.get_mut(rank as usize) {
                    *slot = hits as u64;
                }
            }
        }

        Ok(rows)
    }

    /// Total rounds recorded, i.e. the sum of the rank 0 column.
    pub async fn rounds_recorded(&self, table: &str) -> StoreResult<u64> {
        Ok(self.read_rank_column(table, 0).await?.iter().sum())
    }

    async fn require_ranks(&self, table: &str) -> StoreResult<usize> {
        self.num_ranks(table)
            .await?
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
///
/// SQLite resolves table names case-insensitively, so the reserved names
/// are matched the same way.
pub fn validate_table_name(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    let lowered = name.to_ascii_lowercase();
    if valid && lowered != REGISTRY_TABLE && !lowered.starts_with("sqlite_") {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(name.to_string()))
    }
}
