//! Stable identifier assignment
//!
//! Every distinct customer code in staging gets exactly one pair of v4
//! UUIDs in the `customer_uuids` ledger. Pairs are generated on first
//! sight and never regenerated, so destination keys stay stable across
//! every subsequent run.

use anyhow::{Context, Result};
use sqlx::{PgPool, QueryBuilder};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::CustomerIdentifiers;

/// Number of identifier rows per batched insert.
/// Limited by PostgreSQL parameter count limits.
const IDENTIFIER_INSERT_BATCH_SIZE: usize = 1000;

/// Assigns and serves identifier pairs from the staging store
pub struct IdentifierAssigner {
    db: PgPool,
}

impl IdentifierAssigner {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Ensure every staged customer code has an identifier pair
    ///
    /// Returns the number of codes assigned fresh pairs. The whole batch
    /// commits in one transaction: on any failure the ledger is left
    /// untouched, never partially extended.
    pub async fn ensure_coverage(&self) -> Result<u64> {
        let unmapped = self.unmapped_codes().await?;
        if unmapped.is_empty() {
            debug!("All staged customer codes already have identifiers");
            return Ok(0);
        }

        info!(codes = unmapped.len(), "Assigning identifier pairs");

        let mut tx = self
            .db
            .begin()
            .await
            .context("Failed to begin identifier transaction")?;

        let mut assigned = 0u64;
        for chunk in unmapped.chunks(IDENTIFIER_INSERT_BATCH_SIZE) {
            let mut query_builder = QueryBuilder::new(
                r#"INSERT INTO customer_uuids (customer_code, "customerId", "customerProfileId") "#,
            );

            query_builder.push_values(chunk.iter(), |mut b, code| {
                b.push_bind(*code)
                    .push_bind(Uuid::new_v4())
                    .push_bind(Uuid::new_v4());
            });

            // A concurrent assigner may have won the race for some codes;
            // their pairs stand and ours are discarded
            query_builder.push(" ON CONFLICT (customer_code) DO NOTHING");

            let result = query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to insert identifier pairs")?;

            assigned += result.rows_affected();
        }

        tx.commit()
            .await
            .context("Failed to commit identifier transaction")?;

        info!(assigned = assigned, "Identifier pairs assigned");
        Ok(assigned)
    }

    /// Staged customer codes with no ledger row yet
    async fn unmapped_codes(&self) -> Result<Vec<i64>> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT s.customer_code
            FROM stg_customers s
            LEFT JOIN customer_uuids u ON u.customer_code = s.customer_code
            WHERE u.customer_code IS NULL
            ORDER BY s.customer_code
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("Failed to query unmapped customer codes")
    }

    /// The full ledger as a lookup map for the transform phase
    pub async fn fetch_mappings(&self) -> Result<HashMap<i64, CustomerIdentifiers>> {
        let rows = sqlx::query_as::<_, (i64, Uuid, Uuid)>(
            r#"SELECT customer_code, "customerId", "customerProfileId" FROM customer_uuids"#,
        )
        .fetch_all(&self.db)
        .await
        .context("Failed to fetch identifier mappings")?;

        Ok(rows
            .into_iter()
            .map(|(code, customer_id, customer_profile_id)| {
                (
                    code,
                    CustomerIdentifiers {
                        customer_id,
                        customer_profile_id,
                    },
                )
            })
            .collect())
    }
}
