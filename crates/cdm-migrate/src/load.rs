//! Destination loading
//!
//! Upserts transformed records into the destination `customer` and
//! `customer_profile` tables, keyed on the ledger identifiers. A conflict
//! replaces every mapped column with the incoming value, so a re-run
//! converges on the latest staged data instead of duplicating or failing.
//!
//! Each table loads inside a single transaction: a failed batch rolls the
//! table back to its pre-run state and the run aborts.

use anyhow::{Context, Result};
use sqlx::{PgPool, QueryBuilder};
use tracing::{debug, info};

use crate::models::{CustomerProfileRecord, CustomerRecord};
use crate::value::{FieldValue, ValueKind};

/// Destination table names
pub const CUSTOMER_TABLE: &str = "customer";
pub const PROFILE_TABLE: &str = "customer_profile";

/// Hard cap on rows per destination insert.
/// Limited by PostgreSQL parameter count limits.
const MAX_LOAD_INSERT_ROWS: usize = 1000;

/// Writes transformed records into the destination store
///
/// Column plans come from [`crate::mapping::MappingDocument`]: the column
/// names and kinds each destination table physically carries. A record
/// missing a planned column binds a typed null, which is how a profile row
/// of one customer type clears the other type's columns on replace.
pub struct Loader {
    db: PgPool,
    batch_size: usize,
}

impl Loader {
    pub fn new(db: PgPool, batch_size: usize) -> Self {
        Self {
            db,
            batch_size: batch_size.min(MAX_LOAD_INSERT_ROWS),
        }
    }

    /// Upsert customer records, whole-row-replace on `customerId`
    pub async fn upsert_customers(
        &self,
        records: &[CustomerRecord],
        plan: &[(String, ValueKind)],
    ) -> Result<u64> {
        if records.is_empty() {
            debug!("No customer records to load");
            return Ok(0);
        }

        let columns: Vec<&str> = plan.iter().map(|(name, _)| name.as_str()).collect();
        let (column_list, conflict_clause) = upsert_clauses("customerId", &columns);
        let insert = format!("INSERT INTO {CUSTOMER_TABLE} ({column_list}) ");

        let mut tx = self
            .db
            .begin()
            .await
            .context("Failed to begin customer load transaction")?;
        let mut upserted = 0u64;

        for chunk in records.chunks(self.batch_size) {
            let mut query_builder = QueryBuilder::new(&insert);
            query_builder.push_values(chunk.iter(), |mut b, record| {
                b.push_bind(record.customer_id);
                for (name, kind) in plan {
                    bind_column(&mut b, record.columns.get(name), *kind);
                }
            });
            query_builder.push(&conflict_clause);

            let result = query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to upsert customer batch")?;
            upserted += result.rows_affected();
            debug!(rows = chunk.len(), "Upserted customer batch");
        }

        tx.commit()
            .await
            .context("Failed to commit customer load transaction")?;

        info!(rows = upserted, "Customer load complete");
        Ok(upserted)
    }

    /// Upsert profile records, whole-row-replace on `customerProfileId`
    ///
    /// Alongside the planned columns the loader writes the owning
    /// `customerId` and the consolidated `customerProfileData` document.
    pub async fn upsert_profiles(
        &self,
        records: &[CustomerProfileRecord],
        plan: &[(String, ValueKind)],
    ) -> Result<u64> {
        if records.is_empty() {
            debug!("No profile records to load");
            return Ok(0);
        }

        let mut columns: Vec<&str> = vec!["customerId"];
        columns.extend(plan.iter().map(|(name, _)| name.as_str()));
        columns.push("customerProfileData");
        let (column_list, conflict_clause) = upsert_clauses("customerProfileId", &columns);
        let insert = format!("INSERT INTO {PROFILE_TABLE} ({column_list}) ");

        let mut tx = self
            .db
            .begin()
            .await
            .context("Failed to begin profile load transaction")?;
        let mut upserted = 0u64;

        for chunk in records.chunks(self.batch_size) {
            let mut query_builder = QueryBuilder::new(&insert);
            query_builder.push_values(chunk.iter(), |mut b, record| {
                b.push_bind(record.customer_profile_id);
                b.push_bind(record.customer_id);
                for (name, kind) in plan {
                    bind_column(&mut b, record.columns.get(name), *kind);
                }
                b.push_bind(record.profile_data.clone());
            });
            query_builder.push(&conflict_clause);

            let result = query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to upsert profile batch")?;
            upserted += result.rows_affected();
            debug!(rows = chunk.len(), "Upserted profile batch");
        }

        tx.commit()
            .await
            .context("Failed to commit profile load transaction")?;

        info!(rows = upserted, "Profile load complete");
        Ok(upserted)
    }
}

fn bind_column(
    b: &mut sqlx::query_builder::Separated<'_, '_, sqlx::Postgres, &'static str>,
    value: Option<&FieldValue>,
    kind: ValueKind,
) {
    match value {
        Some(value) => value.push_bind(b),
        None => FieldValue::Null(kind).push_bind(b),
    }
}

/// Quoted column list and matching conflict clause for one upsert
///
/// Destination columns are camelCase, so every identifier is quoted.
fn upsert_clauses(key: &str, columns: &[&str]) -> (String, String) {
    let mut column_list = format!("\"{key}\"");
    for column in columns {
        column_list.push_str(", \"");
        column_list.push_str(column);
        column_list.push('"');
    }

    let mut assignments = String::new();
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            assignments.push_str(", ");
        }
        assignments.push_str(&format!("\"{column}\" = EXCLUDED.\"{column}\""));
    }

    (
        column_list,
        format!(" ON CONFLICT (\"{key}\") DO UPDATE SET {assignments}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_clauses_quote_every_identifier() {
        let (column_list, conflict_clause) =
            upsert_clauses("customerId", &["customerNumber", "fullName"]);

        assert_eq!(
            column_list,
            r#""customerId", "customerNumber", "fullName""#
        );
        assert_eq!(
            conflict_clause,
            r#" ON CONFLICT ("customerId") DO UPDATE SET "customerNumber" = EXCLUDED."customerNumber", "fullName" = EXCLUDED."fullName""#
        );
    }

    #[test]
    fn test_profile_clause_covers_identifier_and_document() {
        let (column_list, conflict_clause) = upsert_clauses(
            "customerProfileId",
            &["customerId", "bvn", "customerProfileData"],
        );

        assert!(column_list.starts_with(r#""customerProfileId""#));
        assert!(conflict_clause.contains(r#""customerId" = EXCLUDED."customerId""#));
        assert!(
            conflict_clause.contains(r#""customerProfileData" = EXCLUDED."customerProfileData""#)
        );
        assert!(!conflict_clause.contains(r#""customerProfileId" = EXCLUDED"#));
    }
}
