//! Customer migration data models

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::value::FieldValue;

/// A raw customer row as staged from the source table
///
/// Column names and nullability follow `stg_customers`. All source values
/// except the code and the audit timestamps arrive as text; typing happens
/// in the transformer via the mapping document.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct StagedCustomer {
    pub customer_code: i64,
    pub customer_name: String,
    pub customer_type: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address_line: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub bvn: Option<String>,
    pub registration_number: Option<String>,
    pub tax_id: Option<String>,
    pub branch_code: Option<String>,
    pub account_officer: Option<String>,
    pub status: Option<String>,
    pub is_pep: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StagedCustomer {
    /// Source fields in staging column order, as typed values
    ///
    /// This is the bridge into the mapping-driven transform: renames index
    /// into these pairs by source field name.
    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        use crate::value::ValueKind;

        vec![
            ("customer_code", FieldValue::Integer(self.customer_code)),
            ("customer_name", FieldValue::Text(self.customer_name.clone())),
            ("customer_type", FieldValue::Text(self.customer_type.clone())),
            ("email", FieldValue::from_text(self.email.as_deref())),
            ("phone_number", FieldValue::from_text(self.phone_number.as_deref())),
            ("address_line", FieldValue::from_text(self.address_line.as_deref())),
            ("city", FieldValue::from_text(self.city.as_deref())),
            ("state", FieldValue::from_text(self.state.as_deref())),
            ("country", FieldValue::from_text(self.country.as_deref())),
            ("date_of_birth", FieldValue::from_text(self.date_of_birth.as_deref())),
            ("gender", FieldValue::from_text(self.gender.as_deref())),
            ("bvn", FieldValue::from_text(self.bvn.as_deref())),
            (
                "registration_number",
                FieldValue::from_text(self.registration_number.as_deref()),
            ),
            ("tax_id", FieldValue::from_text(self.tax_id.as_deref())),
            ("branch_code", FieldValue::from_text(self.branch_code.as_deref())),
            (
                "account_officer",
                FieldValue::from_text(self.account_officer.as_deref()),
            ),
            ("status", FieldValue::from_text(self.status.as_deref())),
            ("is_pep", FieldValue::from_text(self.is_pep.as_deref())),
            ("created_at", FieldValue::Timestamp(self.created_at)),
            (
                "updated_at",
                match self.updated_at {
                    Some(ts) => FieldValue::Timestamp(ts),
                    None => FieldValue::Null(ValueKind::Timestamp),
                },
            ),
        ]
    }
}

/// Stable identifier pair assigned to one customer code
#[derive(Debug, Clone, Copy, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerIdentifiers {
    pub customer_id: Uuid,
    pub customer_profile_id: Uuid,
}

/// A transformed row for the destination `customer` table
///
/// `columns` holds the flat destination columns in mapping order, keyed by
/// destination column name. The identifier is structural and never part of
/// the mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRecord {
    pub customer_id: Uuid,
    pub columns: IndexMap<String, FieldValue>,
}

/// A transformed row for the destination `customer_profile` table
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerProfileRecord {
    pub customer_profile_id: Uuid,
    pub customer_id: Uuid,
    pub columns: IndexMap<String, FieldValue>,
    /// Consolidated KYC document, keys in configured order
    pub profile_data: serde_json::Value,
}

/// Extraction mode for a staging run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Truncate staging and re-extract the whole source table
    Full,
    /// Extract rows newer than the recorded watermark
    Incremental,
}

impl std::fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionMode::Full => write!(f, "full"),
            ExtractionMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Result of one extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractStats {
    pub mode: ExtractionMode,
    /// Rows written into staging
    pub extracted: usize,
    /// High-watermark after the run, when one exists
    pub watermark: Option<DateTime<Utc>>,
}

impl ExtractStats {
    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        match self.watermark {
            Some(watermark) => format!(
                "{} extraction staged {} rows (watermark {})",
                self.mode, self.extracted, watermark
            ),
            None => format!("{} extraction staged {} rows", self.mode, self.extracted),
        }
    }
}

/// Result of one transform+load run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadSummary {
    /// Rows read from staging
    pub staged: usize,
    /// Customer codes assigned fresh identifier pairs
    pub new_identifiers: u64,
    /// Rows transformed successfully
    pub transformed: usize,
    /// Rows skipped by the row-error policy
    pub skipped: usize,
    /// Rows upserted into `customer`
    pub customers_upserted: u64,
    /// Rows upserted into `customer_profile`
    pub profiles_upserted: u64,
}

impl LoadSummary {
    /// True when no staged row was skipped
    pub fn is_complete(&self) -> bool {
        self.skipped == 0
    }

    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        format!(
            "staged {} rows, {} new identifiers, transformed {} (skipped {}), upserted {} customers and {} profiles",
            self.staged,
            self.new_identifiers,
            self.transformed,
            self.skipped,
            self.customers_upserted,
            self.profiles_upserted
        )
    }
}
