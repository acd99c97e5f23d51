//! Mapping document
//!
//! The migration mapping workbook as static configuration: per destination
//! table, which source fields rename to which destination fields, which
//! destination fields get literal defaults, which convert to a non-text
//! type, which land as flat columns, and which are consolidated into the
//! profile document.
//!
//! The built-in document ships at `mapping/customer_migration.json` and can
//! be replaced wholesale via `--mapping` / `CDM_MAPPING_PATH`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use cdm_common::{MigrationError, Result};

use crate::value::ValueKind;

/// Customer types recognized by the profile mapping split
pub const CUSTOMER_TYPE_INDIVIDUAL: &str = "Individual";
pub const CUSTOMER_TYPE_CORPORATE: &str = "SME";

const BUILTIN_DOCUMENT: &str = include_str!("../mapping/customer_migration.json");

/// Mapping rules for one destination table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableMapping {
    /// Ordered source field -> destination field renames
    pub renames: IndexMap<String, String>,

    /// Destination field -> literal default, applied when the mapped value
    /// is null or the field has no source counterpart
    #[serde(default)]
    pub defaults: IndexMap<String, serde_json::Value>,

    /// Destination field -> target kind; unlisted fields stay text
    #[serde(default)]
    pub conversions: IndexMap<String, ValueKind>,

    /// Ordered flat destination columns written by the loader
    pub columns: Vec<String>,

    /// Ordered keys of the consolidated profile document (empty for the
    /// customer table)
    #[serde(default)]
    pub document_fields: Vec<String>,
}

impl TableMapping {
    /// Kind a destination field carries after conversion
    pub fn kind_of(&self, field: &str) -> ValueKind {
        self.conversions
            .get(field)
            .copied()
            .unwrap_or(ValueKind::Text)
    }

    fn validate(&self, table: &str) -> Result<()> {
        if self.renames.is_empty() {
            return Err(MigrationError::Mapping(format!(
                "{table}: renames must not be empty"
            )));
        }
        if self.columns.is_empty() {
            return Err(MigrationError::Mapping(format!(
                "{table}: columns must not be empty"
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for destination in self.renames.values() {
            if !seen.insert(destination.as_str()) {
                return Err(MigrationError::Mapping(format!(
                    "{table}: two source fields rename to '{destination}'"
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.as_str()) {
                return Err(MigrationError::Mapping(format!(
                    "{table}: duplicate column '{column}'"
                )));
            }
        }

        // Identifier columns come from the customer_uuids ledger, never
        // from the mapping
        for key in ["customerId", "customerProfileId"] {
            if self.columns.iter().any(|c| c == key) {
                return Err(MigrationError::Mapping(format!(
                    "{table}: '{key}' is assigned by the identifier ledger and must not be listed"
                )));
            }
        }

        let is_destination_field = |field: &str| {
            self.renames.values().any(|d| d == field)
                || self.columns.iter().any(|c| c == field)
                || self.document_fields.iter().any(|d| d == field)
        };
        for field in self.defaults.keys() {
            if !is_destination_field(field) {
                return Err(MigrationError::Mapping(format!(
                    "{table}: default for unknown destination field '{field}'"
                )));
            }
        }
        for field in self.conversions.keys() {
            if !is_destination_field(field) {
                return Err(MigrationError::Mapping(format!(
                    "{table}: conversion for unknown destination field '{field}'"
                )));
            }
        }

        Ok(())
    }
}

/// The full mapping document covering both destination tables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingDocument {
    /// Customer table mapping, shared across customer types
    pub customer: TableMapping,
    /// Profile mapping for `Individual` customers
    pub profile_individual: TableMapping,
    /// Profile mapping for `SME` customers
    pub profile_corporate: TableMapping,
}

impl MappingDocument {
    /// The document compiled into the binary
    pub fn builtin() -> Result<Self> {
        let document: Self = serde_json::from_str(BUILTIN_DOCUMENT)?;
        document.validate()?;
        Ok(document)
    }

    /// Load a replacement document from disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let document: Self = serde_json::from_str(&raw)?;
        document.validate()?;
        Ok(document)
    }

    /// Profile mapping for a staged customer type, if recognized
    pub fn profile_for(&self, customer_type: &str) -> Option<&TableMapping> {
        match customer_type {
            CUSTOMER_TYPE_INDIVIDUAL => Some(&self.profile_individual),
            CUSTOMER_TYPE_CORPORATE => Some(&self.profile_corporate),
            _ => None,
        }
    }

    /// Column plan for the destination customer table
    pub fn customer_columns(&self) -> Vec<(String, ValueKind)> {
        self.customer
            .columns
            .iter()
            .map(|column| (column.clone(), self.customer.kind_of(column)))
            .collect()
    }

    /// Column plan for the destination profile table
    ///
    /// The physical table carries the union of both customer-type mappings;
    /// a row of one type binds null for the other type's columns.
    pub fn profile_columns(&self) -> Vec<(String, ValueKind)> {
        let mut columns: Vec<(String, ValueKind)> = Vec::new();
        for mapping in [&self.profile_individual, &self.profile_corporate] {
            for column in &mapping.columns {
                if !columns.iter().any(|(name, _)| name == column) {
                    columns.push((column.clone(), mapping.kind_of(column)));
                }
            }
        }
        columns
    }

    /// Check document-wide invariants
    pub fn validate(&self) -> Result<()> {
        self.customer.validate("customer")?;
        self.profile_individual.validate("profile_individual")?;
        self.profile_corporate.validate("profile_corporate")?;

        if !self.customer.document_fields.is_empty() {
            return Err(MigrationError::Mapping(
                "customer: document_fields must be empty".to_string(),
            ));
        }
        for (table, mapping) in [
            ("profile_individual", &self.profile_individual),
            ("profile_corporate", &self.profile_corporate),
        ] {
            if mapping.document_fields.is_empty() {
                return Err(MigrationError::Mapping(format!(
                    "{table}: document_fields must not be empty"
                )));
            }
        }

        // Both profile mappings write the same physical table
        for column in &self.profile_corporate.columns {
            if self.profile_individual.columns.contains(column)
                && self.profile_individual.kind_of(column) != self.profile_corporate.kind_of(column)
            {
                return Err(MigrationError::Mapping(format!(
                    "profile column '{column}' has conflicting kinds across customer types"
                )));
            }
        }

        Ok(())
    }
}
