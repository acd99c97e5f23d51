//! Mapping-driven row transformation
//!
//! Turns staged rows into destination records: source fields rename to
//! destination names, configured defaults fill absent values, explicit
//! conversions retype fields, and the remaining profile fields consolidate
//! into the `customerProfileData` document. Identifier columns are injected
//! from the ledger, never mapped.
//!
//! A row that cannot be transformed is logged, counted and skipped. It
//! never aborts the batch.

use std::collections::HashMap;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::warn;

use crate::mapping::{MappingDocument, TableMapping};
use crate::models::{CustomerIdentifiers, CustomerProfileRecord, CustomerRecord, StagedCustomer};
use crate::value::{ConversionError, FieldValue, ValueKind};

/// Why one staged row could not be transformed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("no identifier pair assigned for customer_code {customer_code}")]
    MissingIdentifiers { customer_code: i64 },

    #[error("unrecognized customer type '{customer_type}'")]
    UnknownCustomerType { customer_type: String },

    #[error("field '{field}': {source}")]
    Conversion {
        field: String,
        #[source]
        source: ConversionError,
    },
}

/// Transformed batch plus the rows the error policy dropped
#[derive(Debug, Default)]
pub struct TransformOutcome {
    pub customers: Vec<CustomerRecord>,
    pub profiles: Vec<CustomerProfileRecord>,
    pub skipped: usize,
}

/// Applies the mapping document to staged rows
pub struct Transformer {
    mapping: MappingDocument,
}

impl Transformer {
    pub fn new(mapping: MappingDocument) -> Self {
        Self { mapping }
    }

    /// Transform a staged batch under the skip-and-count row policy
    pub fn transform_batch(
        &self,
        rows: &[StagedCustomer],
        identifiers: &HashMap<i64, CustomerIdentifiers>,
    ) -> TransformOutcome {
        let mut outcome = TransformOutcome::default();

        for row in rows {
            match self.transform_row(row, identifiers) {
                Ok((customer, profile)) => {
                    outcome.customers.push(customer);
                    outcome.profiles.push(profile);
                },
                Err(error) => {
                    warn!(
                        customer_code = row.customer_code,
                        error = %error,
                        "Skipping row that failed transformation"
                    );
                    outcome.skipped += 1;
                },
            }
        }

        outcome
    }

    /// Transform one staged row into a customer and a profile record
    pub fn transform_row(
        &self,
        row: &StagedCustomer,
        identifiers: &HashMap<i64, CustomerIdentifiers>,
    ) -> Result<(CustomerRecord, CustomerProfileRecord), RowError> {
        let ids = identifiers.get(&row.customer_code).copied().ok_or(
            RowError::MissingIdentifiers {
                customer_code: row.customer_code,
            },
        )?;

        let profile_mapping = self.mapping.profile_for(&row.customer_type).ok_or_else(|| {
            RowError::UnknownCustomerType {
                customer_type: row.customer_type.clone(),
            }
        })?;

        let source: IndexMap<&str, FieldValue> = row.fields().into_iter().collect();

        let customer_fields = apply_mapping(&source, &self.mapping.customer)?;
        let customer = CustomerRecord {
            customer_id: ids.customer_id,
            columns: select_columns(&customer_fields, &self.mapping.customer),
        };

        let profile_fields = apply_mapping(&source, profile_mapping)?;
        let profile = CustomerProfileRecord {
            customer_profile_id: ids.customer_profile_id,
            customer_id: ids.customer_id,
            columns: select_columns(&profile_fields, profile_mapping),
            profile_data: build_document(&profile_fields, profile_mapping),
        };

        Ok((customer, profile))
    }
}

/// Rename, default and convert one row's fields per a table mapping
fn apply_mapping(
    source: &IndexMap<&str, FieldValue>,
    mapping: &TableMapping,
) -> Result<IndexMap<String, FieldValue>, RowError> {
    let mut fields: IndexMap<String, FieldValue> = IndexMap::with_capacity(mapping.renames.len());

    for (from, to) in &mapping.renames {
        let value = source
            .get(from.as_str())
            .cloned()
            .unwrap_or(FieldValue::Null(ValueKind::Text));
        fields.insert(to.clone(), value);
    }

    // Defaults fill absent or null fields only; an empty string is a value
    for (field, literal) in &mapping.defaults {
        let absent = fields.get(field).map(FieldValue::is_null).unwrap_or(true);
        if absent {
            let value = FieldValue::from_literal(literal, mapping.kind_of(field)).map_err(
                |cause| RowError::Conversion {
                    field: field.clone(),
                    source: cause,
                },
            )?;
            fields.insert(field.clone(), value);
        }
    }

    for (field, kind) in &mapping.conversions {
        if let Some(value) = fields.get(field) {
            let converted = value.convert(*kind).map_err(|cause| RowError::Conversion {
                field: field.clone(),
                source: cause,
            })?;
            fields.insert(field.clone(), converted);
        }
    }

    Ok(fields)
}

/// Project the flat destination columns, in mapping order
///
/// A column with no mapped value lands as a typed null.
fn select_columns(
    fields: &IndexMap<String, FieldValue>,
    mapping: &TableMapping,
) -> IndexMap<String, FieldValue> {
    mapping
        .columns
        .iter()
        .map(|column| {
            let value = fields
                .get(column)
                .cloned()
                .unwrap_or_else(|| FieldValue::Null(mapping.kind_of(column)));
            (column.clone(), value)
        })
        .collect()
}

/// Consolidate the configured document keys, in order, nulls included
fn build_document(
    fields: &IndexMap<String, FieldValue>,
    mapping: &TableMapping,
) -> serde_json::Value {
    let mut document = serde_json::Map::with_capacity(mapping.document_fields.len());
    for field in &mapping.document_fields {
        let value = fields
            .get(field)
            .map(FieldValue::to_json)
            .unwrap_or(serde_json::Value::Null);
        document.insert(field.clone(), value);
    }
    serde_json::Value::Object(document)
}
