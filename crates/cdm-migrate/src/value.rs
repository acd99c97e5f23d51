//! Typed field values for mapping-driven rows
//!
//! The transformer works over column sets defined by the mapping document
//! rather than fixed struct fields, so row values travel as [`FieldValue`].
//! Every value, including null, carries a concrete kind: a bound NULL still
//! needs a Postgres type.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Date format used for `date` conversions and document serialization
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Conversion failure for a single field value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot convert {value} to {target}")]
pub struct ConversionError {
    pub value: String,
    pub target: ValueKind,
}

/// The kinds a destination field can convert to
///
/// Doubles as the `conversions` vocabulary of the mapping document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Text,
    Integer,
    Boolean,
    Date,
    Timestamp,
    Uuid,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::Text => write!(f, "text"),
            ValueKind::Integer => write!(f, "integer"),
            ValueKind::Boolean => write!(f, "boolean"),
            ValueKind::Date => write!(f, "date"),
            ValueKind::Timestamp => write!(f, "timestamp"),
            ValueKind::Uuid => write!(f, "uuid"),
        }
    }
}

/// A single typed column value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    /// Absent value with the type the column would have carried
    Null(ValueKind),
}

impl FieldValue {
    /// Kind of this value (for nulls, the kind the column carries)
    pub fn kind(&self) -> ValueKind {
        match self {
            FieldValue::Text(_) => ValueKind::Text,
            FieldValue::Integer(_) => ValueKind::Integer,
            FieldValue::Boolean(_) => ValueKind::Boolean,
            FieldValue::Date(_) => ValueKind::Date,
            FieldValue::Timestamp(_) => ValueKind::Timestamp,
            FieldValue::Uuid(_) => ValueKind::Uuid,
            FieldValue::Null(kind) => *kind,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null(_))
    }

    /// Build a value from an optional text column, keeping nulls typed
    pub fn from_text(value: Option<&str>) -> FieldValue {
        match value {
            Some(s) => FieldValue::Text(s.to_string()),
            None => FieldValue::Null(ValueKind::Text),
        }
    }

    /// Convert to the target kind per the mapping document rules
    ///
    /// Text parses into the target type; nulls stay null but adopt the
    /// target kind; any scalar converts to text via its canonical rendering.
    /// Everything else is an error.
    pub fn convert(&self, target: ValueKind) -> Result<FieldValue, ConversionError> {
        if self.kind() == target {
            return Ok(self.clone());
        }

        let fail = || ConversionError {
            value: self.render(),
            target,
        };

        match (self, target) {
            (FieldValue::Null(_), kind) => Ok(FieldValue::Null(kind)),
            (_, ValueKind::Text) => Ok(FieldValue::Text(self.render())),
            (FieldValue::Text(s), ValueKind::Integer) => s
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| fail()),
            (FieldValue::Text(s), ValueKind::Boolean) => {
                parse_boolean(s).map(FieldValue::Boolean).ok_or_else(fail)
            },
            (FieldValue::Text(s), ValueKind::Date) => {
                NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                    .map(FieldValue::Date)
                    .map_err(|_| fail())
            },
            (FieldValue::Text(s), ValueKind::Timestamp) => {
                parse_timestamp(s).map(FieldValue::Timestamp).ok_or_else(fail)
            },
            (FieldValue::Text(s), ValueKind::Uuid) => Uuid::parse_str(s.trim())
                .map(FieldValue::Uuid)
                .map_err(|_| fail()),
            (FieldValue::Timestamp(ts), ValueKind::Date) => Ok(FieldValue::Date(ts.date_naive())),
            (FieldValue::Date(d), ValueKind::Timestamp) => d
                .and_hms_opt(0, 0, 0)
                .map(|dt| FieldValue::Timestamp(dt.and_utc()))
                .ok_or_else(fail),
            _ => Err(fail()),
        }
    }

    /// Build a typed value from a mapping-document literal
    ///
    /// Default values arrive as JSON literals; strings parse through
    /// [`FieldValue::convert`] so a uuid or date default lands typed.
    pub fn from_literal(
        literal: &serde_json::Value,
        kind: ValueKind,
    ) -> Result<FieldValue, ConversionError> {
        let fail = || ConversionError {
            value: literal.to_string(),
            target: kind,
        };

        match literal {
            serde_json::Value::Null => Ok(FieldValue::Null(kind)),
            serde_json::Value::String(s) => FieldValue::Text(s.clone()).convert(kind),
            serde_json::Value::Bool(b) => FieldValue::Boolean(*b).convert(kind),
            serde_json::Value::Number(n) => {
                let i = n.as_i64().ok_or_else(fail)?;
                FieldValue::Integer(i).convert(kind)
            },
            _ => Err(fail()),
        }
    }

    /// Project into a JSON document value
    ///
    /// Dates render as `YYYY-MM-DD` and timestamps as RFC 3339, matching
    /// what profile-document consumers expect.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
            FieldValue::Integer(i) => serde_json::Value::from(*i),
            FieldValue::Boolean(b) => serde_json::Value::Bool(*b),
            FieldValue::Date(d) => serde_json::Value::String(d.format(DATE_FORMAT).to_string()),
            FieldValue::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
            FieldValue::Uuid(u) => serde_json::Value::String(u.to_string()),
            FieldValue::Null(_) => serde_json::Value::Null,
        }
    }

    /// Canonical text rendering (used by text conversion and errors)
    fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Date(d) => d.format(DATE_FORMAT).to_string(),
            FieldValue::Timestamp(ts) => ts.to_rfc3339(),
            FieldValue::Uuid(u) => u.to_string(),
            FieldValue::Null(kind) => format!("null ({})", kind),
        }
    }

    /// Bind this value into a `push_values` tuple
    ///
    /// Nulls bind through a typed `Option` so Postgres can infer the
    /// placeholder type.
    pub fn push_bind(
        &self,
        b: &mut sqlx::query_builder::Separated<'_, '_, sqlx::Postgres, &'static str>,
    ) {
        match self {
            FieldValue::Text(s) => {
                b.push_bind(s.clone());
            },
            FieldValue::Integer(i) => {
                b.push_bind(*i);
            },
            FieldValue::Boolean(v) => {
                b.push_bind(*v);
            },
            FieldValue::Date(d) => {
                b.push_bind(*d);
            },
            FieldValue::Timestamp(ts) => {
                b.push_bind(*ts);
            },
            FieldValue::Uuid(u) => {
                b.push_bind(*u);
            },
            FieldValue::Null(kind) => match kind {
                ValueKind::Text => {
                    b.push_bind(Option::<String>::None);
                },
                ValueKind::Integer => {
                    b.push_bind(Option::<i64>::None);
                },
                ValueKind::Boolean => {
                    b.push_bind(Option::<bool>::None);
                },
                ValueKind::Date => {
                    b.push_bind(Option::<NaiveDate>::None);
                },
                ValueKind::Timestamp => {
                    b.push_bind(Option::<DateTime<Utc>>::None);
                },
                ValueKind::Uuid => {
                    b.push_bind(Option::<Uuid>::None);
                },
            },
        }
    }
}

fn parse_boolean(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "y" | "yes" => Some(true),
        "false" | "f" | "0" | "n" | "no" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    // Source exports use a space-separated form; naive values are taken as UTC
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
