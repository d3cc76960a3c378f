//! Field types and typed field values.
//!
//! Field values are plain strings at the storage boundary (`""` means "not
//! set"). Everything above storage parses them into [`FieldValue`] using the
//! field's declared [`FieldType`] and rejects values that do not parse.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Storage format for date values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// FieldType
// ---------------------------------------------------------------------------

/// The declared type of a template field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Select,
    Date,
    /// Reference to an agent profile.
    Agent,
    /// Reference to a customer profile.
    Customer,
}

impl FieldType {
    pub const ALL: [FieldType; 6] = [
        FieldType::Text,
        FieldType::Number,
        FieldType::Select,
        FieldType::Date,
        FieldType::Agent,
        FieldType::Customer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Select => "select",
            FieldType::Date => "date",
            FieldType::Agent => "agent",
            FieldType::Customer => "customer",
        }
    }

    /// Parse a stored type name.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| CoreError::Validation(format!("Unknown field type '{name}'")))
    }

    /// Whether values of this type are profile ids.
    pub fn is_reference(self) -> bool {
        matches!(self, FieldType::Agent | FieldType::Customer)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// A parsed, non-empty field value.
///
/// Equality is semantic: `1.0` and `1` are the same number, so re-submitting
/// a number in another notation is not a change.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Free text and select choices.
    Text(String),
    Number(BigDecimal),
    Date(NaiveDate),
    /// A profile id (agent or customer reference).
    Reference(DbId),
}

impl FieldValue {
    /// Parse a raw string for the given field type.
    ///
    /// Returns `Ok(None)` for a blank value ("not set").
    pub fn parse(field_type: FieldType, raw: &str) -> Result<Option<Self>, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let value = match field_type {
            FieldType::Text => FieldValue::Text(raw.to_string()),
            FieldType::Select => FieldValue::Text(trimmed.to_string()),
            FieldType::Number => BigDecimal::from_str(trimmed)
                .map(FieldValue::Number)
                .map_err(|_| CoreError::Validation(format!("'{trimmed}' is not a valid number")))?,
            FieldType::Date => FieldValue::Date(parse_date(trimmed)?),
            FieldType::Agent | FieldType::Customer => {
                let id: DbId = trimmed.parse().map_err(|_| {
                    CoreError::Validation(format!("'{trimmed}' is not a valid profile id"))
                })?;
                if id <= 0 {
                    return Err(CoreError::Validation(format!(
                        "'{trimmed}' is not a valid profile id"
                    )));
                }
                FieldValue::Reference(id)
            }
        };
        Ok(Some(value))
    }

    /// Render the value in its canonical storage form.
    pub fn to_storage(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Date(d) => d.format(DATE_FORMAT).to_string(),
            FieldValue::Reference(id) => id.to_string(),
        }
    }

    pub fn as_reference(&self) -> Option<DbId> {
        match self {
            FieldValue::Reference(id) => Some(*id),
            _ => None,
        }
    }
}

/// Accepts `YYYY-MM-DD` and RFC 3339 timestamps (the date part is kept).
fn parse_date(raw: &str) -> Result<NaiveDate, CoreError> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        return Ok(date);
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .map_err(|_| CoreError::Validation(format!("'{raw}' is not a valid date (YYYY-MM-DD)")))
}

/// Parse and re-render a raw value; blank input canonicalizes to `""`.
pub fn canonicalize(field_type: FieldType, raw: &str) -> Result<String, CoreError> {
    Ok(FieldValue::parse(field_type, raw)?
        .map(|v| v.to_storage())
        .unwrap_or_default())
}

/// Compare two stored values of the same field semantically.
///
/// Falls back to exact string comparison when either side does not parse,
/// which can only happen for rows written outside this crate.
pub fn values_equal(field_type: FieldType, a: &str, b: &str) -> bool {
    match (FieldValue::parse(field_type, a), FieldValue::parse(field_type, b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn blank_values_are_not_set() {
        for t in FieldType::ALL {
            assert_matches!(FieldValue::parse(t, "   "), Ok(None));
        }
    }

    #[test]
    fn number_equality_ignores_notation() {
        assert!(values_equal(FieldType::Number, "1.0", "1"));
        assert!(values_equal(FieldType::Number, "2.50", "2.5"));
        assert!(!values_equal(FieldType::Number, "2", "3"));
    }

    #[test]
    fn invalid_number_is_rejected() {
        assert_matches!(
            FieldValue::parse(FieldType::Number, "twelve"),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn dates_accept_rfc3339_and_store_as_plain_dates() {
        assert_eq!(
            canonicalize(FieldType::Date, "2025-01-21T13:45:00Z").unwrap(),
            "2025-01-21"
        );
        assert_eq!(canonicalize(FieldType::Date, "2025-01-21").unwrap(), "2025-01-21");
        assert!(canonicalize(FieldType::Date, "21/01/2025").is_err());
    }

    #[test]
    fn references_must_be_positive_ids() {
        assert_matches!(
            FieldValue::parse(FieldType::Agent, "42"),
            Ok(Some(FieldValue::Reference(42)))
        );
        assert!(FieldValue::parse(FieldType::Customer, "-1").is_err());
        assert!(FieldValue::parse(FieldType::Customer, "abc").is_err());
    }

    #[test]
    fn select_values_are_trimmed_but_text_is_kept_verbatim() {
        assert_eq!(canonicalize(FieldType::Select, "  New ").unwrap(), "New");
        assert_eq!(canonicalize(FieldType::Text, " hello ").unwrap(), " hello ");
    }

    #[test]
    fn type_names_round_trip() {
        for t in FieldType::ALL {
            assert_eq!(FieldType::parse(t.as_str()).unwrap(), t);
        }
        assert!(FieldType::parse("checkbox").is_err());
    }
}
