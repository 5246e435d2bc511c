/*!
 * Schema definitions for claims input files
 *
 * Required keys and field types for claim and revert JSON events and the
 * required columns of the pharmacy CSV file, plus record validation at each
 * `ValidationLevel`.
 */

use chrono::{DateTime, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::ValidationLevel;
use crate::{ClaimsError, Result};

/// Timestamp formats accepted at `ValidationLevel::Strict` besides RFC 3339
pub const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Field layout of a JSON event record
pub trait RecordSchema {
    /// Short name used in log and error messages
    const NAME: &'static str;

    /// Keys a record must carry
    const REQUIRED_KEYS: &'static [&'static str];

    /// Identifier fields; JSON numbers here are read as strings
    const STRING_FIELDS: &'static [&'static str];

    /// Fields that must be JSON numbers
    const NUMERIC_FIELDS: &'static [&'static str] = &[];

    /// Numeric fields that must not be negative
    const NON_NEGATIVE_FIELDS: &'static [&'static str] = &[];

    /// Field holding the event timestamp
    const TIMESTAMP_FIELD: &'static str = "timestamp";
}

/// Claim event schema
pub struct ClaimSchema;

impl RecordSchema for ClaimSchema {
    const NAME: &'static str = "claim";
    const REQUIRED_KEYS: &'static [&'static str] = &["id", "npi", "ndc", "price", "quantity", "timestamp"];
    const STRING_FIELDS: &'static [&'static str] = &["id", "npi", "ndc", "timestamp"];
    const NUMERIC_FIELDS: &'static [&'static str] = &["price", "quantity"];
    const NON_NEGATIVE_FIELDS: &'static [&'static str] = &["price"];
}

/// Revert event schema
pub struct RevertSchema;

impl RecordSchema for RevertSchema {
    const NAME: &'static str = "revert";
    const REQUIRED_KEYS: &'static [&'static str] = &["id", "claim_id", "timestamp"];
    const STRING_FIELDS: &'static [&'static str] = &["id", "claim_id", "timestamp"];
}

/// Pharmacy CSV file schema
pub struct PharmacySchema;

impl PharmacySchema {
    /// Columns the pharmacy file must have; `id` is optional
    pub fn required_columns() -> &'static [&'static str] {
        &["chain", "npi"]
    }

    /// Validate that CSV headers contain every required column
    pub fn validate_headers(headers: &[String]) -> Result<()> {
        let missing: Vec<String> = Self::required_columns().iter()
            .filter(|col| !headers.iter().any(|h| h.trim() == **col))
            .map(|col| col.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ClaimsError::missing_columns(missing))
        }
    }
}

/// Check whether a timestamp is in one of the accepted formats
pub fn is_valid_timestamp(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || TIMESTAMP_FORMATS.iter().any(|fmt| NaiveDateTime::parse_from_str(value, fmt).is_ok())
}

/// Read JSON numbers in identifier fields as strings
fn coerce_string_fields<S: RecordSchema>(record: &mut Map<String, Value>) {
    for field in S::STRING_FIELDS {
        if let Some(Value::Number(n)) = record.get(*field) {
            let text = n.to_string();
            record.insert(field.to_string(), Value::String(text));
        }
    }
}

/// Validate a record object against a schema at the given level
pub fn validate_record<S: RecordSchema>(record: &Map<String, Value>, level: ValidationLevel) -> Result<()> {
    if level >= ValidationLevel::Basic {
        if let Some(missing) = S::REQUIRED_KEYS.iter().find(|key| !record.contains_key(**key)) {
            return Err(ClaimsError::invalid_field(
                missing,
                None,
                format!("{} record is missing required key '{}'", S::NAME, missing),
            ));
        }
    }

    if level >= ValidationLevel::Standard {
        for field in S::STRING_FIELDS {
            match record.get(*field) {
                Some(Value::String(s)) if s.trim().is_empty() && *field != S::TIMESTAMP_FIELD => {
                    return Err(ClaimsError::invalid_field(field, Some(s.clone()), format!("'{}' must not be empty", field)));
                }
                Some(Value::String(_)) | None => {}
                Some(other) => {
                    return Err(ClaimsError::invalid_field(field, Some(other.to_string()), format!("'{}' must be a string", field)));
                }
            }
        }

        for field in S::NUMERIC_FIELDS {
            let Some(value) = record.get(*field) else { continue };
            let Some(number) = value.as_f64() else {
                return Err(ClaimsError::invalid_field(field, Some(value.to_string()), format!("'{}' must be a number", field)));
            };
            if S::NON_NEGATIVE_FIELDS.contains(field) && number < 0.0 {
                return Err(ClaimsError::invalid_field(field, Some(value.to_string()), format!("'{}' must not be negative", field)));
            }
        }
    }

    if level >= ValidationLevel::Strict {
        if let Some(Value::String(ts)) = record.get(S::TIMESTAMP_FIELD) {
            if !is_valid_timestamp(ts) {
                return Err(ClaimsError::invalid_field(
                    S::TIMESTAMP_FIELD,
                    Some(ts.clone()),
                    "timestamp is not RFC 3339 or YYYY-MM-DDTHH:MM:SS",
                ));
            }
        }
    }

    Ok(())
}

/// Validate a raw JSON value and convert it into a typed record
pub fn parse_record<S: RecordSchema, T: DeserializeOwned>(value: Value, level: ValidationLevel) -> Result<T> {
    let mut record = match value {
        Value::Object(record) => record,
        other => {
            return Err(ClaimsError::invalid_field(
                S::NAME,
                Some(other.to_string()),
                format!("{} record is not a JSON object", S::NAME),
            ));
        }
    };

    coerce_string_fields::<S>(&mut record);
    validate_record::<S>(&record, level)?;

    serde_json::from_value(Value::Object(record)).map_err(|e| {
        ClaimsError::invalid_field(S::NAME, None, format!("{} record has wrong field types: {}", S::NAME, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::{Claim, Revert};
    use serde_json::json;

    fn claim_json() -> Value {
        json!({
            "id": "c1",
            "npi": 1234567890u64,
            "ndc": "00002323401",
            "price": 12.5,
            "quantity": 30,
            "timestamp": "2024-02-01T10:11:12"
        })
    }

    #[test]
    fn test_parse_claim_coerces_numeric_ids() {
        let claim: Claim = parse_record::<ClaimSchema, _>(claim_json(), ValidationLevel::Strict).unwrap();
        assert_eq!(claim.npi, "1234567890");
        assert_eq!(claim.quantity, 30.0);
    }

    #[test]
    fn test_missing_key_rejected_at_basic() {
        let mut value = claim_json();
        value.as_object_mut().unwrap().remove("timestamp");
        let err = parse_record::<ClaimSchema, Claim>(value, ValidationLevel::Basic).unwrap_err();
        match err {
            ClaimsError::DataValidation { field, .. } => assert_eq!(field.as_deref(), Some("timestamp")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_negative_price_rejected_at_standard_only() {
        let mut value = claim_json();
        value["price"] = json!(-1.0);
        assert!(parse_record::<ClaimSchema, Claim>(value.clone(), ValidationLevel::Standard).is_err());
        assert!(parse_record::<ClaimSchema, Claim>(value, ValidationLevel::Basic).is_ok());
    }

    #[test]
    fn test_negative_quantity_allowed() {
        let mut value = claim_json();
        value["quantity"] = json!(-3);
        let claim: Claim = parse_record::<ClaimSchema, _>(value, ValidationLevel::Strict).unwrap();
        assert_eq!(claim.quantity, -3.0);
    }

    #[test]
    fn test_string_price_rejected() {
        let mut value = claim_json();
        value["price"] = json!("12.5");
        assert!(parse_record::<ClaimSchema, Claim>(value, ValidationLevel::Standard).is_err());
    }

    #[test]
    fn test_strict_timestamp() {
        assert!(is_valid_timestamp("2024-02-01T10:11:12"));
        assert!(is_valid_timestamp("2024-02-01T10:11:12.123456"));
        assert!(is_valid_timestamp("2024-02-01T10:11:12Z"));
        assert!(is_valid_timestamp("2024-02-01 10:11:12"));
        assert!(!is_valid_timestamp("yesterday"));

        let mut value = claim_json();
        value["timestamp"] = json!("yesterday");
        assert!(parse_record::<ClaimSchema, Claim>(value.clone(), ValidationLevel::Standard).is_ok());
        assert!(parse_record::<ClaimSchema, Claim>(value, ValidationLevel::Strict).is_err());
    }

    #[test]
    fn test_revert_record() {
        let value = json!({"id": "r1", "claim_id": "c1", "timestamp": "2024-02-01T10:11:12"});
        let revert: Revert = parse_record::<RevertSchema, _>(value, ValidationLevel::Standard).unwrap();
        assert_eq!(revert.claim_id, "c1");

        let not_object = json!(["r1", "c1"]);
        assert!(parse_record::<RevertSchema, Revert>(not_object, ValidationLevel::None).is_err());
    }

    #[test]
    fn test_pharmacy_headers() {
        let ok = vec!["chain".to_string(), "npi".to_string()];
        assert!(PharmacySchema::validate_headers(&ok).is_ok());

        let bad = vec!["id".to_string(), "npi".to_string()];
        match PharmacySchema::validate_headers(&bad).unwrap_err() {
            ClaimsError::SchemaMismatch { missing_columns, .. } => assert_eq!(missing_columns, vec!["chain"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
