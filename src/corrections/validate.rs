//! Correction validator
//!
//! Checks a change-set against an entity schema and normalises it. Every
//! problem found is reported, each tagged with the offending field path
//! (`rewards[2].quantity`), so a form can highlight all of them at once.

use serde_json::{Map, Value};

use super::diff::is_unset;
use super::model::ChangeSet;
use crate::db::Document;
use crate::schema::{EntitySchema, FieldSpec, FieldType};
use crate::types::{FieldIssue, Result, ValidationErrors};

/// Upper bound on the justification text
pub const MAX_REASON_LEN: usize = 2000;

/// Validate a submitted correction and return the normalised change-set
pub fn validate_correction(schema: &EntitySchema, changes: &ChangeSet, reason: &str) -> Result<ChangeSet> {
    let mut issues = ValidationErrors::new();

    if changes.is_empty() {
        issues.push(FieldIssue::general("No changes detected"));
    }
    let normalized = check_changes(schema, changes, &mut issues);
    check_reason(reason, &mut issues);

    issues.into_result()?;
    Ok(normalized)
}

/// Validate a change-set without a justification (apply-time re-validation)
pub fn validate_changes(schema: &EntitySchema, changes: &ChangeSet) -> Result<ChangeSet> {
    let mut issues = ValidationErrors::new();

    if changes.is_empty() {
        issues.push(FieldIssue::general("No changes detected"));
    }
    let normalized = check_changes(schema, changes, &mut issues);

    issues.into_result()?;
    Ok(normalized)
}

/// Validate a complete record, including required fields
pub fn validate_record(schema: &EntitySchema, record: &Document) -> Result<()> {
    let mut issues = ValidationErrors::new();

    for spec in &schema.fields {
        let value = record.get(&spec.name);
        if is_unset(value) {
            if spec.required {
                issues.push(FieldIssue::field(&spec.name, "is required"));
            }
            continue;
        }
        if let Some(value) = value {
            let value = normalize_value(&spec.field_type, value);
            check_value(&spec.field_type, &value, &spec.name, &mut issues);
        }
    }

    issues.into_result()
}

pub fn check_reason(reason: &str, issues: &mut ValidationErrors) {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        issues.push(FieldIssue::field("reason", "is required"));
    } else if trimmed.chars().count() > MAX_REASON_LEN {
        issues.push(FieldIssue::field(
            "reason",
            format!("must be at most {MAX_REASON_LEN} characters"),
        ));
    }
}

/// Normalise a candidate record before diffing.
///
/// Schema fields get their values normalised; other keys pass through
/// untouched (the diff ignores them).
pub fn normalize_candidate(schema: &EntitySchema, candidate: &Document) -> Document {
    candidate
        .iter()
        .map(|(key, value)| {
            let value = match schema.field(key) {
                Some(spec) => normalize_value(&spec.field_type, value),
                None => value.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Normalise one value for its field type.
///
/// Integers given as floats with no fraction become integers. Record lists
/// lose unknown and unset sub-keys, and trailing entries left empty.
pub fn normalize_value(field_type: &FieldType, value: &Value) -> Value {
    match (field_type, value) {
        (FieldType::Integer { .. }, Value::Number(n)) if n.as_i64().is_none() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                Value::from(f as i64)
            }
            _ => value.clone(),
        },
        (FieldType::List { item, .. }, Value::Array(items)) => {
            Value::Array(items.iter().map(|v| normalize_value(item, v)).collect())
        }
        (FieldType::Records { fields, .. }, Value::Array(entries)) => {
            let mut normalized: Vec<Value> = entries
                .iter()
                .map(|entry| match entry {
                    Value::Object(map) => Value::Object(normalize_entry(fields, map)),
                    other => other.clone(),
                })
                .collect();

            while matches!(normalized.last(), Some(Value::Object(m)) if m.is_empty()) {
                normalized.pop();
            }
            Value::Array(normalized)
        }
        _ => value.clone(),
    }
}

fn normalize_entry(fields: &[FieldSpec], entry: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|spec| {
            let value = entry.get(&spec.name);
            if is_unset(value) {
                return None;
            }
            value.map(|v| (spec.name.clone(), normalize_value(&spec.field_type, v)))
        })
        .collect()
}

fn check_changes(schema: &EntitySchema, changes: &ChangeSet, issues: &mut ValidationErrors) -> ChangeSet {
    let mut normalized = ChangeSet::new();

    for (field, value) in changes.iter() {
        let Some(spec) = schema.field(field) else {
            issues.push(FieldIssue::field(field, "is not a correctable field"));
            continue;
        };
        if is_unset(Some(value)) {
            issues.push(FieldIssue::field(field, "must have a value"));
            continue;
        }

        let value = normalize_value(&spec.field_type, value);
        if check_value(&spec.field_type, &value, field, issues) {
            normalized.insert(field.clone(), value);
        }
    }

    normalized
}

/// Check a normalised value; returns false if any issue was recorded
fn check_value(field_type: &FieldType, value: &Value, path: &str, issues: &mut ValidationErrors) -> bool {
    let before = issues.len();

    match field_type {
        FieldType::Text { max_len } => match value {
            Value::String(s) if s.trim().is_empty() => {
                issues.push(FieldIssue::field(path, "must not be blank"))
            }
            Value::String(s) if s.chars().count() > *max_len => issues.push(FieldIssue::field(
                path,
                format!("must be at most {max_len} characters"),
            )),
            Value::String(_) => {}
            _ => issues.push(FieldIssue::field(path, "must be text")),
        },

        FieldType::Integer { min, max } => match value.as_i64() {
            Some(n) if n < *min => issues.push(FieldIssue::field(path, format!("must be at least {min}"))),
            Some(n) if n > *max => issues.push(FieldIssue::field(path, format!("must be at most {max}"))),
            Some(_) => {}
            None => issues.push(FieldIssue::field(path, "must be a whole number")),
        },

        FieldType::Number { min, max } => match value.as_f64() {
            Some(n) if !n.is_finite() => issues.push(FieldIssue::field(path, "must be a number")),
            Some(n) if n < *min => issues.push(FieldIssue::field(path, format!("must be at least {min}"))),
            Some(n) if n > *max => issues.push(FieldIssue::field(path, format!("must be at most {max}"))),
            Some(_) => {}
            None => issues.push(FieldIssue::field(path, "must be a number")),
        },

        FieldType::Boolean => {
            if !value.is_boolean() {
                issues.push(FieldIssue::field(path, "must be true or false"));
            }
        }

        FieldType::Enum { options } => match value {
            Value::String(s) if options.iter().any(|o| o == s) => {}
            Value::String(s) => {
                issues.push(FieldIssue::field(path, format!("'{s}' is not a valid option")))
            }
            _ => issues.push(FieldIssue::field(path, "must be one of the listed options")),
        },

        FieldType::List { item, max_items } => match value {
            Value::Array(items) => {
                if items.len() > *max_items {
                    issues.push(FieldIssue::field(
                        path,
                        format!("must have at most {max_items} entries"),
                    ));
                }
                for (i, v) in items.iter().enumerate() {
                    check_value(item, v, &format!("{path}[{i}]"), issues);
                }
            }
            _ => issues.push(FieldIssue::field(path, "must be a list")),
        },

        FieldType::Records { fields, max_items } => match value {
            Value::Array(entries) => {
                if entries.len() > *max_items {
                    issues.push(FieldIssue::field(
                        path,
                        format!("must have at most {max_items} entries"),
                    ));
                }
                for (i, entry) in entries.iter().enumerate() {
                    check_entry(fields, entry, &format!("{path}[{i}]"), issues);
                }
            }
            _ => issues.push(FieldIssue::field(path, "must be a list")),
        },
    }

    issues.len() == before
}

fn check_entry(fields: &[FieldSpec], entry: &Value, path: &str, issues: &mut ValidationErrors) {
    let Value::Object(map) = entry else {
        issues.push(FieldIssue::field(path, "must be an entry"));
        return;
    };

    for spec in fields {
        let sub_path = format!("{path}.{}", spec.name);
        match map.get(&spec.name) {
            value if is_unset(value) => {
                if spec.required {
                    issues.push(FieldIssue::field(sub_path, "is required"));
                }
            }
            Some(value) => {
                check_value(&spec.field_type, value, &sub_path, issues);
            }
            None => {}
        }
    }
}
