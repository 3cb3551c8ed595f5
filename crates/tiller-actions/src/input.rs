//! Request-input decoding.
//!
//! JSON crosses into the engine exactly once, here: nullable-input
//! envelopes are unwrapped recursively, then every argument is coerced
//! into the typed value union, using the targeted field's type where
//! the schema knows it.

use tiller_core::{Record, Value};
use tiller_query::Scope;

use crate::error::ActionError;

/// Decode a request payload into a typed record.
pub(crate) fn decode_inputs(
    scope: &Scope<'_>,
    json: &serde_json::Value,
) -> Result<Record, ActionError> {
    let unwrapped = unwrap_envelopes(json)?;
    let Some(map) = unwrapped.as_object() else {
        // The transport layer is contractually required to deliver an
        // object here.
        return Err(ActionError::Internal(
            "action inputs must be an object".to_string(),
        ));
    };
    coerce_record(scope, map)
}

fn coerce_record(
    scope: &Scope<'_>,
    map: &serde_json::Map<String, serde_json::Value>,
) -> Result<Record, ActionError> {
    let mut record = Record::new();
    for (name, value) in map {
        // `where` / `values` wrappers on update and list payloads
        // coerce per-field like the top level.
        if name == "where" || name == "values" {
            if let Some(object) = value.as_object() {
                let inner = coerce_record(scope, object)?;
                record.insert(name.clone(), Value::Record(inner));
                continue;
            }
        }
        record.insert(name.clone(), coerce_argument(scope, name, value)?);
    }
    Ok(record)
}

fn coerce_argument(
    scope: &Scope<'_>,
    name: &str,
    value: &serde_json::Value,
) -> Result<Value, ActionError> {
    // Prefer the declared type of the targeted field.
    let field_type = scope
        .action
        .inputs
        .iter()
        .find(|input| input.name == name)
        .and_then(|input| input.target.last())
        .and_then(|fragment| scope.model.field(fragment))
        .map(|field| field.field_type.clone());

    match field_type {
        Some(field_type) => Value::coerce(value, &field_type)
            .map_err(|err| ActionError::InputValidation(format!("argument '{}': {}", name, err))),
        None => Ok(Value::from_json(value)),
    }
}

/// Recursively unwrap `{value, isNull}` envelopes carried by nullable
/// inputs in nested create/update payloads.
fn unwrap_envelopes(json: &serde_json::Value) -> Result<serde_json::Value, ActionError> {
    match json {
        serde_json::Value::Object(map) => {
            if let Some(result) = try_unwrap_envelope(map)? {
                return Ok(result);
            }
            let mut unwrapped = serde_json::Map::new();
            for (key, value) in map {
                unwrapped.insert(key.clone(), unwrap_envelopes(value)?);
            }
            Ok(serde_json::Value::Object(unwrapped))
        }
        serde_json::Value::Array(items) => {
            let unwrapped: Result<Vec<_>, _> = items.iter().map(unwrap_envelopes).collect();
            Ok(serde_json::Value::Array(unwrapped?))
        }
        other => Ok(other.clone()),
    }
}

fn try_unwrap_envelope(
    map: &serde_json::Map<String, serde_json::Value>,
) -> Result<Option<serde_json::Value>, ActionError> {
    if !map.contains_key("isNull") {
        return Ok(None);
    }
    if map.len() > 2 || (map.len() == 2 && !map.contains_key("value")) {
        return Err(ActionError::InputValidation(
            "nullable envelope must carry only 'value' and 'isNull'".to_string(),
        ));
    }
    let Some(is_null) = map.get("isNull").and_then(serde_json::Value::as_bool) else {
        return Err(ActionError::InputValidation(
            "nullable envelope field 'isNull' must be a boolean".to_string(),
        ));
    };
    if is_null {
        return Ok(Some(serde_json::Value::Null));
    }
    match map.get("value") {
        Some(value) => Ok(Some(unwrap_envelopes(value)?)),
        None => Err(ActionError::InputValidation(
            "nullable envelope missing 'value'".to_string(),
        )),
    }
}

/// Reject a request missing a required read argument.
pub(crate) fn validate_required_reads(
    scope: &Scope<'_>,
    inputs: &Record,
) -> Result<(), ActionError> {
    use tiller_core::{InputBehaviour, InputMode};

    for input in &scope.action.inputs {
        if input.mode != InputMode::Read
            || input.behaviour != InputBehaviour::Implicit
            || input.optional
        {
            continue;
        }
        if !inputs.contains_key(&input.name) {
            return Err(ActionError::InputValidation(format!(
                "missing required argument '{}'",
                input.name
            )));
        }
    }
    Ok(())
}

/// Require a record argument, for update-style `{where, values}`
/// payloads.
pub(crate) fn sub_record<'r>(
    inputs: &'r Record,
    key: &str,
) -> Result<std::borrow::Cow<'r, Record>, ActionError> {
    match inputs.get(key) {
        Some(Value::Record(map)) => Ok(std::borrow::Cow::Borrowed(map)),
        None => Ok(std::borrow::Cow::Owned(Record::new())),
        Some(other) => Err(ActionError::InputValidation(format!(
            "argument '{}' must be an object, got {:?}",
            key, other
        ))),
    }
}

/// A merged view of top-level, `where` and `values` arguments, for
/// expression compilation, which may reference any declared input.
pub(crate) fn merged_inputs(inputs: &Record) -> Record {
    let mut merged = Record::new();
    for (key, value) in inputs {
        match (key.as_str(), value) {
            ("where", Value::Record(map)) | ("values", Value::Record(map)) => {
                for (k, v) in map {
                    merged.insert(k.clone(), v.clone());
                }
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_unwraps_to_value() {
        let json = json!({"name": {"value": "sam", "isNull": false}});
        let unwrapped = unwrap_envelopes(&json).unwrap();
        assert_eq!(unwrapped, json!({"name": "sam"}));
    }

    #[test]
    fn envelope_unwraps_to_null() {
        let json = json!({"name": {"value": "sam", "isNull": true}});
        let unwrapped = unwrap_envelopes(&json).unwrap();
        assert_eq!(unwrapped, json!({"name": null}));
    }

    #[test]
    fn envelopes_unwrap_recursively() {
        let json = json!({
            "values": {"nested": {"value": {"inner": {"value": 3, "isNull": false}}, "isNull": false}}
        });
        let unwrapped = unwrap_envelopes(&json).unwrap();
        assert_eq!(unwrapped, json!({"values": {"nested": {"inner": 3}}}));
    }

    #[test]
    fn malformed_envelope_is_rejected() {
        let json = json!({"name": {"value": "sam", "isNull": "yes"}});
        assert!(matches!(
            unwrap_envelopes(&json),
            Err(ActionError::InputValidation(_))
        ));

        let json = json!({"name": {"value": "sam", "isNull": false, "extra": 1}});
        assert!(matches!(
            unwrap_envelopes(&json),
            Err(ActionError::InputValidation(_))
        ));
    }
}
