//! Extraction output schema
//!
//! Generates the JSON schema sent to the structured-output service from the
//! Rust types, normalised for strict mode:
//! 1. `additionalProperties: false` on every object
//! 2. every property listed in `required` (optional ones are nullable)
//! 3. no `$ref`, `definitions` or single-element `allOf` wrappers

use dynasty_core::{DynastyError, PoliticalRelation, Result};
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name attached to the schema in service requests
pub const SCHEMA_NAME: &str = "political_relations";

/// Root object returned by the service.
///
/// Strict mode needs an object root, so the relation list is wrapped.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RelationsPayload {
    /// Family members who were members of parliament, local councillors, or otherwise politicians
    pub relations: Vec<PoliticalRelation>,
}

/// Strict-mode schema for [`RelationsPayload`]
pub fn relations_schema() -> Value {
    strict_schema::<RelationsPayload>()
}

/// Strict-mode schema for any `JsonSchema` type
pub fn strict_schema<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_default();

    let definitions = match &mut value {
        Value::Object(map) => {
            map.remove("$schema");
            map.remove("definitions")
        }
        _ => None,
    };

    if let Some(defs) = definitions {
        inline_refs(&mut value, &defs);
    }
    flatten_all_of(&mut value);
    fix_object_schemas(&mut value);

    value
}

/// Replace `{"$ref": "#/definitions/X"}` with the definition of `X`
fn inline_refs(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();

            if let Some(mut inlined) = target {
                inline_refs(&mut inlined, definitions);
                map.remove("$ref");
                if let Value::Object(def_map) = inlined {
                    for (k, v) in def_map {
                        map.entry(k).or_insert(v);
                    }
                }
                return;
            }
            for (_, v) in map.iter_mut() {
                inline_refs(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}

/// Merge `{"allOf": [schema], ...}` into its parent
fn flatten_all_of(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let single = matches!(map.get("allOf"), Some(Value::Array(a)) if a.len() == 1);
            if single {
                if let Some(Value::Array(mut parts)) = map.remove("allOf") {
                    if let Some(Value::Object(inner)) = parts.pop() {
                        for (k, v) in inner {
                            map.entry(k).or_insert(v);
                        }
                    }
                }
            }
            for (_, v) in map.iter_mut() {
                flatten_all_of(v);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_all_of(item);
            }
        }
        _ => {}
    }
}

/// Close every object schema and require all of its properties
fn fix_object_schemas(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type") == Some(&Value::String("object".to_string())) {
                map.insert("additionalProperties".to_string(), Value::Bool(false));

                if let Some(Value::Object(props)) = map.get("properties") {
                    let all_keys: Vec<Value> =
                        props.keys().map(|k| Value::String(k.clone())).collect();
                    map.insert("required".to_string(), Value::Array(all_keys));
                }
            }
            for (_, v) in map.iter_mut() {
                fix_object_schemas(v);
            }
        }
        Value::Array(items) => {
            for item in items {
                fix_object_schemas(item);
            }
        }
        _ => {}
    }
}

/// Validate a service response and return its relations in order.
///
/// Any deviation from the schema fails the whole payload; a single bad
/// relation is never dropped on its own.
pub fn validate_payload(value: Value) -> Result<Vec<PoliticalRelation>> {
    let payload: RelationsPayload = serde_json::from_value(value)
        .map_err(|e| DynastyError::SchemaValidation(e.to_string()))?;

    if let Some(pos) = payload
        .relations
        .iter()
        .position(|r| r.relative_name.trim().is_empty())
    {
        return Err(DynastyError::SchemaValidation(format!(
            "relations[{pos}].relative_name is empty"
        )));
    }

    Ok(payload.relations)
}
