//! JSON Schema to Gemini schema translation
//!
//! Gemini accepts an OpenAPI subset: no `$ref`, no `anyOf` unions, a single
//! type per node. Tool input schemas and structured-output schemas are
//! narrowed to that subset here.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::LlmError;
use crate::protocol::google::{GoogleSchema, GoogleSchemaType};

/// Nesting limit guarding against reference cycles
const MAX_DEPTH: usize = 32;

/// Translate a complete schema document
///
/// Returns `Ok(None)` for an absent or empty schema, meaning "no constraint".
pub fn to_google_schema(schema: &Value) -> Result<Option<GoogleSchema>, LlmError> {
    translate(schema, schema, 0)
}

fn translate(root: &Value, current: &Value, depth: usize) -> Result<Option<GoogleSchema>, LlmError> {
    let Some(node) = current.as_object().filter(|node| !node.is_empty()) else {
        return Ok(None);
    };
    if depth > MAX_DEPTH {
        return Err(LlmError::Schema(format!(
            "schema nesting exceeds {MAX_DEPTH} levels (recursive $ref?)"
        )));
    }

    if let Some(reference) = node.get("$ref").and_then(Value::as_str) {
        let target = resolve_ref(root, reference)?;
        return translate(root, target, depth + 1);
    }

    if let Some(branches) = node.get("anyOf").and_then(Value::as_array)
        && let Some(branch) = branches.iter().find(|branch| !is_null_branch(branch))
    {
        let mut narrowed = translate(root, branch, depth + 1)?.unwrap_or_default();
        if let Some(title) = node.get("title").and_then(Value::as_str) {
            narrowed.title = Some(title.to_owned());
        }
        if let Some(description) = node.get("description").and_then(Value::as_str) {
            narrowed.description = Some(description.to_owned());
        }
        if branches.iter().any(is_null_branch) {
            narrowed.nullable = Some(true);
        }
        return Ok(Some(narrowed));
    }

    let mut schema = GoogleSchema::default();

    match node.get("type") {
        Some(Value::String(name)) => schema.schema_type = Some(schema_type(name)?),
        Some(Value::Array(names)) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            if let Some(name) = names.iter().find(|name| **name != "null") {
                schema.schema_type = Some(schema_type(name)?);
            }
            if names.contains(&"null") {
                schema.nullable = Some(true);
            }
        }
        _ => {}
    }

    copy_annotations(node, &mut schema);

    if let Some(items) = node.get("items") {
        schema.items = translate(root, items, depth + 1)?.map(Box::new);
    }

    if let Some(properties) = node.get("properties").and_then(Value::as_object) {
        let mut translated = IndexMap::with_capacity(properties.len());
        for (name, property) in properties {
            let property = translate(root, property, depth + 1)?.unwrap_or_default();
            translated.insert(name.clone(), property);
        }
        schema.properties = Some(translated);
    }

    Ok(Some(schema))
}

/// Look up `#/$defs/Name` or `#/definitions/Name` in the root document
fn resolve_ref<'a>(root: &'a Value, reference: &str) -> Result<&'a Value, LlmError> {
    let name = reference
        .strip_prefix("#/$defs/")
        .map(|name| ("$defs", name))
        .or_else(|| reference.strip_prefix("#/definitions/").map(|name| ("definitions", name)));

    let Some((section, name)) = name else {
        return Err(LlmError::Schema(format!("unsupported $ref `{reference}`")));
    };

    root.get(section)
        .and_then(|defs| defs.get(name))
        .ok_or_else(|| LlmError::Schema(format!("unresolved $ref `{reference}`")))
}

fn is_null_branch(branch: &Value) -> bool {
    branch.get("type").and_then(Value::as_str) == Some("null")
}

fn schema_type(name: &str) -> Result<GoogleSchemaType, LlmError> {
    match name {
        "string" => Ok(GoogleSchemaType::String),
        "number" | "float64" => Ok(GoogleSchemaType::Number),
        "integer" => Ok(GoogleSchemaType::Integer),
        "boolean" => Ok(GoogleSchemaType::Boolean),
        "object" => Ok(GoogleSchemaType::Object),
        "array" => Ok(GoogleSchemaType::Array),
        other => Err(LlmError::Schema(format!("schema type `{other}` is not supported"))),
    }
}

/// Copy optional refinements, skipping values that do not coerce
fn copy_annotations(node: &Map<String, Value>, schema: &mut GoogleSchema) {
    let string = |key: &str| node.get(key).and_then(Value::as_str).map(str::to_owned);

    schema.title = string("title");
    schema.description = string("description");
    schema.format = string("format");
    schema.required = node.get("required").and_then(string_list);
    schema.property_ordering = node.get("propertyOrdering").and_then(string_list);
    schema.enum_values = node.get("enum").and_then(string_list);
    schema.min_items = node.get("minItems").and_then(coerce_i64);
    schema.max_items = node.get("maxItems").and_then(coerce_i64);
    schema.minimum = node.get("minimum").and_then(coerce_f64);
    schema.maximum = node.get("maximum").and_then(coerce_f64);
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect(),
    )
}

#[allow(clippy::cast_possible_truncation)]
fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
