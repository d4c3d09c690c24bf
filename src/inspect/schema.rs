//! JSON-schema derivation
//!
//! Parameter hints map to JSON types; parameters without defaults are
//! required; optionals become `anyOf` with a null branch; literals become
//! `enum`. The object schema closes `additionalProperties` unless the
//! function accepts arbitrary keywords, and an MCP tool definition is
//! derived from the schema plus the doc summary.

use crate::function::{FunctionSpec, TypeHint};
use serde_json::{json, Map, Value};

/// Schema for one type hint
pub fn type_schema(hint: &TypeHint) -> Value {
    match hint {
        TypeHint::Any => json!({}),
        TypeHint::Null => json!({"type": "null"}),
        TypeHint::Boolean => json!({"type": "boolean"}),
        TypeHint::Integer => json!({"type": "integer"}),
        TypeHint::Number => json!({"type": "number"}),
        TypeHint::String => json!({"type": "string"}),
        TypeHint::Array(inner) => json!({"type": "array", "items": type_schema(inner)}),
        TypeHint::Object(inner) => {
            json!({"type": "object", "additionalProperties": type_schema(inner)})
        }
        TypeHint::Optional(inner) => {
            json!({"anyOf": [type_schema(inner), {"type": "null"}]})
        }
        TypeHint::Union(members) => {
            let branches: Vec<Value> = members.iter().map(type_schema).collect();
            json!({"anyOf": branches})
        }
        TypeHint::Literal(values) => json!({"enum": values}),
    }
}

/// Object schema over the declared parameters
pub fn object_schema(spec: &FunctionSpec) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &spec.params {
        let mut schema = type_schema(&param.hint);
        if let Some(default) = &param.default {
            if let Some(obj) = schema.as_object_mut() {
                obj.insert("default".to_string(), default.clone());
            }
        }
        if let (Some(doc), Some(obj)) = (&param.doc, schema.as_object_mut()) {
            obj.insert("description".to_string(), Value::String(doc.clone()));
        }
        if param.required() {
            required.push(Value::String(param.name.clone()));
        }
        properties.insert(param.name.clone(), schema);
    }

    let additional = spec.flags.has_kwargs;
    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }
    schema.insert("additionalProperties".to_string(), json!(additional));
    Value::Object(schema)
}

/// Schema for the declared return hint
pub fn return_schema(spec: &FunctionSpec) -> Value {
    type_schema(&spec.returns)
}

/// MCP tool definition derived from signature + doc summary
pub fn mcp_tool(spec: &FunctionSpec) -> Value {
    json!({
        "name": spec.identity.qualified_name,
        "description": spec.summary().unwrap_or_default(),
        "inputSchema": object_schema(spec),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::ParamSpec;

    fn spec() -> FunctionSpec {
        FunctionSpec::new("demo", "f", |_| Ok(json!(true)))
            .param(ParamSpec::new("x", TypeHint::Integer))
            .param(ParamSpec::new("y", TypeHint::String).with_default(json!("z")))
            .returns(TypeHint::Boolean)
            .doc("Check a value.")
    }

    #[test]
    fn test_object_schema_shape() {
        let schema = object_schema(&spec());
        assert_eq!(
            schema,
            json!({
                "type": "object",
                "properties": {
                    "x": {"type": "integer"},
                    "y": {"type": "string", "default": "z"},
                },
                "required": ["x"],
                "additionalProperties": false,
            })
        );
    }

    #[test]
    fn test_mcp_tool_shape() {
        let tool = mcp_tool(&spec());
        assert_eq!(tool["name"], "f");
        assert_eq!(tool["description"], "Check a value.");
        assert_eq!(tool["inputSchema"], object_schema(&spec()));
    }

    #[test]
    fn test_optional_becomes_anyof_with_null() {
        let schema = type_schema(&TypeHint::optional(TypeHint::Integer));
        assert_eq!(schema, json!({"anyOf": [{"type": "integer"}, {"type": "null"}]}));
    }

    #[test]
    fn test_union_and_literal() {
        let union = type_schema(&TypeHint::Union(vec![TypeHint::Integer, TypeHint::Null]));
        assert_eq!(union, json!({"anyOf": [{"type": "integer"}, {"type": "null"}]}));
        let literal = type_schema(&TypeHint::Literal(vec![json!("a"), json!("b")]));
        assert_eq!(literal, json!({"enum": ["a", "b"]}));
    }

    #[test]
    fn test_nested_generics_recurse() {
        let hint = TypeHint::array(TypeHint::optional(TypeHint::String));
        assert_eq!(
            type_schema(&hint),
            json!({
                "type": "array",
                "items": {"anyOf": [{"type": "string"}, {"type": "null"}]},
            })
        );
    }

    #[test]
    fn test_kwargs_open_additional_properties() {
        let mut open = spec();
        open.flags.has_kwargs = true;
        let schema = object_schema(&open);
        assert_eq!(schema["additionalProperties"], json!(true));
    }

    #[test]
    fn test_return_schema() {
        assert_eq!(return_schema(&spec()), json!({"type": "boolean"}));
    }
}
