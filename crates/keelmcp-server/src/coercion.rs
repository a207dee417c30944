//! Schema-driven argument coercion.
//!
//! Converts the raw `arguments` object of a `tools/call` into the
//! canonical shape the handler sees. Rules, applied in order per
//! parameter:
//!
//! 1. missing required without default -> `MissingRequired`
//! 2. missing optional -> declared default, else JSON `null`
//! 3. enum: case label must match exactly
//! 4. number from string: best-effort parse
//! 5. `format: uri` strings must parse as URLs
//! 6. nested objects recurse per sub-schema
//! 7. arrays coerce element-wise, order preserved

use serde_json::{Map, Value, json};

use keelmcp_protocol::ToolError;
use keelmcp_protocol::schema::JsonSchema;

/// Human name of a JSON value's type, for error messages.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(n) if n.as_i64().is_some() => "Int",
        Value::Number(_) => "Double",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

fn type_error(parameter: &str, schema: &JsonSchema, actual: &Value) -> ToolError {
    ToolError::InvalidArgumentType {
        parameter: parameter.to_string(),
        expected: schema.type_name().to_string(),
        actual: json_type_name(actual).to_string(),
    }
}

/// Coerce a `tools/call` arguments object against the tool's object
/// schema, producing the canonical argument object.
pub fn coerce_arguments(schema: &JsonSchema, args: &Map<String, Value>) -> Result<Value, ToolError> {
    let JsonSchema::Object { properties, required, .. } = schema else {
        // A tool schema is always an object; anything else passes the
        // arguments through untouched.
        return Ok(Value::Object(args.clone()));
    };

    let mut coerced = Map::new();
    for (name, property) in properties {
        match args.get(name) {
            Some(value) => {
                coerced.insert(name.clone(), coerce_value(name, property, value)?);
            }
            None if required.contains(name) => {
                if let Some(default) = property.default_value() {
                    coerced.insert(name.clone(), default);
                } else {
                    return Err(ToolError::MissingRequired {
                        parameter: name.clone(),
                    });
                }
            }
            None => {
                coerced.insert(name.clone(), property.default_value().unwrap_or(Value::Null));
            }
        }
    }
    Ok(Value::Object(coerced))
}

/// Coerce one value against one schema.
pub fn coerce_value(parameter: &str, schema: &JsonSchema, value: &Value) -> Result<Value, ToolError> {
    match schema {
        JsonSchema::String { format, .. } => {
            let s = value
                .as_str()
                .ok_or_else(|| type_error(parameter, schema, value))?;
            if format.as_deref() == Some("uri") && url::Url::parse(s).is_err() {
                return Err(ToolError::InvalidArgumentType {
                    parameter: parameter.to_string(),
                    expected: "URL".to_string(),
                    actual: format!("'{s}'"),
                });
            }
            Ok(json!(s))
        }
        JsonSchema::Number { integer, .. } => match value {
            Value::Number(n) => {
                if *integer {
                    n.as_i64()
                        .map(|i| json!(i))
                        .ok_or_else(|| type_error(parameter, schema, value))
                } else {
                    Ok(value.clone())
                }
            }
            // Rule 4: best-effort parse of numeric strings.
            Value::String(s) => {
                if *integer {
                    s.parse::<i64>()
                        .map(|i| json!(i))
                        .map_err(|_| type_error(parameter, schema, value))
                } else {
                    s.parse::<f64>()
                        .map(|f| json!(f))
                        .map_err(|_| type_error(parameter, schema, value))
                }
            }
            other => Err(type_error(parameter, schema, other)),
        },
        JsonSchema::Boolean { .. } => value
            .as_bool()
            .map(|b| json!(b))
            .ok_or_else(|| type_error(parameter, schema, value)),
        JsonSchema::Enum { values, .. } => {
            let s = value
                .as_str()
                .ok_or_else(|| type_error(parameter, schema, value))?;
            // Case labels are case-sensitive; no fuzzy matching.
            if values.iter().any(|v| v == s) {
                Ok(json!(s))
            } else {
                Err(ToolError::InvalidEnumValue {
                    parameter: parameter.to_string(),
                    allowed: values.clone(),
                    actual: s.to_string(),
                })
            }
        }
        JsonSchema::Array { items, .. } => {
            let arr = value
                .as_array()
                .ok_or_else(|| type_error(parameter, schema, value))?;
            let coerced = arr
                .iter()
                .map(|element| coerce_value(parameter, items, element))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(coerced))
        }
        JsonSchema::Object { .. } => {
            let obj = value
                .as_object()
                .ok_or_else(|| type_error(parameter, schema, value))?;
            coerce_arguments(schema, obj)
        }
        JsonSchema::OneOf { options } => {
            for option in options {
                if let Ok(coerced) = coerce_value(parameter, option, value) {
                    return Ok(coerced);
                }
            }
            Err(type_error(parameter, schema, value))
        }
        // Unresolvable here; the caller flattens refs before coercion.
        JsonSchema::Ref(_) => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn add_schema() -> JsonSchema {
        JsonSchema::Object {
            properties: vec![
                ("a".to_string(), JsonSchema::integer()),
                ("b".to_string(), JsonSchema::integer()),
            ],
            required: vec!["a".to_string(), "b".to_string()],
            description: None,
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn valid_arguments_pass_through() {
        let coerced = coerce_arguments(&add_schema(), &args(json!({"a": 2, "b": 3}))).unwrap();
        assert_eq!(coerced, json!({"a": 2, "b": 3}));
    }

    #[test]
    fn missing_required_is_reported_with_parameter() {
        let err = coerce_arguments(&add_schema(), &args(json!({"a": 2}))).unwrap_err();
        match err {
            ToolError::MissingRequired { parameter } => assert_eq!(parameter, "b"),
            other => panic!("expected MissingRequired, got {other}"),
        }
    }

    #[test]
    fn wrong_type_names_the_expected_type() {
        let err = coerce_arguments(&add_schema(), &args(json!({"a": "x", "b": 3}))).unwrap_err();
        assert!(err.is_invalid_params());
        assert!(err.to_string().contains("expected type Int"), "message: {err}");
    }

    #[test]
    fn numeric_strings_parse_best_effort() {
        let coerced = coerce_arguments(&add_schema(), &args(json!({"a": "2", "b": 3}))).unwrap();
        assert_eq!(coerced, json!({"a": 2, "b": 3}));
    }

    #[test]
    fn missing_optional_becomes_default_or_null() {
        let schema = JsonSchema::Object {
            properties: vec![
                (
                    "unit".to_string(),
                    JsonSchema::Enum {
                        values: vec!["celsius".into(), "fahrenheit".into()],
                        title: None,
                        description: None,
                        default: Some("celsius".into()),
                    },
                ),
                ("note".to_string(), JsonSchema::string()),
            ],
            required: vec![],
            description: None,
        };
        let coerced = coerce_arguments(&schema, &Map::new()).unwrap();
        assert_eq!(coerced, json!({"unit": "celsius", "note": null}));
    }

    #[test]
    fn enum_labels_are_case_sensitive() {
        let schema = JsonSchema::Object {
            properties: vec![(
                "unit".to_string(),
                JsonSchema::Enum {
                    values: vec!["celsius".into()],
                    title: None,
                    description: None,
                    default: None,
                },
            )],
            required: vec!["unit".to_string()],
            description: None,
        };
        assert!(coerce_arguments(&schema, &args(json!({"unit": "celsius"}))).is_ok());

        let err = coerce_arguments(&schema, &args(json!({"unit": "Celsius"}))).unwrap_err();
        match err {
            ToolError::InvalidEnumValue { allowed, actual, .. } => {
                assert_eq!(allowed, vec!["celsius".to_string()]);
                assert_eq!(actual, "Celsius");
            }
            other => panic!("expected InvalidEnumValue, got {other}"),
        }
    }

    #[test]
    fn url_format_is_validated() {
        let schema = JsonSchema::Object {
            properties: vec![(
                "endpoint".to_string(),
                JsonSchema::String {
                    title: None,
                    description: None,
                    format: Some("uri".into()),
                    min_length: None,
                    max_length: None,
                    default: None,
                },
            )],
            required: vec!["endpoint".to_string()],
            description: None,
        };
        assert!(coerce_arguments(&schema, &args(json!({"endpoint": "https://example.com"}))).is_ok());
        assert!(coerce_arguments(&schema, &args(json!({"endpoint": "not a url"}))).is_err());
    }

    #[test]
    fn nested_objects_and_arrays_recurse() {
        let schema = JsonSchema::Object {
            properties: vec![(
                "points".to_string(),
                JsonSchema::Array {
                    items: Box::new(JsonSchema::Object {
                        properties: vec![
                            ("x".to_string(), JsonSchema::number()),
                            ("y".to_string(), JsonSchema::number()),
                        ],
                        required: vec!["x".to_string(), "y".to_string()],
                        description: None,
                    }),
                    title: None,
                    description: None,
                    default: None,
                },
            )],
            required: vec!["points".to_string()],
            description: None,
        };

        let coerced = coerce_arguments(
            &schema,
            &args(json!({"points": [{"x": 1.0, "y": 2.0}, {"x": "3", "y": 4}]})),
        )
        .unwrap();
        assert_eq!(coerced["points"][1]["x"], json!(3.0));

        let err = coerce_arguments(&schema, &args(json!({"points": [{"x": 1.0}]}))).unwrap_err();
        assert!(matches!(err, ToolError::MissingRequired { .. }));
    }
}
