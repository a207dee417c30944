//! JSON Schema model for tool inputs and elicitation payloads.
//!
//! A sum type rather than an opaque `Value`: argument coercion walks
//! the variants, and the same model round-trips to the wire for
//! `tools/list`. Recursive schemas go through a [`SchemaArena`] so a
//! property can reference another schema by name instead of by owned
//! value.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// A JSON Schema fragment.
///
/// Round-trip law: decode-then-encode preserves the schema up to
/// property order canonicalization and omission of absent optionals.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonSchema {
    /// `{"type": "string", ...}`
    String {
        /// Display title
        title: Option<String>,
        /// Description
        description: Option<String>,
        /// Format hint (`uri`, `date-time`, ...)
        format: Option<String>,
        /// Minimum length
        min_length: Option<u64>,
        /// Maximum length
        max_length: Option<u64>,
        /// Default value
        default: Option<String>,
    },
    /// `{"type": "number" | "integer", ...}`
    Number {
        /// True for `integer`, false for `number`
        integer: bool,
        /// Display title
        title: Option<String>,
        /// Description
        description: Option<String>,
        /// Inclusive minimum
        minimum: Option<f64>,
        /// Inclusive maximum
        maximum: Option<f64>,
        /// Default value
        default: Option<f64>,
    },
    /// `{"type": "boolean", ...}`
    Boolean {
        /// Display title
        title: Option<String>,
        /// Description
        description: Option<String>,
        /// Default value
        default: Option<bool>,
    },
    /// `{"type": "array", "items": ...}`
    Array {
        /// Element schema
        items: Box<JsonSchema>,
        /// Display title
        title: Option<String>,
        /// Description
        description: Option<String>,
        /// Default value
        default: Option<Value>,
    },
    /// `{"type": "object", "properties": ..., "required": [...]}`
    Object {
        /// Property schemas, insertion-ordered
        properties: Vec<(String, JsonSchema)>,
        /// Required property names
        required: Vec<String>,
        /// Description
        description: Option<String>,
    },
    /// `{"enum": [...]}`
    Enum {
        /// Allowed string values
        values: Vec<String>,
        /// Display title
        title: Option<String>,
        /// Description
        description: Option<String>,
        /// Default value
        default: Option<String>,
    },
    /// `{"oneOf": [...]}`
    OneOf {
        /// Alternative schemas
        options: Vec<JsonSchema>,
    },
    /// `{"$ref": "#/$defs/<name>"}` - resolved through a [`SchemaArena`]
    Ref(String),
}

impl JsonSchema {
    /// An object schema with no properties.
    pub fn empty_object() -> Self {
        Self::Object {
            properties: Vec::new(),
            required: Vec::new(),
            description: None,
        }
    }

    /// A plain string schema.
    pub fn string() -> Self {
        Self::String {
            title: None,
            description: None,
            format: None,
            min_length: None,
            max_length: None,
            default: None,
        }
    }

    /// A plain integer schema.
    pub fn integer() -> Self {
        Self::Number {
            integer: true,
            title: None,
            description: None,
            minimum: None,
            maximum: None,
            default: None,
        }
    }

    /// A plain number schema.
    pub fn number() -> Self {
        Self::Number {
            integer: false,
            title: None,
            description: None,
            minimum: None,
            maximum: None,
            default: None,
        }
    }

    /// A plain boolean schema.
    pub fn boolean() -> Self {
        Self::Boolean {
            title: None,
            description: None,
            default: None,
        }
    }

    /// The wire name of this schema's shape, used in error messages
    /// (`Int`, `Double`, `String`, ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String { .. } => "String",
            Self::Number { integer: true, .. } => "Int",
            Self::Number { integer: false, .. } => "Double",
            Self::Boolean { .. } => "Bool",
            Self::Array { .. } => "Array",
            Self::Object { .. } => "Object",
            Self::Enum { .. } => "Enum",
            Self::OneOf { .. } => "OneOf",
            Self::Ref(_) => "Ref",
        }
    }

    /// The declared default for this schema, as a JSON value.
    pub fn default_value(&self) -> Option<Value> {
        match self {
            Self::String { default, .. } => default.as_ref().map(|s| json!(s)),
            Self::Number { default, .. } => default.as_ref().map(|n| json!(n)),
            Self::Boolean { default, .. } => default.as_ref().map(|b| json!(b)),
            Self::Array { default, .. } => default.clone(),
            Self::Enum { default, .. } => default.as_ref().map(|s| json!(s)),
            _ => None,
        }
    }

    /// Structural validation of a JSON value against this schema.
    ///
    /// Returns the first violation found, as a human-readable path +
    /// message. `Ref` schemas validate through `arena` when provided.
    pub fn validate(&self, value: &Value, arena: Option<&SchemaArena>) -> Result<(), String> {
        match self {
            Self::String { min_length, max_length, .. } => {
                let s = value.as_str().ok_or_else(|| format!("expected string, got {value}"))?;
                if let Some(min) = min_length
                    && (s.chars().count() as u64) < *min
                {
                    return Err(format!("string shorter than minLength {min}"));
                }
                if let Some(max) = max_length
                    && (s.chars().count() as u64) > *max
                {
                    return Err(format!("string longer than maxLength {max}"));
                }
                Ok(())
            }
            Self::Number { integer, minimum, maximum, .. } => {
                let n = value.as_f64().ok_or_else(|| format!("expected number, got {value}"))?;
                if *integer && value.as_i64().is_none() {
                    return Err(format!("expected integer, got {value}"));
                }
                if let Some(min) = minimum
                    && n < *min
                {
                    return Err(format!("{n} below minimum {min}"));
                }
                if let Some(max) = maximum
                    && n > *max
                {
                    return Err(format!("{n} above maximum {max}"));
                }
                Ok(())
            }
            Self::Boolean { .. } => value
                .as_bool()
                .map(|_| ())
                .ok_or_else(|| format!("expected boolean, got {value}")),
            Self::Array { items, .. } => {
                let arr = value.as_array().ok_or_else(|| format!("expected array, got {value}"))?;
                for (i, element) in arr.iter().enumerate() {
                    items
                        .validate(element, arena)
                        .map_err(|e| format!("[{i}]: {e}"))?;
                }
                Ok(())
            }
            Self::Object { properties, required, .. } => {
                let obj = value
                    .as_object()
                    .ok_or_else(|| format!("expected object, got {value}"))?;
                for name in required {
                    if !obj.contains_key(name) {
                        return Err(format!("missing required property '{name}'"));
                    }
                }
                for (name, schema) in properties {
                    if let Some(v) = obj.get(name) {
                        schema.validate(v, arena).map_err(|e| format!("{name}: {e}"))?;
                    }
                }
                Ok(())
            }
            Self::Enum { values, .. } => {
                let s = value.as_str().ok_or_else(|| format!("expected enum string, got {value}"))?;
                if values.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(format!("'{s}' is not one of {values:?}"))
                }
            }
            Self::OneOf { options } => {
                for option in options {
                    if option.validate(value, arena).is_ok() {
                        return Ok(());
                    }
                }
                Err(format!("{value} matches no oneOf alternative"))
            }
            Self::Ref(name) => match arena.and_then(|a| a.get(name)) {
                Some(schema) => schema.validate(value, arena),
                None => Err(format!("unresolved schema reference '{name}'")),
            },
        }
    }
}

impl Serialize for JsonSchema {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JsonSchema {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(D::Error::custom)
    }
}

impl JsonSchema {
    /// Encode as a wire JSON value.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        match self {
            Self::String { title, description, format, min_length, max_length, default } => {
                map.insert("type".into(), json!("string"));
                insert_opt(&mut map, "title", title.as_ref().map(|v| json!(v)));
                insert_opt(&mut map, "description", description.as_ref().map(|v| json!(v)));
                insert_opt(&mut map, "format", format.as_ref().map(|v| json!(v)));
                insert_opt(&mut map, "minLength", min_length.map(|v| json!(v)));
                insert_opt(&mut map, "maxLength", max_length.map(|v| json!(v)));
                insert_opt(&mut map, "default", default.as_ref().map(|v| json!(v)));
            }
            Self::Number { integer, title, description, minimum, maximum, default } => {
                map.insert("type".into(), json!(if *integer { "integer" } else { "number" }));
                insert_opt(&mut map, "title", title.as_ref().map(|v| json!(v)));
                insert_opt(&mut map, "description", description.as_ref().map(|v| json!(v)));
                insert_opt(&mut map, "minimum", minimum.map(|v| json!(v)));
                insert_opt(&mut map, "maximum", maximum.map(|v| json!(v)));
                insert_opt(&mut map, "default", default.map(|v| json!(v)));
            }
            Self::Boolean { title, description, default } => {
                map.insert("type".into(), json!("boolean"));
                insert_opt(&mut map, "title", title.as_ref().map(|v| json!(v)));
                insert_opt(&mut map, "description", description.as_ref().map(|v| json!(v)));
                insert_opt(&mut map, "default", default.map(|v| json!(v)));
            }
            Self::Array { items, title, description, default } => {
                map.insert("type".into(), json!("array"));
                map.insert("items".into(), items.to_json());
                insert_opt(&mut map, "title", title.as_ref().map(|v| json!(v)));
                insert_opt(&mut map, "description", description.as_ref().map(|v| json!(v)));
                insert_opt(&mut map, "default", default.clone());
            }
            Self::Object { properties, required, description } => {
                map.insert("type".into(), json!("object"));
                let mut props = Map::new();
                for (name, schema) in properties {
                    props.insert(name.clone(), schema.to_json());
                }
                map.insert("properties".into(), Value::Object(props));
                if !required.is_empty() {
                    map.insert("required".into(), json!(required));
                }
                insert_opt(&mut map, "description", description.as_ref().map(|v| json!(v)));
            }
            Self::Enum { values, title, description, default } => {
                map.insert("enum".into(), json!(values));
                insert_opt(&mut map, "title", title.as_ref().map(|v| json!(v)));
                insert_opt(&mut map, "description", description.as_ref().map(|v| json!(v)));
                insert_opt(&mut map, "default", default.as_ref().map(|v| json!(v)));
            }
            Self::OneOf { options } => {
                map.insert(
                    "oneOf".into(),
                    Value::Array(options.iter().map(Self::to_json).collect()),
                );
            }
            Self::Ref(name) => {
                map.insert("$ref".into(), json!(format!("#/$defs/{name}")));
            }
        }
        Value::Object(map)
    }

    /// Decode from a wire JSON value.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        let obj = value.as_object().ok_or_else(|| format!("schema must be an object, got {value}"))?;

        if let Some(reference) = obj.get("$ref") {
            let path = reference.as_str().ok_or("$ref must be a string")?;
            let name = path.rsplit('/').next().unwrap_or(path);
            return Ok(Self::Ref(name.to_string()));
        }
        if let Some(options) = obj.get("oneOf") {
            let options = options.as_array().ok_or("oneOf must be an array")?;
            return Ok(Self::OneOf {
                options: options.iter().map(Self::from_json).collect::<Result<_, _>>()?,
            });
        }
        if let Some(values) = obj.get("enum") {
            let values = values
                .as_array()
                .ok_or("enum must be an array")?
                .iter()
                .map(|v| v.as_str().map(String::from).ok_or("enum values must be strings"))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Enum {
                values,
                title: opt_string(obj, "title"),
                description: opt_string(obj, "description"),
                default: opt_string(obj, "default"),
            });
        }

        match obj.get("type").and_then(Value::as_str) {
            Some("string") => Ok(Self::String {
                title: opt_string(obj, "title"),
                description: opt_string(obj, "description"),
                format: opt_string(obj, "format"),
                min_length: obj.get("minLength").and_then(Value::as_u64),
                max_length: obj.get("maxLength").and_then(Value::as_u64),
                default: opt_string(obj, "default"),
            }),
            Some(t @ ("number" | "integer")) => Ok(Self::Number {
                integer: t == "integer",
                title: opt_string(obj, "title"),
                description: opt_string(obj, "description"),
                minimum: obj.get("minimum").and_then(Value::as_f64),
                maximum: obj.get("maximum").and_then(Value::as_f64),
                default: obj.get("default").and_then(Value::as_f64),
            }),
            Some("boolean") => Ok(Self::Boolean {
                title: opt_string(obj, "title"),
                description: opt_string(obj, "description"),
                default: obj.get("default").and_then(Value::as_bool),
            }),
            Some("array") => {
                let items = obj.get("items").ok_or("array schema requires items")?;
                Ok(Self::Array {
                    items: Box::new(Self::from_json(items)?),
                    title: opt_string(obj, "title"),
                    description: opt_string(obj, "description"),
                    default: obj.get("default").cloned(),
                })
            }
            Some("object") => {
                let mut properties = Vec::new();
                if let Some(props) = obj.get("properties").and_then(Value::as_object) {
                    for (name, schema) in props {
                        properties.push((name.clone(), Self::from_json(schema)?));
                    }
                }
                let required = obj
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Self::Object {
                    properties,
                    required,
                    description: opt_string(obj, "description"),
                })
            }
            Some(other) => Err(format!("unsupported schema type '{other}'")),
            None => Err("schema has no type, enum, oneOf or $ref".to_string()),
        }
    }
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(v) = value {
        map.insert(key.to_string(), v);
    }
}

fn opt_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(String::from)
}

/// Named schema slots for recursive types.
///
/// An object property can be a [`JsonSchema::Ref`] naming another slot
/// instead of owning the schema, which breaks reference cycles.
#[derive(Debug, Clone, Default)]
pub struct SchemaArena {
    slots: HashMap<String, JsonSchema>,
}

impl SchemaArena {
    /// An empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a named schema.
    pub fn insert(&mut self, name: impl Into<String>, schema: JsonSchema) {
        self.slots.insert(name.into(), schema);
    }

    /// Look up a schema by name.
    pub fn get(&self, name: &str) -> Option<&JsonSchema> {
        self.slots.get(name)
    }

    /// Resolve a schema, following one level of `Ref` indirection.
    pub fn resolve<'a>(&'a self, schema: &'a JsonSchema) -> Option<&'a JsonSchema> {
        match schema {
            JsonSchema::Ref(name) => self.get(name),
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn calculator_schema() -> JsonSchema {
        JsonSchema::Object {
            properties: vec![
                ("a".to_string(), JsonSchema::integer()),
                ("b".to_string(), JsonSchema::integer()),
            ],
            required: vec!["a".to_string(), "b".to_string()],
            description: Some("Two addends".to_string()),
        }
    }

    #[test]
    fn object_schema_round_trips() {
        let schema = calculator_schema();
        let encoded = schema.to_json();
        assert_eq!(encoded["type"], json!("object"));
        assert_eq!(encoded["properties"]["a"]["type"], json!("integer"));
        assert_eq!(encoded["required"], json!(["a", "b"]));
        let decoded = JsonSchema::from_json(&encoded).unwrap();
        assert_eq!(decoded, schema);
    }

    #[test]
    fn enum_schema_round_trips() {
        let schema = JsonSchema::Enum {
            values: vec!["celsius".into(), "fahrenheit".into()],
            title: None,
            description: None,
            default: Some("celsius".into()),
        };
        let decoded = JsonSchema::from_json(&schema.to_json()).unwrap();
        assert_eq!(decoded, schema);
    }

    #[test]
    fn one_of_round_trips() {
        let schema = JsonSchema::OneOf {
            options: vec![JsonSchema::string(), JsonSchema::number()],
        };
        let decoded = JsonSchema::from_json(&schema.to_json()).unwrap();
        assert_eq!(decoded, schema);
    }

    #[test]
    fn absent_optionals_are_omitted() {
        let encoded = JsonSchema::string().to_json();
        assert_eq!(encoded, json!({"type": "string"}));
    }

    #[test]
    fn validates_structure() {
        let schema = calculator_schema();
        assert!(schema.validate(&json!({"a": 1, "b": 2}), None).is_ok());
        assert!(schema.validate(&json!({"a": 1}), None).is_err());
        assert!(schema.validate(&json!({"a": "x", "b": 2}), None).is_err());
        assert!(schema.validate(&json!({"a": 1.5, "b": 2}), None).is_err());
    }

    #[test]
    fn refs_resolve_through_arena() {
        let mut arena = SchemaArena::new();
        arena.insert(
            "node",
            JsonSchema::Object {
                properties: vec![
                    ("value".to_string(), JsonSchema::string()),
                    (
                        "children".to_string(),
                        JsonSchema::Array {
                            items: Box::new(JsonSchema::Ref("node".to_string())),
                            title: None,
                            description: None,
                            default: None,
                        },
                    ),
                ],
                required: vec!["value".to_string()],
                description: None,
            },
        );

        let root = JsonSchema::Ref("node".to_string());
        let value = json!({"value": "a", "children": [{"value": "b", "children": []}]});
        assert!(root.validate(&value, Some(&arena)).is_ok());
        assert!(root.validate(&json!({"children": []}), Some(&arena)).is_err());
    }

    #[test]
    fn ref_encodes_as_json_pointer() {
        let schema = JsonSchema::Ref("node".to_string());
        assert_eq!(schema.to_json(), json!({"$ref": "#/$defs/node"}));
        assert_eq!(JsonSchema::from_json(&schema.to_json()).unwrap(), schema);
    }
}
