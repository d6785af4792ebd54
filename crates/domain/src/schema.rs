//! Typed parameter schemas.
//!
//! Tool providers declare their input shapes as JSON Schema documents. Those
//! arrive as untyped `serde_json::Value`s; this module parses them once into
//! a closed tagged-variant representation so validation never does unchecked
//! property access on raw JSON.
//!
//! Only the subset of JSON Schema that tool providers actually use is
//! modeled: the five primitive kinds plus the facets the validator enforces
//! (pattern, enum, numeric bounds, length/item bounds, required keys,
//! additionalProperties).

use std::collections::BTreeMap;

use serde_json::Value;

/// A parse failure for a declared tool schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("unsupported schema type: {0}")]
    UnsupportedType(String),

    #[error("schema is not an object")]
    NotAnObject,

    #[error("invalid facet {facet}: {message}")]
    InvalidFacet { facet: String, message: String },
}

/// A closed representation of one JSON Schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSchema {
    String {
        pattern: Option<String>,
        one_of: Option<Vec<String>>,
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    Number {
        minimum: Option<f64>,
        maximum: Option<f64>,
        integer: bool,
    },
    Boolean,
    Array {
        items: Option<Box<ParamSchema>>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    Object {
        properties: BTreeMap<String, ParamSchema>,
        required: Vec<String>,
        additional_properties: bool,
    },
}

impl ParamSchema {
    /// An object schema with no declared properties that accepts anything.
    /// Used when a provider omits the input schema entirely.
    pub fn open_object() -> Self {
        ParamSchema::Object {
            properties: BTreeMap::new(),
            required: Vec::new(),
            additional_properties: true,
        }
    }

    /// Parse a raw JSON Schema value into the typed representation.
    ///
    /// Missing `type` falls back on structure: a node with `properties` is an
    /// object, a node with `enum` is a string enum, anything else is an open
    /// object. Unknown `type` strings are an error (the provider declared
    /// something this validator cannot enforce).
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let obj = value.as_object().ok_or(SchemaError::NotAnObject)?;

        let declared = obj.get("type").and_then(|t| t.as_str());
        match declared {
            Some("string") => Ok(Self::parse_string(obj)),
            Some("number") => Self::parse_number(obj, false),
            Some("integer") => Self::parse_number(obj, true),
            Some("boolean") => Ok(ParamSchema::Boolean),
            Some("array") => Self::parse_array(obj),
            Some("object") => Self::parse_object(obj),
            Some(other) => Err(SchemaError::UnsupportedType(other.to_string())),
            None if obj.contains_key("properties") => Self::parse_object(obj),
            None if obj.contains_key("enum") => Ok(Self::parse_string(obj)),
            None => Ok(Self::open_object()),
        }
    }

    fn parse_string(obj: &serde_json::Map<String, Value>) -> Self {
        let one_of = obj.get("enum").and_then(|e| e.as_array()).map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        });
        ParamSchema::String {
            pattern: obj
                .get("pattern")
                .and_then(|p| p.as_str())
                .map(str::to_owned),
            one_of,
            min_length: obj.get("minLength").and_then(|v| v.as_u64()).map(|v| v as usize),
            max_length: obj.get("maxLength").and_then(|v| v.as_u64()).map(|v| v as usize),
        }
    }

    fn parse_number(
        obj: &serde_json::Map<String, Value>,
        integer: bool,
    ) -> Result<Self, SchemaError> {
        Ok(ParamSchema::Number {
            minimum: obj.get("minimum").and_then(Value::as_f64),
            maximum: obj.get("maximum").and_then(Value::as_f64),
            integer,
        })
    }

    fn parse_array(obj: &serde_json::Map<String, Value>) -> Result<Self, SchemaError> {
        let items = match obj.get("items") {
            Some(v) => Some(Box::new(Self::from_value(v)?)),
            None => None,
        };
        Ok(ParamSchema::Array {
            items,
            min_items: obj.get("minItems").and_then(|v| v.as_u64()).map(|v| v as usize),
            max_items: obj.get("maxItems").and_then(|v| v.as_u64()).map(|v| v as usize),
        })
    }

    fn parse_object(obj: &serde_json::Map<String, Value>) -> Result<Self, SchemaError> {
        let mut properties = BTreeMap::new();
        if let Some(props) = obj.get("properties").and_then(|p| p.as_object()) {
            for (key, prop) in props {
                properties.insert(key.clone(), Self::from_value(prop)?);
            }
        }

        let required = obj
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default();

        // JSON Schema defaults additionalProperties to true; tool schemas
        // that want closed objects must say so explicitly.
        let additional_properties = obj
            .get("additionalProperties")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        Ok(ParamSchema::Object {
            properties,
            required,
            additional_properties,
        })
    }

    /// A placeholder value for documentation examples.
    pub fn example_value(&self) -> String {
        match self {
            ParamSchema::String { one_of, .. } => one_of
                .as_ref()
                .and_then(|vals| vals.first().cloned())
                .unwrap_or_else(|| "value".into()),
            ParamSchema::Number { integer: true, .. } => "42".into(),
            ParamSchema::Number { .. } => "1.5".into(),
            ParamSchema::Boolean => "true".into(),
            ParamSchema::Array { .. } | ParamSchema::Object { .. } => String::new(),
        }
    }
}
