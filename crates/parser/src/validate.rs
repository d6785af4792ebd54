//! Parameter validation against a typed schema.
//!
//! Validation is permissive about representation and strict about meaning:
//! numeric strings satisfy numeric types, `"true"`/`"false"` satisfy
//! booleans, scalars satisfy strings — but bounds, patterns, enum
//! membership, required keys, and unknown keys are enforced exactly.
//!
//! On success the (possibly coerced) value is returned; the hub only ever
//! sees coerced parameters.

use serde_json::Value;

use sw_domain::schema::ParamSchema;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("missing required parameter '{0}'")]
    MissingRequired(String),

    #[error("unknown parameter '{0}'")]
    UnknownKey(String),

    #[error("parameter '{key}': expected {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("parameter '{key}': {message}")]
    OutOfBounds { key: String, message: String },

    #[error("parameter '{key}' does not match pattern '{pattern}'")]
    PatternMismatch { key: String, pattern: String },

    #[error("parameter '{key}' is not one of the allowed values")]
    NotInEnum { key: String },

    #[error("schema pattern '{pattern}' is invalid: {message}")]
    BadPattern { pattern: String, message: String },
}

/// Validate `value` against `schema`, returning the coerced value.
pub fn validate(schema: &ParamSchema, value: &Value) -> Result<Value, ValidationError> {
    validate_at(schema, value, "")
}

fn validate_at(schema: &ParamSchema, value: &Value, key: &str) -> Result<Value, ValidationError> {
    match schema {
        ParamSchema::String {
            pattern,
            one_of,
            min_length,
            max_length,
        } => {
            let text = coerce_string(value, key)?;
            if let Some(min) = min_length {
                if text.chars().count() < *min {
                    return Err(ValidationError::OutOfBounds {
                        key: key.to_owned(),
                        message: format!("shorter than minLength {min}"),
                    });
                }
            }
            if let Some(max) = max_length {
                if text.chars().count() > *max {
                    return Err(ValidationError::OutOfBounds {
                        key: key.to_owned(),
                        message: format!("longer than maxLength {max}"),
                    });
                }
            }
            if let Some(pattern) = pattern {
                let re = regex::Regex::new(pattern).map_err(|e| ValidationError::BadPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
                if !re.is_match(&text) {
                    return Err(ValidationError::PatternMismatch {
                        key: key.to_owned(),
                        pattern: pattern.clone(),
                    });
                }
            }
            if let Some(allowed) = one_of {
                if !allowed.iter().any(|a| a == &text) {
                    return Err(ValidationError::NotInEnum {
                        key: key.to_owned(),
                    });
                }
            }
            Ok(Value::String(text))
        }

        ParamSchema::Number {
            minimum,
            maximum,
            integer,
        } => {
            let n = coerce_number(value, key)?;
            if *integer && n.fract() != 0.0 {
                return Err(ValidationError::WrongType {
                    key: key.to_owned(),
                    expected: "integer",
                });
            }
            if let Some(min) = minimum {
                if n < *min {
                    return Err(ValidationError::OutOfBounds {
                        key: key.to_owned(),
                        message: format!("{n} is below minimum {min}"),
                    });
                }
            }
            if let Some(max) = maximum {
                if n > *max {
                    return Err(ValidationError::OutOfBounds {
                        key: key.to_owned(),
                        message: format!("{n} is above maximum {max}"),
                    });
                }
            }
            if *integer {
                Ok(Value::Number((n as i64).into()))
            } else {
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .ok_or_else(|| ValidationError::WrongType {
                        key: key.to_owned(),
                        expected: "number",
                    })
            }
        }

        ParamSchema::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(ValidationError::WrongType {
                key: key.to_owned(),
                expected: "boolean",
            }),
        },

        ParamSchema::Array {
            items,
            min_items,
            max_items,
        } => {
            let Value::Array(values) = value else {
                return Err(ValidationError::WrongType {
                    key: key.to_owned(),
                    expected: "array",
                });
            };
            if let Some(min) = min_items {
                if values.len() < *min {
                    return Err(ValidationError::OutOfBounds {
                        key: key.to_owned(),
                        message: format!("fewer than minItems {min}"),
                    });
                }
            }
            if let Some(max) = max_items {
                if values.len() > *max {
                    return Err(ValidationError::OutOfBounds {
                        key: key.to_owned(),
                        message: format!("more than maxItems {max}"),
                    });
                }
            }
            let coerced = match items {
                Some(item_schema) => values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| validate_at(item_schema, v, &child_key(key, &i.to_string())))
                    .collect::<Result<Vec<_>, _>>()?,
                None => values.clone(),
            };
            Ok(Value::Array(coerced))
        }

        ParamSchema::Object {
            properties,
            required,
            additional_properties,
        } => {
            let Value::Object(map) = value else {
                return Err(ValidationError::WrongType {
                    key: key.to_owned(),
                    expected: "object",
                });
            };
            for req in required {
                if !map.contains_key(req) {
                    return Err(ValidationError::MissingRequired(child_key(key, req)));
                }
            }
            let mut coerced = serde_json::Map::new();
            for (k, v) in map {
                match properties.get(k) {
                    Some(prop) => {
                        coerced.insert(k.clone(), validate_at(prop, v, &child_key(key, k))?);
                    }
                    None if *additional_properties => {
                        coerced.insert(k.clone(), v.clone());
                    }
                    None => {
                        return Err(ValidationError::UnknownKey(child_key(key, k)));
                    }
                }
            }
            Ok(Value::Object(coerced))
        }
    }
}

fn child_key(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_owned()
    } else {
        format!("{parent}.{child}")
    }
}

fn coerce_string(value: &Value, key: &str) -> Result<String, ValidationError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ValidationError::WrongType {
            key: key.to_owned(),
            expected: "string",
        }),
    }
}

fn coerce_number(value: &Value, key: &str) -> Result<f64, ValidationError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| ValidationError::WrongType {
            key: key.to_owned(),
            expected: "number",
        }),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| ValidationError::WrongType {
            key: key.to_owned(),
            expected: "number",
        }),
        _ => Err(ValidationError::WrongType {
            key: key.to_owned(),
            expected: "number",
        }),
    }
}
