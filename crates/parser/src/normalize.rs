//! Leaf-value normalization and element-tree conversion.
//!
//! Tag contents are text; parameters are typed. Normalization turns leaf
//! text into the closest JSON value: booleans, numbers, embedded JSON
//! array/object literals, or plain strings. Conversion then folds a parsed
//! element tree into a `serde_json::Value`, turning repeated `item`
//! siblings into lists.

use serde_json::Value;

use crate::scan::Element;
use crate::ParseError;

/// Normalize one leaf value.
///
/// In order: empty stays an empty string; `"true"`/`"false"`
/// (case-insensitive) become booleans; numeric strings become numbers;
/// strings that parse as JSON array/object literals become structured
/// values; everything else remains a string.
pub fn normalize_leaf(raw: &str) -> Value {
    let s = raw.trim();
    if s.is_empty() {
        return Value::String(String::new());
    }
    if s.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    if s.starts_with('[') || s.starts_with('{') {
        if let Ok(v) = serde_json::from_str::<Value>(s) {
            if v.is_array() || v.is_object() {
                return v;
            }
        }
    }
    Value::String(s.to_owned())
}

/// Convert an element tree into a JSON value.
///
/// A container whose children are all named `item` becomes an array; any
/// other repeated sibling name is malformed (silently dropping model output
/// would be worse than rejecting the block).
pub fn element_to_value(element: &Element) -> Result<Value, ParseError> {
    match element {
        Element::Leaf(raw) => Ok(normalize_leaf(raw)),
        Element::Children(children) => children_to_value(children),
    }
}

fn children_to_value(children: &[(String, Element)]) -> Result<Value, ParseError> {
    if !children.is_empty() && children.iter().all(|(name, _)| name == "item") {
        let items = children
            .iter()
            .map(|(_, el)| element_to_value(el))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::Array(items));
    }

    let mut map = serde_json::Map::new();
    for (name, el) in children {
        if map.contains_key(name) {
            return Err(ParseError::DuplicateKey(name.clone()));
        }
        map.insert(name.clone(), element_to_value(el)?);
    }
    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::parse_element;
    use serde_json::json;

    #[test]
    fn empty_stays_empty_string() {
        assert_eq!(normalize_leaf(""), json!(""));
        assert_eq!(normalize_leaf("   "), json!(""));
    }

    #[test]
    fn booleans_case_insensitive() {
        assert_eq!(normalize_leaf("true"), json!(true));
        assert_eq!(normalize_leaf("TRUE"), json!(true));
        assert_eq!(normalize_leaf("False"), json!(false));
    }

    #[test]
    fn numbers() {
        assert_eq!(normalize_leaf("42"), json!(42));
        assert_eq!(normalize_leaf("-7"), json!(-7));
        assert_eq!(normalize_leaf("3.25"), json!(3.25));
        assert_eq!(normalize_leaf("1e3"), json!(1000.0));
    }

    #[test]
    fn non_finite_numbers_stay_strings() {
        assert_eq!(normalize_leaf("inf"), json!("inf"));
        assert_eq!(normalize_leaf("NaN"), json!("NaN"));
    }

    #[test]
    fn json_literals_become_structured() {
        assert_eq!(normalize_leaf(r#"[1, 2, 3]"#), json!([1, 2, 3]));
        assert_eq!(
            normalize_leaf(r#"{"key": "value"}"#),
            json!({"key": "value"})
        );
    }

    #[test]
    fn broken_json_literal_stays_a_string() {
        assert_eq!(normalize_leaf("[1, 2"), json!("[1, 2"));
        assert_eq!(normalize_leaf("{not json}"), json!("{not json}"));
    }

    #[test]
    fn plain_strings_pass_through_trimmed() {
        assert_eq!(normalize_leaf("  a.txt \n"), json!("a.txt"));
        assert_eq!(normalize_leaf("hello world"), json!("hello world"));
    }

    #[test]
    fn item_siblings_become_a_list_with_per_item_coercion() {
        let el = parse_element("<item>1</item><item>2</item>");
        assert_eq!(element_to_value(&el).unwrap(), json!([1, 2]));
    }

    #[test]
    fn single_item_is_still_a_list() {
        let el = parse_element("<item>only</item>");
        assert_eq!(element_to_value(&el).unwrap(), json!(["only"]));
    }

    #[test]
    fn nested_containers_become_nested_maps() {
        let el = parse_element("<opts><depth>2</depth><follow>true</follow></opts>");
        assert_eq!(
            element_to_value(&el).unwrap(),
            json!({"opts": {"depth": 2, "follow": true}})
        );
    }

    #[test]
    fn duplicate_non_item_siblings_are_rejected() {
        let el = parse_element("<path>a</path><path>b</path>");
        assert!(matches!(
            element_to_value(&el),
            Err(ParseError::DuplicateKey(k)) if k == "path"
        ));
    }

    #[test]
    fn empty_container_is_an_empty_map() {
        let el = parse_element("");
        assert_eq!(element_to_value(&el).unwrap(), json!({}));
    }
}
