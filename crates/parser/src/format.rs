//! Invocation formatting — renders a parameter map back to tool-call
//! markup for display. The counterpart to scanning: formatting then
//! re-parsing an invocation yields the same parameter map, up to type
//! normalization.

use serde_json::Value;

/// Render a tool invocation as markup.
///
/// Arrays use repeated `<item>` tags; nested objects use nested tags.
pub fn format_invocation(tool_name: &str, parameters: &serde_json::Map<String, Value>) -> String {
    let mut out = String::new();
    out.push('<');
    out.push_str(tool_name);
    out.push_str(">\n");
    for (key, value) in parameters {
        render(&mut out, key, value);
    }
    out.push_str("</");
    out.push_str(tool_name);
    out.push('>');
    out
}

fn render(out: &mut String, key: &str, value: &Value) {
    match value {
        Value::Array(items) => {
            out.push_str(&format!("<{key}>\n"));
            for item in items {
                render(out, "item", item);
            }
            out.push_str(&format!("</{key}>\n"));
        }
        Value::Object(map) => {
            out.push_str(&format!("<{key}>\n"));
            for (k, v) in map {
                render(out, k, v);
            }
            out.push_str(&format!("</{key}>\n"));
        }
        Value::String(s) => {
            out.push_str(&format!("<{key}>{s}</{key}>\n"));
        }
        scalar => {
            out.push_str(&format!("<{key}>{scalar}</{key}>\n"));
        }
    }
}
