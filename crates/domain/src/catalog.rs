//! The derived tool catalog.
//!
//! Built by the hub from every connected provider's tool listing; consulted
//! by the request parser (schema lookup) and the prompt builder (rendered
//! documentation). The hub is the sole writer; everyone else reads.
//!
//! The catalog is fully derived state: it can be dropped with [`ToolCatalog::clear`]
//! and rebuilt from live connections at any time.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::schema::ParamSchema;

/// Documentation for one tool, derived from its provider's declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDocumentation {
    /// The server this tool belongs to.
    pub server: String,
    pub name: String,
    pub description: String,
    /// Parsed input schema; validation happens against this, never raw JSON.
    pub schema: ParamSchema,
    /// When set, calls to this tool skip the approval gate.
    pub always_allow: bool,
}

impl ToolDocumentation {
    /// A generated markup usage example, derived from the schema.
    pub fn usage_example(&self) -> String {
        let mut out = String::new();
        out.push('<');
        out.push_str(&self.name);
        out.push_str(">\n");
        if let ParamSchema::Object { properties, .. } = &self.schema {
            for (key, prop) in properties {
                render_param(&mut out, key, prop);
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
        out
    }

    /// Full model-readable documentation: header, description, usage example.
    pub fn render(&self) -> String {
        let mut out = format!("## {} (server: {})\n", self.name, self.server);
        if !self.description.is_empty() {
            out.push_str(&self.description);
            out.push('\n');
        }
        out.push_str("Usage:\n");
        out.push_str(&self.usage_example());
        out.push('\n');
        out
    }
}

fn render_param(out: &mut String, key: &str, schema: &ParamSchema) {
    match schema {
        ParamSchema::Array { items, .. } => {
            let example = items
                .as_deref()
                .map(ParamSchema::example_value)
                .unwrap_or_else(|| "value".into());
            out.push_str(&format!("<{key}>\n<item>{example}</item>\n</{key}>\n"));
        }
        ParamSchema::Object { properties, .. } => {
            out.push_str(&format!("<{key}>\n"));
            for (child, prop) in properties {
                render_param(out, child, prop);
            }
            out.push_str(&format!("</{key}>\n"));
        }
        leaf => {
            out.push_str(&format!("<{key}>{}</{key}>\n", leaf.example_value()));
        }
    }
}

#[derive(Default)]
struct CatalogInner {
    /// tool name -> documentation.
    tools: BTreeMap<String, ToolDocumentation>,
    /// server name -> tool names, in listing order.
    servers: BTreeMap<String, Vec<String>>,
}

/// Thread-safe catalog of every tool the hub currently knows about.
#[derive(Default)]
pub struct ToolCatalog {
    inner: RwLock<CatalogInner>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a server's catalog entries with a fresh listing.
    ///
    /// A tool name already claimed by another server keeps its original
    /// entry; the collision is logged and the newcomer is still listed under
    /// its server.
    pub fn register_server(&self, server: &str, docs: Vec<ToolDocumentation>) {
        let mut inner = self.inner.write();
        remove_server_entries(&mut inner, server);

        let mut names = Vec::with_capacity(docs.len());
        for doc in docs {
            names.push(doc.name.clone());
            match inner.tools.get(&doc.name) {
                Some(existing) if existing.server != server => {
                    tracing::warn!(
                        tool = %doc.name,
                        server = %server,
                        owner = %existing.server,
                        "tool name collision, keeping earlier registration"
                    );
                }
                _ => {
                    inner.tools.insert(doc.name.clone(), doc);
                }
            }
        }
        inner.servers.insert(server.to_owned(), names);
    }

    /// Drop a server's entries (disconnect, deletion).
    pub fn remove_server(&self, server: &str) {
        let mut inner = self.inner.write();
        remove_server_entries(&mut inner, server);
    }

    /// Invalidate everything.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.tools.clear();
        inner.servers.clear();
    }

    /// Look up one tool's documentation by name.
    pub fn get(&self, tool: &str) -> Option<ToolDocumentation> {
        self.inner.read().tools.get(tool).cloned()
    }

    /// Which server owns the given tool.
    pub fn server_for_tool(&self, tool: &str) -> Option<String> {
        self.inner.read().tools.get(tool).map(|d| d.server.clone())
    }

    /// All documentation entries for one server.
    pub fn tools_for_server(&self, server: &str) -> Vec<ToolDocumentation> {
        let inner = self.inner.read();
        inner
            .servers
            .get(server)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| inner.tools.get(n))
                    .filter(|d| d.server == server)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn server_names(&self) -> Vec<String> {
        self.inner.read().servers.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().tools.is_empty()
    }
}

fn remove_server_entries(inner: &mut CatalogInner, server: &str) {
    if let Some(names) = inner.servers.remove(server) {
        for name in names {
            if inner
                .tools
                .get(&name)
                .is_some_and(|d| d.server == server)
            {
                inner.tools.remove(&name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(server: &str, name: &str) -> ToolDocumentation {
        let schema = ParamSchema::from_value(&json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        }))
        .unwrap();
        ToolDocumentation {
            server: server.into(),
            name: name.into(),
            description: format!("{name} tool"),
            schema,
            always_allow: false,
        }
    }

    #[test]
    fn register_and_lookup() {
        let catalog = ToolCatalog::new();
        catalog.register_server("fs", vec![doc("fs", "read_file"), doc("fs", "write_file")]);

        assert_eq!(catalog.server_for_tool("read_file").as_deref(), Some("fs"));
        assert_eq!(catalog.tools_for_server("fs").len(), 2);
        assert!(catalog.get("unknown_tool").is_none());
    }

    #[test]
    fn reregister_replaces_listing() {
        let catalog = ToolCatalog::new();
        catalog.register_server("fs", vec![doc("fs", "read_file")]);
        catalog.register_server("fs", vec![doc("fs", "stat_file")]);

        assert!(catalog.get("read_file").is_none());
        assert!(catalog.get("stat_file").is_some());
    }

    #[test]
    fn collision_keeps_first_registration() {
        let catalog = ToolCatalog::new();
        catalog.register_server("a", vec![doc("a", "search")]);
        catalog.register_server("b", vec![doc("b", "search")]);

        assert_eq!(catalog.server_for_tool("search").as_deref(), Some("a"));
        // Removing the loser must not evict the winner's entry.
        catalog.remove_server("b");
        assert_eq!(catalog.server_for_tool("search").as_deref(), Some("a"));
    }

    #[test]
    fn remove_server_drops_entries() {
        let catalog = ToolCatalog::new();
        catalog.register_server("fs", vec![doc("fs", "read_file")]);
        catalog.remove_server("fs");
        assert!(catalog.is_empty());
        assert!(catalog.server_names().is_empty());
    }

    #[test]
    fn clear_invalidates_everything() {
        let catalog = ToolCatalog::new();
        catalog.register_server("fs", vec![doc("fs", "read_file")]);
        catalog.register_server("web", vec![doc("web", "fetch")]);
        catalog.clear();
        assert!(catalog.is_empty());
    }

    #[test]
    fn usage_example_renders_markup() {
        let d = doc("fs", "read_file");
        let example = d.usage_example();
        assert!(example.starts_with("<read_file>"));
        assert!(example.contains("<path>value</path>"));
        assert!(example.ends_with("</read_file>"));
    }

    #[test]
    fn usage_example_renders_array_items() {
        let schema = ParamSchema::from_value(&json!({
            "type": "object",
            "properties": {
                "paths": { "type": "array", "items": { "type": "string" } }
            }
        }))
        .unwrap();
        let d = ToolDocumentation {
            server: "fs".into(),
            name: "read_many".into(),
            description: String::new(),
            schema,
            always_allow: false,
        };
        let example = d.usage_example();
        assert!(example.contains("<paths>\n<item>value</item>\n</paths>"));
    }
}
