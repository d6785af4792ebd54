//! System-prompt building.
//!
//! Combines a role definition with the model-facing tool documentation the
//! catalog derives from connected servers. The markup conventions described
//! here are exactly what the request parser accepts.

use sw_domain::catalog::ToolCatalog;

use crate::roles::RoleConfig;

/// How the model is told to invoke tools.
const TOOL_USE_PREAMBLE: &str = "\
# Tool use

You may invoke at most one tool per reply. Write the invocation as tag \
markup: the tool name as the outer tag, one nested tag per parameter. \
Array parameters use repeated <item> tags; nested objects use nested tags.

Example:

<read_file>
<path>src/main.rs</path>
</read_file>

To route a call to an explicit server, use:

<use_mcp_tool>
<server_name>server</server_name>
<tool_name>tool</tool_name>
<arguments>{\"key\": \"value\"}</arguments>
</use_mcp_tool>

The result arrives in the next user message as JSON.";

/// Render the tool documentation section.
///
/// `servers` filters which connected servers are exposed; `None` exposes
/// all of them.
pub fn tool_documentation(catalog: &ToolCatalog, servers: Option<&[String]>) -> String {
    let names: Vec<String> = match servers {
        Some(filter) if !filter.is_empty() => catalog
            .server_names()
            .into_iter()
            .filter(|n| filter.contains(n))
            .collect(),
        _ => catalog.server_names(),
    };

    let mut sections = Vec::new();
    for server in &names {
        for doc in catalog.tools_for_server(server) {
            sections.push(doc.render());
        }
    }

    if sections.is_empty() {
        return "No tools are currently available.".into();
    }

    let mut out = String::from(TOOL_USE_PREAMBLE);
    out.push_str("\n\n# Available tools\n\n");
    out.push_str(&sections.join("\n"));
    out
}

/// Build the full system prompt for a role-scoped session.
pub fn build_role_prompt(role: &RoleConfig, catalog: &ToolCatalog) -> String {
    let mut out = role.definition.trim().to_owned();
    if !role.instructions.trim().is_empty() {
        out.push_str("\n\n");
        out.push_str(role.instructions.trim());
    }
    out.push_str("\n\n");
    let filter = (!role.available_servers.is_empty()).then_some(role.available_servers.as_slice());
    out.push_str(&tool_documentation(catalog, filter));
    out
}
