//! `sw-parser` — recovers structured tool invocations from model text.
//!
//! A model turn is free-form text; somewhere in it there may be a tool
//! invocation written as tag markup:
//!
//! ```text
//! <read_file>
//! <path>src/main.rs</path>
//! </read_file>
//! ```
//!
//! or, for explicitly hub-routed calls:
//!
//! ```text
//! <use_mcp_tool>
//! <server_name>filesystem</server_name>
//! <tool_name>read_file</tool_name>
//! <arguments>{"path": "src/main.rs"}</arguments>
//! </use_mcp_tool>
//! ```
//!
//! [`ToolRequestParser::parse`] scans for blocks, normalizes their values,
//! looks the tool up in the catalog, and validates the parameters against
//! its schema. Every invocation that reaches the hub has passed through
//! here — the parser is the sole enforcement point of the catalog
//! invariant. Malformed or invalid blocks are skipped, never fatal.

pub mod format;
pub mod normalize;
pub mod scan;
pub mod validate;

use std::sync::Arc;

use serde_json::Value;

use sw_domain::catalog::ToolCatalog;

use scan::RawBlock;
use validate::ValidationError;

// Re-exports for convenience.
pub use format::format_invocation;
pub use scan::{parse_element, scan_blocks, Element};

/// The outer tag of the hub-routed invocation form.
const USE_MCP_TOOL: &str = "use_mcp_tool";

/// Why one candidate block was skipped. Parser errors are always recovered
/// locally; this type exists for logging and tests, it never crosses the
/// orchestrator boundary.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("tool '{0}' is not in the catalog")]
    UnknownTool(String),

    #[error("block content is not a parameter map")]
    NotAParameterMap,

    #[error("duplicate parameter '{0}'")]
    DuplicateKey(String),

    #[error("missing '{0}' in use_mcp_tool block")]
    MissingField(&'static str),

    #[error("validation: {0}")]
    Validation(#[from] ValidationError),
}

/// One structured tool invocation recovered from model text.
///
/// Ephemeral: produced from a single assistant message, consumed once by
/// the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationRequest {
    pub tool_name: String,
    /// The owning server: explicit in `use_mcp_tool` blocks, resolved via
    /// the catalog for direct blocks.
    pub server_name: Option<String>,
    /// Validated, coerced parameters.
    pub parameters: serde_json::Map<String, Value>,
    /// The block text as it appeared in the model output.
    pub raw: String,
}

/// Scans assistant text for tool invocations and validates them against the
/// catalog.
pub struct ToolRequestParser {
    catalog: Arc<ToolCatalog>,
}

impl ToolRequestParser {
    pub fn new(catalog: Arc<ToolCatalog>) -> Self {
        Self { catalog }
    }

    /// All valid invocations in document order.
    ///
    /// The orchestrator acts on the first one only (one tool call per model
    /// turn); returning them all keeps the scan contract testable.
    pub fn parse(&self, text: &str) -> Vec<ToolInvocationRequest> {
        let mut requests = Vec::new();
        for block in scan::scan_blocks(text) {
            match self.parse_block(&block) {
                Ok(request) => requests.push(request),
                Err(e) => {
                    tracing::debug!(
                        block = %block.name,
                        error = %e,
                        "skipping candidate block"
                    );
                }
            }
        }
        requests
    }

    /// The first valid invocation, if any.
    pub fn parse_first(&self, text: &str) -> Option<ToolInvocationRequest> {
        self.parse(text).into_iter().next()
    }

    fn parse_block(&self, block: &RawBlock) -> Result<ToolInvocationRequest, ParseError> {
        let element = scan::parse_element(&block.inner);
        let value = normalize::element_to_value(&element)?;
        let Value::Object(params) = value else {
            return Err(ParseError::NotAParameterMap);
        };

        if block.name == USE_MCP_TOOL {
            return self.parse_mcp_block(block, params);
        }

        let doc = self
            .catalog
            .get(&block.name)
            .ok_or_else(|| ParseError::UnknownTool(block.name.clone()))?;
        let coerced = validate::validate(&doc.schema, &Value::Object(params))?;
        let Value::Object(parameters) = coerced else {
            return Err(ParseError::NotAParameterMap);
        };

        Ok(ToolInvocationRequest {
            tool_name: block.name.clone(),
            server_name: Some(doc.server),
            parameters,
            raw: block.raw.clone(),
        })
    }

    fn parse_mcp_block(
        &self,
        block: &RawBlock,
        params: serde_json::Map<String, Value>,
    ) -> Result<ToolInvocationRequest, ParseError> {
        let server = params
            .get("server_name")
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingField("server_name"))?
            .to_owned();
        let tool = params
            .get("tool_name")
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingField("tool_name"))?
            .to_owned();
        let arguments = match params.get("arguments") {
            None => serde_json::Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(ParseError::MissingField("arguments")),
        };

        let doc = self
            .catalog
            .get(&tool)
            .ok_or_else(|| ParseError::UnknownTool(tool.clone()))?;
        let coerced = validate::validate(&doc.schema, &Value::Object(arguments))?;
        let Value::Object(parameters) = coerced else {
            return Err(ParseError::NotAParameterMap);
        };

        Ok(ToolInvocationRequest {
            tool_name: tool,
            server_name: Some(server),
            parameters,
            raw: block.raw.clone(),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
