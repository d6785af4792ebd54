//! The session orchestrator.
//!
//! Drives one conversation: append the user turn, stream the provider
//! (with retry), detect at most one tool request in the reply, dispatch it
//! through the hub, feed the JSON-encoded result back as a new user turn,
//! and loop — the multi-turn tool loop is driven entirely by the model's
//! own output. Session state is persisted after every mutation.
//!
//! Tool and provider failures never crash a session: the partial state is
//! persisted and the caller receives an error-typed [`ExecuteResult`].

use std::sync::Arc;

use serde_json::Value;

use sw_domain::catalog::ToolCatalog;
use sw_domain::error::{Error, Result};
use sw_domain::session::{Message, Session, SessionMetadata, SessionStatus};
use sw_domain::stream::TokenUsage;
use sw_hub::hub::ToolDispatcher;
use sw_hub::protocol::ToolCallResult;
use sw_parser::ToolRequestParser;
use sw_providers::registry::ProviderRegistry;
use sw_providers::retry::complete_with_retry;

use crate::prompt;
use crate::registry::SessionRegistry;
use crate::roles::RoleLoader;
use crate::store::SessionStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What one `execute_message` produced.
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    /// The final assistant text, or the failure description when
    /// `is_error` is set.
    pub content: String,
    pub is_error: bool,
    /// How many tool calls the loop dispatched.
    pub tool_turns: u32,
    /// Accumulated token usage across every provider call in the loop.
    pub usage: TokenUsage,
}

impl ExecuteResult {
    fn error(content: String, tool_turns: u32, usage: TokenUsage) -> Self {
        Self {
            content,
            is_error: true,
            tool_turns,
            usage,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    store: Arc<SessionStore>,
    providers: Arc<ProviderRegistry>,
    hub: Arc<dyn ToolDispatcher>,
    catalog: Arc<ToolCatalog>,
    parser: ToolRequestParser,
    roles: Arc<RoleLoader>,
    default_provider: String,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<SessionStore>,
        providers: Arc<ProviderRegistry>,
        hub: Arc<dyn ToolDispatcher>,
        catalog: Arc<ToolCatalog>,
        roles: Arc<RoleLoader>,
        default_provider: String,
    ) -> Self {
        let parser = ToolRequestParser::new(catalog.clone());
        Self {
            registry,
            store,
            providers,
            hub,
            catalog,
            parser,
            roles,
            default_provider,
        }
    }

    // ── Session lifecycle ──────────────────────────────────────────

    /// Create a fresh session and persist it.
    pub fn create_session(
        &self,
        system_prompt: &str,
        metadata: SessionMetadata,
    ) -> Result<Session> {
        let session = Session::new(system_prompt, metadata);
        self.store.save(&session)?;
        self.registry.insert(session.clone());
        tracing::info!(session = %session.id, "session created");
        Ok(session)
    }

    /// Load a persisted session into the registry (no-op when already
    /// loaded).
    pub fn resume_session(&self, id: &str) -> Result<Session> {
        if let Some(session) = self.registry.get(id) {
            return Ok(session);
        }
        let session = self.store.load(id)?;
        self.registry.insert(session.clone());
        tracing::info!(session = %id, messages = session.messages.len(), "session resumed");
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.registry.get(id)
    }

    // ── Message execution ──────────────────────────────────────────

    /// Process one user message to completion, including any tool turns
    /// the model chains. One call at a time per session; concurrent
    /// sessions are independent.
    pub async fn execute_message(&self, session_id: &str, text: &str) -> Result<ExecuteResult> {
        let lock = self.registry.execution_lock(session_id);
        let _guard = lock.lock().await;
        self.run_loop(session_id, Message::user(text)).await
    }

    async fn run_loop(&self, session_id: &str, first: Message) -> Result<ExecuteResult> {
        let mut pending = first;
        let mut usage = TokenUsage::default();
        let mut tool_turns: u32 = 0;

        loop {
            // 1. Append the pending user turn; persist.
            self.append_message(session_id, pending)?;

            // 2. Stream the provider over the full session.
            let session = self
                .registry
                .get(session_id)
                .ok_or_else(|| Error::Session(format!("session '{session_id}' is not loaded")))?;
            let provider_id = session
                .metadata
                .provider
                .clone()
                .unwrap_or_else(|| self.default_provider.clone());
            let entry = self.providers.get(&provider_id)?;

            let response =
                match complete_with_retry(entry.client.as_ref(), &session, &entry.retry).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!(session = %session_id, error = %e, "provider call failed");
                        return Ok(ExecuteResult::error(e.to_string(), tool_turns, usage));
                    }
                };
            usage.accumulate(&response.usage);

            if response.text.trim().is_empty() {
                let e = Error::InvalidResponse("provider returned no text at all".into());
                tracing::warn!(session = %session_id, "empty provider response");
                return Ok(ExecuteResult::error(e.to_string(), tool_turns, usage));
            }

            // 3. Append the assistant turn; persist.
            self.append_message(session_id, Message::assistant(&response.text))?;

            // 4. At most one tool request per model turn.
            let Some(invocation) = self.parser.parse_first(&response.text) else {
                return Ok(ExecuteResult {
                    content: response.text,
                    is_error: false,
                    tool_turns,
                    usage,
                });
            };
            tool_turns += 1;

            let server = invocation
                .server_name
                .clone()
                .or_else(|| self.catalog.server_for_tool(&invocation.tool_name));
            let Some(server) = server else {
                // The parser validated against the catalog, so this only
                // happens when the server vanished mid-turn.
                let message = format!("no server for tool '{}'", invocation.tool_name);
                let failure = ToolCallResult::failure(message.clone());
                let msg = tool_result_message(&invocation.tool_name, "", &failure)?;
                self.append_message(session_id, msg)?;
                return Ok(ExecuteResult::error(message, tool_turns, usage));
            };

            // Role-scoped sessions only use the servers their role allows.
            if let Some(denied) = self.role_denies_server(&session, &server) {
                let failure = ToolCallResult::failure(denied.clone());
                let msg = tool_result_message(&invocation.tool_name, &server, &failure)?;
                self.append_message(session_id, msg)?;
                return Ok(ExecuteResult::error(denied, tool_turns, usage));
            }

            tracing::info!(
                session = %session_id,
                server = %server,
                tool = %invocation.tool_name,
                "dispatching model-requested tool call"
            );

            // 5. Dispatch; feed the JSON-encoded result back as the next
            //    user turn (or record the failure and surface it).
            let arguments = Value::Object(invocation.parameters.clone());
            match self.hub.call_tool(&server, &invocation.tool_name, arguments).await {
                Ok(result) => {
                    pending = tool_result_message(&invocation.tool_name, &server, &result)?;
                }
                Err(e) => {
                    let failure = ToolCallResult::failure(e.to_string());
                    let msg = tool_result_message(&invocation.tool_name, &server, &failure)?;
                    // The message recording the failed call remains.
                    self.append_message(session_id, msg)?;
                    return Ok(ExecuteResult::error(e.to_string(), tool_turns, usage));
                }
            }
        }
    }

    /// When the session runs under a role with a server allowlist, a call
    /// outside that list is rejected before it reaches the hub.
    fn role_denies_server(&self, session: &Session, server: &str) -> Option<String> {
        let role_name = session.metadata.role.as_deref()?;
        let role = self.roles.get_role(role_name).ok()?;
        if role.available_servers.is_empty()
            || role.available_servers.iter().any(|s| s == server)
        {
            None
        } else {
            Some(format!(
                "server '{server}' is not available to role '{role_name}'"
            ))
        }
    }

    fn append_message(&self, session_id: &str, message: Message) -> Result<()> {
        let snapshot = self.registry.update(session_id, |s| {
            s.push(message);
            s.clone()
        })?;
        self.store.save(&snapshot)
    }

    // ── Child sessions ─────────────────────────────────────────────

    /// Spawn a child session under `parent_id` with the given role, link
    /// the relation both ways, and immediately execute the initial prompt.
    pub async fn create_child_session(
        &self,
        parent_id: &str,
        role_name: &str,
        initial_prompt: &str,
    ) -> Result<(String, ExecuteResult)> {
        if !self.registry.contains(parent_id) {
            return Err(Error::Session(format!(
                "parent session '{parent_id}' is not loaded"
            )));
        }

        let role = self.roles.get_role(role_name)?;
        let system_prompt = prompt::build_role_prompt(&role, &self.catalog);

        let mut metadata = SessionMetadata::default();
        metadata.role = Some(role_name.to_owned());
        let mut child = Session::new(system_prompt, metadata);
        child.parent_id = Some(parent_id.to_owned());
        let child_id = child.id.clone();

        self.store.save(&child)?;
        self.registry.insert(child);
        self.registry.link_child(parent_id, &child_id);
        let parent_snapshot = self.registry.update(parent_id, |s| {
            s.child_session_ids.push(child_id.clone());
            s.clone()
        })?;
        self.store.save(&parent_snapshot)?;

        tracing::info!(parent = %parent_id, child = %child_id, role = %role_name, "child session created");

        let result = self.execute_message(&child_id, initial_prompt).await?;
        Ok((child_id, result))
    }

    /// Mark a child completed and inject its summary into the parent,
    /// resuming the parent's own loop.
    pub async fn complete_child_session(
        &self,
        child_id: &str,
        summary: &str,
    ) -> Result<ExecuteResult> {
        let parent_id = self
            .registry
            .parent_of(child_id)
            .ok_or_else(|| Error::Session(format!("session '{child_id}' has no parent")))?;

        let child_snapshot = self.registry.update(child_id, |s| {
            s.status = SessionStatus::Completed;
            s.clone()
        })?;
        self.store.save(&child_snapshot)?;

        let role = child_snapshot.metadata.role.as_deref().unwrap_or("child");
        let message = format!("[{role} session {child_id} completed]\n{summary}");
        tracing::info!(parent = %parent_id, child = %child_id, "child session completed");

        self.execute_message(&parent_id, &message).await
    }
}

/// Wrap a tool-call result as the next user-role message, JSON-encoded.
fn tool_result_message(tool: &str, server: &str, result: &ToolCallResult) -> Result<Message> {
    let json = serde_json::to_string(result)?;
    Ok(Message::user(json).with_metadata(serde_json::json!({
        "type": "tool_result",
        "tool": tool,
        "server": server,
        "success": result.success,
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use parking_lot::Mutex;
    use serde_json::json;

    use sw_domain::catalog::ToolDocumentation;
    use sw_domain::schema::ParamSchema;
    use sw_domain::session::Role;
    use sw_domain::stream::{BoxStream, Chunk};
    use sw_hub::hub::HubError;
    use sw_hub::protocol::{ContentItem, ResourceReadResult};
    use sw_providers::retry::RetryPolicy;
    use sw_providers::traits::StreamingClient;

    /// A provider that replays a fixed script of response texts.
    struct ScriptedClient {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedClient {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait::async_trait]
    impl StreamingClient for ScriptedClient {
        fn provider_id(&self) -> &str {
            "scripted"
        }

        async fn stream(
            &self,
            _session: &Session,
        ) -> sw_domain::Result<BoxStream<'static, sw_domain::Result<Chunk>>> {
            let text = self.responses.lock().pop_front().unwrap_or_default();
            Ok(Box::pin(futures_util::stream::iter(vec![
                Ok(Chunk::Text { text }),
                Ok(Chunk::Usage(TokenUsage {
                    input_tokens: 5,
                    output_tokens: 7,
                    ..Default::default()
                })),
                Ok(Chunk::MessageStop),
            ])))
        }
    }

    /// A dispatcher that records calls and replays scripted results.
    struct ScriptedDispatcher {
        calls: Mutex<Vec<(String, String, Value)>>,
        results: Mutex<VecDeque<std::result::Result<ToolCallResult, HubError>>>,
    }

    impl ScriptedDispatcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                results: Mutex::new(VecDeque::new()),
            })
        }

        fn push_result(&self, result: std::result::Result<ToolCallResult, HubError>) {
            self.results.lock().push_back(result);
        }
    }

    #[async_trait::async_trait]
    impl ToolDispatcher for ScriptedDispatcher {
        async fn call_tool(
            &self,
            server: &str,
            tool: &str,
            arguments: Value,
        ) -> std::result::Result<ToolCallResult, HubError> {
            self.calls
                .lock()
                .push((server.to_owned(), tool.to_owned(), arguments));
            self.results.lock().pop_front().unwrap_or_else(|| {
                Ok(ToolCallResult {
                    success: true,
                    content: vec![ContentItem::Text { text: "ok".into() }],
                    error: None,
                })
            })
        }

        async fn read_resource(
            &self,
            server: &str,
            _uri: &str,
        ) -> std::result::Result<ResourceReadResult, HubError> {
            Err(HubError::NotFound(server.to_owned()))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        orchestrator: Orchestrator,
        dispatcher: Arc<ScriptedDispatcher>,
        store: Arc<SessionStore>,
    }

    fn fixture(responses: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();

        let catalog = Arc::new(ToolCatalog::new());
        catalog.register_server(
            "filesystem",
            vec![ToolDocumentation {
                server: "filesystem".into(),
                name: "read_file".into(),
                description: "Read a file.".into(),
                schema: ParamSchema::from_value(&json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                    "required": ["path"],
                    "additionalProperties": false
                }))
                .unwrap(),
                always_allow: false,
            }],
        );

        let mut providers = ProviderRegistry::default();
        providers.register(
            "scripted",
            ScriptedClient::new(responses),
            RetryPolicy {
                max_retries: 0,
                initial_backoff: std::time::Duration::from_millis(1),
                max_backoff: std::time::Duration::from_millis(1),
            },
        );

        let roles_dir = dir.path().join("roles");
        std::fs::create_dir_all(&roles_dir).unwrap();
        std::fs::write(
            roles_dir.join("researcher.toml"),
            r#"definition = "You are a researcher.""#,
        )
        .unwrap();
        std::fs::write(
            roles_dir.join("web-only.toml"),
            "definition = \"You browse.\"\navailable_servers = [\"web\"]\n",
        )
        .unwrap();

        let store = Arc::new(SessionStore::new(dir.path()).unwrap());
        let dispatcher = ScriptedDispatcher::new();
        let orchestrator = Orchestrator::new(
            Arc::new(SessionRegistry::new()),
            store.clone(),
            Arc::new(providers),
            dispatcher.clone(),
            catalog,
            Arc::new(RoleLoader::new(Some(roles_dir))),
            "scripted".into(),
        );

        Fixture {
            _dir: dir,
            orchestrator,
            dispatcher,
            store,
        }
    }

    #[tokio::test]
    async fn plain_exchange_appends_and_persists() {
        let fx = fixture(&["Hello there."]);
        let session = fx
            .orchestrator
            .create_session("sys", SessionMetadata::default())
            .unwrap();

        let result = fx
            .orchestrator
            .execute_message(&session.id, "hi")
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content, "Hello there.");
        assert_eq!(result.tool_turns, 0);
        assert_eq!(result.usage.input_tokens, 5);

        let stored = fx.store.load(&session.id).unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[0].role, Role::User);
        assert_eq!(stored.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn tool_loop_feeds_result_back_and_continues() {
        let fx = fixture(&[
            "Reading it now.\n<read_file>\n<path>a.txt</path>\n</read_file>",
            "The file contains: hello.",
        ]);
        fx.dispatcher.push_result(Ok(ToolCallResult {
            success: true,
            content: vec![ContentItem::Text {
                text: "hello".into(),
            }],
            error: None,
        }));

        let session = fx
            .orchestrator
            .create_session("sys", SessionMetadata::default())
            .unwrap();
        let result = fx
            .orchestrator
            .execute_message(&session.id, "what's in a.txt?")
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.content, "The file contains: hello.");
        assert_eq!(result.tool_turns, 1);
        // Two provider calls worth of usage.
        assert_eq!(result.usage.input_tokens, 10);
        assert_eq!(result.usage.output_tokens, 14);

        // The dispatcher saw the validated call.
        let calls = fx.dispatcher.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "filesystem");
        assert_eq!(calls[0].1, "read_file");
        assert_eq!(calls[0].2, json!({"path": "a.txt"}));

        // user, assistant(call), user(tool result), assistant(final).
        let stored = fx.store.load(&session.id).unwrap();
        assert_eq!(stored.messages.len(), 4);
        let tool_msg = &stored.messages[2];
        assert_eq!(tool_msg.role, Role::User);
        assert!(tool_msg.content.contains("hello"));
        assert_eq!(tool_msg.metadata.as_ref().unwrap()["type"], "tool_result");
    }

    #[tokio::test]
    async fn hub_error_persists_state_and_returns_error_result() {
        let fx = fixture(&["<read_file><path>a.txt</path></read_file>"]);
        fx.dispatcher
            .push_result(Err(HubError::Disabled("filesystem".into())));

        let session = fx
            .orchestrator
            .create_session("sys", SessionMetadata::default())
            .unwrap();
        let result = fx
            .orchestrator
            .execute_message(&session.id, "go")
            .await
            .unwrap();

        assert!(result.is_error);
        assert!(result.content.contains("disabled"));

        // user, assistant(call), user(failure json) — the record remains.
        let stored = fx.store.load(&session.id).unwrap();
        assert_eq!(stored.messages.len(), 3);
        assert!(stored.messages[2].content.contains("\"success\":false"));
    }

    #[tokio::test]
    async fn empty_provider_response_is_an_invalid_response() {
        let fx = fixture(&[""]);
        let session = fx
            .orchestrator
            .create_session("sys", SessionMetadata::default())
            .unwrap();
        let result = fx
            .orchestrator
            .execute_message(&session.id, "hi")
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("invalid response"));
    }

    #[tokio::test]
    async fn child_session_executes_immediately_and_reports_back() {
        let fx = fixture(&["research complete: 42", "thanks, noted"]);
        let parent = fx
            .orchestrator
            .create_session("parent sys", SessionMetadata::default())
            .unwrap();

        let (child_id, child_result) = fx
            .orchestrator
            .create_child_session(&parent.id, "researcher", "find the answer")
            .await
            .unwrap();
        assert!(!child_result.is_error);
        assert_eq!(child_result.content, "research complete: 42");

        // The child executed its prompt immediately.
        let child = fx.orchestrator.get_session(&child_id).unwrap();
        assert_eq!(child.messages.len(), 2);
        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
        assert_eq!(child.metadata.role.as_deref(), Some("researcher"));
        assert!(child.system_prompt.starts_with("You are a researcher."));

        // The parent gained the forward link.
        let parent_now = fx.orchestrator.get_session(&parent.id).unwrap();
        assert_eq!(parent_now.child_session_ids, vec![child_id.clone()]);

        // Completing injects the summary into the parent.
        let result = fx
            .orchestrator
            .complete_child_session(&child_id, "done")
            .await
            .unwrap();
        assert!(!result.is_error);

        let parent_now = fx.orchestrator.get_session(&parent.id).unwrap();
        assert!(parent_now
            .messages
            .iter()
            .any(|m| m.role == Role::User && m.content.contains("done")));

        let child_now = fx.orchestrator.get_session(&child_id).unwrap();
        assert_eq!(child_now.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn resume_loads_persisted_state() {
        let fx = fixture(&["Hello."]);
        let session = fx
            .orchestrator
            .create_session("sys", SessionMetadata::default())
            .unwrap();
        fx.orchestrator
            .execute_message(&session.id, "hi")
            .await
            .unwrap();

        // A second orchestrator over the same store simulates a restart.
        let fx2_registry = Arc::new(SessionRegistry::new());
        let orchestrator2 = Orchestrator::new(
            fx2_registry,
            fx.store.clone(),
            Arc::new(ProviderRegistry::default()),
            fx.dispatcher.clone(),
            Arc::new(ToolCatalog::new()),
            Arc::new(RoleLoader::new(None)),
            "scripted".into(),
        );

        let resumed = orchestrator2.resume_session(&session.id).unwrap();
        assert_eq!(resumed.messages.len(), 2);

        let err = orchestrator2.resume_session("missing-id").unwrap_err();
        assert!(matches!(err, Error::Session(_)));
    }

    #[tokio::test]
    async fn role_allowlist_blocks_other_servers() {
        // The child's role only allows the `web` server, but the model asks
        // for a filesystem tool; the hub must never see the call.
        let fx = fixture(&["<read_file><path>a.txt</path></read_file>"]);
        let parent = fx
            .orchestrator
            .create_session("sys", SessionMetadata::default())
            .unwrap();

        let (_child_id, result) = fx
            .orchestrator
            .create_child_session(&parent.id, "web-only", "read a.txt")
            .await
            .unwrap();

        assert!(result.is_error);
        assert!(result.content.contains("not available to role"));
        assert!(fx.dispatcher.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_role_fails_child_creation() {
        let fx = fixture(&[]);
        let parent = fx
            .orchestrator
            .create_session("sys", SessionMetadata::default())
            .unwrap();
        let err = fx
            .orchestrator
            .create_child_session(&parent.id, "ghost", "go")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
