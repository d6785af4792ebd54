//! `switchboard run` — one-shot message execution.

use sw_domain::session::SessionMetadata;
use sw_sessions::prompt;

use crate::bootstrap;

/// Execute one message and print the reply to stdout.
///
/// Headless runs cannot answer approval prompts; pass `approve_all` to
/// skip the gate, otherwise gated tool calls fail on the approval timeout.
pub async fn run(
    config: sw_domain::config::Config,
    message: String,
    session: Option<String>,
    approve_all: bool,
) -> anyhow::Result<()> {
    let app = bootstrap::build(config).await?;
    if approve_all {
        app.hub.approvals().set_approve_all(true);
    } else {
        tracing::warn!(
            "running headless without --approve-all: gated tool calls will time out"
        );
    }

    let session_id = match session {
        Some(id) => app.orchestrator.resume_session(&id)?.id,
        None => {
            let system_prompt = format!(
                "You are Switchboard, an assistant that can operate external tools.\n\n{}",
                prompt::tool_documentation(&app.catalog, None)
            );
            app.orchestrator
                .create_session(&system_prompt, SessionMetadata::default())?
                .id
        }
    };

    let result = app.orchestrator.execute_message(&session_id, &message).await?;
    app.hub.shutdown().await;

    if result.is_error {
        anyhow::bail!("{}", result.content);
    }
    println!("{}", result.content);
    eprintln!("session: {session_id}");
    Ok(())
}
