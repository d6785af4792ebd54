//! `switchboard chat` — interactive REPL command.
//!
//! Opens a readline loop that sends each line through the orchestrator and
//! prints the reply. Tool-approval requests from the hub are answered
//! inline on stderr while the turn is in flight.

use sw_domain::session::SessionMetadata;
use sw_sessions::prompt;

use crate::bootstrap::{self, App};

const DEFAULT_PERSONA: &str =
    "You are Switchboard, an assistant that can operate external tools on the user's behalf.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the interactive chat REPL.
pub async fn chat(config: sw_domain::config::Config, session: Option<String>) -> anyhow::Result<()> {
    let app = bootstrap::build(config).await?;
    spawn_approval_reviewer(&app);

    // Resolve or create the session.
    let session_id = match session {
        Some(id) => app.orchestrator.resume_session(&id)?.id,
        None => {
            let system_prompt = format!(
                "{DEFAULT_PERSONA}\n\n{}",
                prompt::tool_documentation(&app.catalog, None)
            );
            app.orchestrator
                .create_session(&system_prompt, SessionMetadata::default())?
                .id
        }
    };

    // Readline editor with persistent history.
    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".switchboard")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("Switchboard interactive chat");
    eprintln!("Session: {session_id}  |  Type /help for commands, Ctrl+D to exit");
    eprintln!();

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &app, &session_id) {
                        break;
                    }
                    continue;
                }

                match app.orchestrator.execute_message(&session_id, trimmed).await {
                    Ok(result) if result.is_error => {
                        eprintln!("\x1B[31merror: {}\x1B[0m", result.content);
                    }
                    Ok(result) => {
                        println!("{}", result.content);
                        eprintln!(
                            "\x1B[2m[{} in / {} out{}]\x1B[0m",
                            result.usage.input_tokens,
                            result.usage.output_tokens,
                            if result.tool_turns > 0 {
                                format!(" / {} tool calls", result.tool_turns)
                            } else {
                                String::new()
                            },
                        );
                        println!();
                    }
                    Err(e) => {
                        eprintln!("\x1B[31merror: {e}\x1B[0m");
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    app.hub.shutdown().await;
    eprintln!("Goodbye!");
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Approval reviewing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Answer hub approval requests on stderr while a turn is in flight (the
/// readline loop is parked awaiting the orchestrator at that point, so
/// stdin is free).
fn spawn_approval_reviewer(app: &App) {
    let approvals = app.hub.approvals().clone();
    let mut rx = approvals.subscribe();
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            eprintln!(
                "\x1B[33mtool call pending approval: {}/{} {}\x1B[0m",
                request.server, request.tool, request.arguments
            );
            eprint!("approve? [y/N] ");

            let answer = tokio::task::spawn_blocking(|| {
                let mut line = String::new();
                std::io::stdin().read_line(&mut line).ok();
                line
            })
            .await
            .unwrap_or_default();

            if answer.trim().eq_ignore_ascii_case("y") {
                approvals.approve(&request.id);
            } else {
                approvals.deny(&request.id, Some("declined at the prompt".into()));
            }
        }
    });
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command. Returns `true` if the REPL should exit.
fn handle_slash_command(input: &str, app: &App, session_id: &str) -> bool {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    match parts[0] {
        "/exit" | "/quit" => return true,

        "/session" => {
            eprintln!("Current session: {session_id}");
        }

        "/servers" => {
            for conn in app.hub.connections() {
                let status = format!("{:?}", conn.status()).to_lowercase();
                let error = conn
                    .error_text()
                    .map(|e| format!("  ({e})"))
                    .unwrap_or_default();
                eprintln!("{}  [{status}]{error}", conn.name);
            }
        }

        "/tools" => {
            for server in app.catalog.server_names() {
                for doc in app.catalog.tools_for_server(&server) {
                    eprintln!("{server}/{}  {}", doc.name, doc.description);
                }
            }
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /session      Show the current session id");
            eprintln!("  /servers      List tool servers and their status");
            eprintln!("  /tools        List available tools");
            eprintln!("  /exit, /quit  Exit the chat");
            eprintln!("  /help         Show this help");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }
    false
}
