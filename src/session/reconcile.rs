// src/session/reconcile.rs — Turn state machine: agent events in, display units out

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::agent::AgentEvent;
use crate::infra::config::ArtifactsConfig;
use crate::infra::errors::RelayError;
use crate::session::display::{DisplayBody, DisplayUnit, TurnEvent};
use crate::session::render;
use crate::session::state::SessionState;

/// What a finished turn reports back to its driver.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Set when the upstream stream failed; the log is still closed out.
    pub error: Option<String>,
}

/// An open streaming-text run being coalesced.
struct OpenRun {
    id: String,
    agent: Option<String>,
    buffer: String,
}

/// Drive one turn: consume the agent stream, coalesce token deltas, emit
/// display units in arrival order, and append custom events to the session
/// log. The caller has already appended the user event and opened the
/// stream; persistence happens after this returns, whether or not anyone
/// is still watching the channel.
pub async fn run_turn<S>(
    session: &mut SessionState,
    first_turn: bool,
    mut stream: S,
    artifacts: &ArtifactsConfig,
    tx: &mpsc::Sender<TurnEvent>,
) -> TurnOutcome
where
    S: Stream<Item = Result<AgentEvent, RelayError>> + Unpin,
{
    let mut outcome = TurnOutcome::default();
    let mut open_run: Option<OpenRun> = None;

    if !first_turn {
        emit_unit(tx, unit("user_input", DisplayBody::Separator)).await;
    }

    // the user event is the last thing appended before the stream opened
    if let Some(user_event) = session.events().last() {
        if let Some(body) = render::render_event(user_event, artifacts) {
            emit_unit(tx, unit("user_input", body)).await;
        }
    }

    while let Some(item) = stream.next().await {
        match item {
            Ok(AgentEvent::ModelDelta { text, node }) => {
                if text.is_empty() {
                    continue;
                }
                if open_run.is_none() {
                    emit_unit(tx, unit("on_chat_model_stream", DisplayBody::Separator)).await;
                    open_run = Some(OpenRun {
                        id: Uuid::new_v4().to_string(),
                        agent: node.as_deref().map(render::format_agent_name),
                        buffer: String::new(),
                    });
                }
                if let Some(run) = open_run.as_mut() {
                    run.buffer.push_str(&text);
                    let id = run.id.clone();
                    emit(tx, TurnEvent::Delta { id, text }).await;
                }
            }
            Ok(other) => {
                // any non-delta event ends the current text run
                flush_run(tx, &mut open_run).await;
                match other {
                    AgentEvent::ToolStart { name, input } => {
                        emit_unit(tx, unit("on_tool_start", DisplayBody::Separator)).await;
                        emit_unit(
                            tx,
                            unit(
                                "on_tool_start",
                                DisplayBody::ToolCall {
                                    view: render::render_tool_call(&name, &input),
                                },
                            ),
                        )
                        .await;
                    }
                    AgentEvent::ToolEnd { name, output } => {
                        emit_unit(tx, unit("on_tool_end", DisplayBody::Separator)).await;
                        emit_unit(
                            tx,
                            unit(
                                "on_tool_end",
                                render::render_tool_result(&name, &output, artifacts),
                            ),
                        )
                        .await;
                    }
                    AgentEvent::Custom(raw) => {
                        // the only event class that reaches the durable log
                        session.append(raw);
                    }
                    AgentEvent::ModelDelta { .. } | AgentEvent::Ignored => {}
                }
            }
            Err(e) => {
                flush_run(tx, &mut open_run).await;
                let message = format!("An error occurred. Please try again.\n\n{e}");
                tracing::error!("turn stream failed: {e}");
                emit_unit(tx, unit("on_chat_model_end", DisplayBody::Separator)).await;
                emit_unit(
                    tx,
                    unit(
                        "error",
                        DisplayBody::Error {
                            message: message.clone(),
                        },
                    ),
                )
                .await;
                outcome.error = Some(message);
                break;
            }
        }
    }

    // stream end (success or error) always closes the turn
    flush_run(tx, &mut open_run).await;
    emit_unit(tx, unit("done", DisplayBody::Done)).await;

    outcome
}

fn unit(source: &str, body: DisplayBody) -> DisplayUnit {
    DisplayUnit::new(Uuid::new_v4().to_string(), source, body)
}

async fn flush_run(tx: &mpsc::Sender<TurnEvent>, open_run: &mut Option<OpenRun>) {
    if let Some(run) = open_run.take() {
        emit_unit(
            tx,
            DisplayUnit::new(
                run.id,
                "on_chat_model_stream",
                DisplayBody::Stream {
                    agent: run.agent,
                    markdown: run.buffer,
                },
            ),
        )
        .await;
    }
}

async fn emit_unit(tx: &mpsc::Sender<TurnEvent>, unit: DisplayUnit) {
    emit(tx, TurnEvent::Unit { unit }).await;
}

/// A dropped receiver means the client went away; the turn keeps running
/// so the log still gets persisted.
async fn emit(tx: &mpsc::Sender<TurnEvent>, event: TurnEvent) {
    let _ = tx.send(event).await;
}
