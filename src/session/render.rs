// src/session/render.rs — Pure rendering rules, shared by live turns and replay

use serde_json::Value;

use crate::infra::config::ArtifactsConfig;
use crate::session::display::{ArtifactView, CardView, DisplayBody};
use crate::session::events::{AgentMessage, EventName, RawEvent};

/// "node_research_manager" -> "ResearchManager"
pub fn format_agent_name(node: &str) -> String {
    node.trim_start_matches("node_")
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Render a user message: all text parts joined, images as sub-units.
pub fn render_user_message(msg: &AgentMessage) -> DisplayBody {
    DisplayBody::User {
        text: msg.content.texts().join("\n"),
        images: msg.content.image_urls(),
    }
}

/// Render a tool invocation. Tool names ending in `specialist` are task
/// hand-offs, not generic calls; query-shaped tools get language fences.
pub fn render_tool_call(name: &str, args: &Value) -> CardView {
    let mut args = args.clone();
    if let Some(obj) = args.as_object_mut() {
        obj.remove("state");
    }
    let query = args["query"].as_str().unwrap_or_default();

    if name.ends_with("specialist") {
        let task = args["task"]
            .as_str()
            .unwrap_or_default()
            .lines()
            .map(|line| format!("  {line}"))
            .collect::<Vec<_>>()
            .join("\n");
        CardView {
            header: "Task".into(),
            markdown: format!("**Delegate task to {name}:** \n\n{task}"),
        }
    } else if name == "search_literature" {
        CardView {
            header: "Searching literature...".into(),
            markdown: format!("<search>{query}</search>"),
        }
    } else if name == "sql_query" || name == "neo4j_query" {
        CardView {
            header: "SQL".into(),
            markdown: format!("```sql\n{query}\n```"),
        }
    } else if name == "python" {
        CardView {
            header: "Python".into(),
            markdown: format!("```python\n{query}\n```"),
        }
    } else if name == "julia" {
        CardView {
            header: "Julia".into(),
            markdown: format!("```julia\n{query}\n```"),
        }
    } else if name == "r" {
        CardView {
            header: "R".into(),
            markdown: format!("```r\n{query}\n```"),
        }
    } else {
        CardView {
            header: "Tool".into(),
            markdown: format!("Invoking tool: `{name}` with inputs: `{args}`"),
        }
    }
}

fn fenced(lang: &str, text: &str) -> String {
    format!("```{lang}\n{text}\n```")
}

/// The text portion of a tool result, or None when there is nothing to show.
fn render_tool_result_text(name: &str, text: &str) -> Option<CardView> {
    let content = match name {
        "sql_list_table" => fenced("", text),
        "sql_get_schema" => fenced("sql", text),
        "sql_query" | "search_name" => {
            if text.is_empty() {
                String::new()
            } else {
                fenced("output", text)
            }
        }
        "python" | "r" | "julia" => {
            if text.is_empty() {
                String::new()
            } else {
                fenced(name, text)
            }
        }
        _ => text.to_string(),
    };

    if content.is_empty() {
        return None;
    }
    Some(CardView {
        header: name.to_string(),
        markdown: content,
    })
}

/// Render a tool result payload: `{response?, images?, file?, files?}`.
/// Artifacts and images become their own sub-units after the text portion.
pub fn render_tool_result(name: &str, result: &Value, artifacts: &ArtifactsConfig) -> DisplayBody {
    let text = result["response"].as_str().unwrap_or_default();

    let images: Vec<String> = result["images"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let mut files = Vec::new();
    if let Some(path) = result["file"].as_str() {
        files.push(artifact_from_path(path, artifacts));
    }
    if let Some(arr) = result["files"].as_array() {
        for f in arr {
            files.push(ArtifactView {
                name: f["name"].as_str().unwrap_or_default().to_string(),
                id: f["id"].as_str().unwrap_or_default().to_string(),
                download_url: f["download_link"].as_str().unwrap_or_default().to_string(),
                mime_type: f["mimeType"].as_str().unwrap_or_default().to_string(),
            });
        }
    }

    DisplayBody::ToolResult {
        view: render_tool_result_text(name, text),
        images,
        artifacts: files,
    }
}

/// A single `file` path from the agent host becomes a public download link.
fn artifact_from_path(path: &str, artifacts: &ArtifactsConfig) -> ArtifactView {
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    let id = name.split('.').next().unwrap_or(&name).to_string();
    let mime_type = path.rsplit('.').next().unwrap_or_default().to_string();
    let download_url = path.replacen(&artifacts.local_prefix, &artifacts.public_base_url, 1);
    ArtifactView {
        name,
        id,
        download_url,
        mime_type,
    }
}

/// Render an agent (non-stream) message with its tool calls. Returns None
/// when there is neither text nor a tool call to show.
pub fn render_agent_message(msg: &AgentMessage, agent: &str) -> Option<DisplayBody> {
    let text = msg.content.first_text().unwrap_or_default();

    if text.is_empty() && msg.tool_calls.is_empty() {
        return None;
    }

    let tool_calls = msg
        .tool_calls
        .iter()
        .map(|call| render_tool_call(&call.name, &call.args))
        .collect();

    Some(DisplayBody::Agent {
        agent: Some(agent.to_string()),
        view: CardView {
            header: agent.to_string(),
            markdown: text.to_string(),
        },
        tool_calls,
    })
}

/// Project one persisted event to its display body. This is the dispatch
/// shared by the live reconciler (for the user turn) and the replayer; a
/// malformed event maps to None, never a panic.
pub fn render_event(event: &RawEvent, artifacts: &ArtifactsConfig) -> Option<DisplayBody> {
    let first = event.messages.first()?;
    let msg = &first.kwargs;

    if event.current == "user_input" {
        return Some(render_user_message(msg));
    }

    match event.name {
        EventName::UserInput => Some(render_user_message(msg)),
        EventName::CallManager | EventName::CallSpecialist | EventName::CallEvaluation => {
            render_agent_message(msg, &format_agent_name(&event.current))
        }
        EventName::CallToolset => {
            // the message body is a JSON-encoded tool result; `current` is
            // the tool that produced it
            let raw = msg.content.first_text()?;
            let result: Value = serde_json::from_str(raw).ok()?;
            Some(render_tool_result(&event.current, &result, artifacts))
        }
        EventName::LimitNotice => render_agent_message(msg, "Usage limit"),
    }
}
