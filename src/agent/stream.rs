// src/agent/stream.rs — Typed events from the remote agent feed

use serde_json::Value;

use crate::session::events::RawEvent;

/// One event from the remote agent's stream for a turn. Only `Custom`
/// events are persisted; deltas and tool events are transient and get
/// reconstructed from custom events on replay.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A text token belonging to the current streaming run.
    ModelDelta { text: String, node: Option<String> },
    ToolStart { name: String, input: Value },
    ToolEnd { name: String, output: Value },
    Custom(RawEvent),
    /// Any other event kind. Still closes an open streaming run.
    Ignored,
}

impl AgentEvent {
    pub fn from_value(v: &Value) -> anyhow::Result<AgentEvent> {
        match v["event"].as_str().unwrap_or_default() {
            "on_chat_model_stream" | "on_llm_stream" => {
                // the delta is either structured content or a bare string
                let chunk = &v["data"]["chunk"];
                let text = chunk["content"][0]["text"]
                    .as_str()
                    .or_else(|| chunk["content"].as_str())
                    .unwrap_or_default()
                    .to_string();
                let node = v["metadata"]["langgraph_node"]
                    .as_str()
                    .map(str::to_string);
                Ok(AgentEvent::ModelDelta { text, node })
            }
            "on_tool_start" => Ok(AgentEvent::ToolStart {
                name: v["name"].as_str().unwrap_or_default().to_string(),
                input: coerce_json(&v["data"]["input"]),
            }),
            "on_tool_end" => Ok(AgentEvent::ToolEnd {
                name: v["name"].as_str().unwrap_or_default().to_string(),
                output: coerce_json(&v["data"]["output"]),
            }),
            "on_custom_event" => Ok(AgentEvent::Custom(RawEvent::from_envelope_value(v)?)),
            _ => Ok(AgentEvent::Ignored),
        }
    }
}

/// Tool args/output arrive either as objects or as JSON-encoded strings.
fn coerce_json(v: &Value) -> Value {
    match v.as_str() {
        Some(s) => serde_json::from_str(s).unwrap_or_else(|_| v.clone()),
        None => v.clone(),
    }
}
