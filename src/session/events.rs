// src/session/events.rs — Replayable session events and their wire codec

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of event kinds that enter the session log. The log is the
/// single source of truth for replay, so adding a kind here forces every
/// dispatch site to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventName {
    #[serde(rename = "user_input")]
    UserInput,
    #[serde(rename = "call_research_manager")]
    CallManager,
    #[serde(rename = "call_specialist")]
    CallSpecialist,
    #[serde(rename = "call_evaluation")]
    CallEvaluation,
    #[serde(rename = "call_toolset")]
    CallToolset,
    #[serde(rename = "limit_notice")]
    LimitNotice,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::UserInput => "user_input",
            EventName::CallManager => "call_research_manager",
            EventName::CallSpecialist => "call_specialist",
            EventName::CallEvaluation => "call_evaluation",
            EventName::CallToolset => "call_toolset",
            EventName::LimitNotice => "limit_notice",
        }
    }
}

/// Reference to an image, either wrapped (`{"url": ...}`) or a bare string.
/// Both shapes occur in stored logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    Object { url: String },
    Plain(String),
}

impl ImageRef {
    pub fn url(&self) -> &str {
        match self {
            ImageRef::Object { url } => url,
            ImageRef::Plain(url) => url,
        }
    }
}

/// One part of a multi-part message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageRef },
}

/// Message content: either a plain string or structured parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl MessageContent {
    /// First text part, used where a message body is a single blob.
    pub fn first_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t),
            MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }

    /// Every text part, in order.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            MessageContent::Text(t) => vec![t.as_str()],
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    pub fn image_urls(&self) -> Vec<String> {
        match self {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ImageUrl { image_url } => Some(image_url.url().to_string()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// A tool invocation recorded on an agent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// The body of one message inside an event (`kwargs` on the wire).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

/// A message in its constructor envelope, as the agent serializes it.
/// Only `kwargs` matters to us; the framing fields are carried so logs
/// round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default = "default_lc")]
    pub lc: u32,
    #[serde(rename = "type", default = "default_constructor")]
    pub kind: String,
    #[serde(default)]
    pub id: Vec<String>,
    pub kwargs: AgentMessage,
}

fn default_lc() -> u32 {
    1
}

fn default_constructor() -> String {
    "constructor".into()
}

impl WireMessage {
    pub fn human(content: MessageContent) -> Self {
        Self {
            lc: 1,
            kind: "constructor".into(),
            id: vec![
                "langchain_core".into(),
                "messages".into(),
                "HumanMessage".into(),
            ],
            kwargs: AgentMessage {
                content,
                tool_calls: Vec::new(),
            },
        }
    }
}

/// One replay-sufficient record in the session log. Everything needed to
/// re-derive the display unit lives here; the live stream is not required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub name: EventName,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    pub current: String,
    #[serde(default)]
    pub next: String,
}

/// Envelope form used on the wire and in legacy logs. `data` is a JSON
/// string (not an object) — that double encoding is part of the protocol.
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    event: String,
    name: String,
    data: String,
}

/// Lenient payload reader: legacy user-input events omit `name` from the
/// payload and only carry it on the envelope.
#[derive(Deserialize)]
struct PayloadFields {
    #[serde(default)]
    name: Option<EventName>,
    #[serde(default)]
    messages: Vec<WireMessage>,
    current: String,
    #[serde(default)]
    next: String,
}

impl RawEvent {
    /// The event appended for one user turn.
    pub fn user_input(text: &str, attachments: &[String]) -> Self {
        let mut parts = vec![ContentPart::Text {
            text: text.to_string(),
        }];
        for url in attachments {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageRef::Object { url: url.clone() },
            });
        }
        Self {
            name: EventName::UserInput,
            messages: vec![WireMessage::human(MessageContent::Parts(parts))],
            current: "user_input".into(),
            next: "node_research_manager".into(),
        }
    }

    /// Serialize to the legacy `on_custom_event` envelope string.
    pub fn to_wire(&self) -> anyhow::Result<String> {
        let data = serde_json::to_string(self)?;
        let envelope = WireEnvelope {
            event: "on_custom_event".into(),
            name: self.name.as_str().into(),
            data,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    pub fn from_wire(s: &str) -> anyhow::Result<Self> {
        let envelope: WireEnvelope = serde_json::from_str(s)?;
        Self::from_envelope_parts(&envelope.name, &envelope.data)
    }

    /// Parse from an already-deserialized stream event value
    /// (`{"event": "on_custom_event", "name": ..., "data": "..."}`).
    pub fn from_envelope_value(v: &Value) -> anyhow::Result<Self> {
        let name = v["name"].as_str().unwrap_or_default();
        let data = v["data"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("custom event without string data"))?;
        Self::from_envelope_parts(name, data)
    }

    fn from_envelope_parts(envelope_name: &str, data: &str) -> anyhow::Result<Self> {
        let payload: PayloadFields = serde_json::from_str(data)?;
        let name = match payload.name {
            Some(name) => name,
            None => serde_json::from_value(Value::String(envelope_name.to_string()))
                .map_err(|_| anyhow::anyhow!("unknown event name: {envelope_name}"))?,
        };
        Ok(Self {
            name,
            messages: payload.messages,
            current: payload.current,
            next: payload.next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_user_input_event_shape() {
        let ev = RawEvent::user_input("hello", &["data:image/png;base64,xyz".to_string()]);
        assert_eq!(ev.name, EventName::UserInput);
        assert_eq!(ev.current, "user_input");
        assert_eq!(ev.next, "node_research_manager");
        let msg = &ev.messages[0].kwargs;
        assert_eq!(msg.content.texts(), vec!["hello"]);
        assert_eq!(msg.content.image_urls().len(), 1);
    }

    #[test]
    fn test_wire_roundtrip() {
        let ev = RawEvent::user_input("what is a citation?", &[]);
        let wire = ev.to_wire().unwrap();
        let back = RawEvent::from_wire(&wire).unwrap();
        assert_eq!(ev, back);
    }

    #[test]
    fn test_wire_data_is_double_encoded() {
        let ev = RawEvent::user_input("q", &[]);
        let wire = ev.to_wire().unwrap();
        let v: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(v["event"], "on_custom_event");
        // data must be a string containing JSON, not a nested object
        assert!(v["data"].is_string());
    }

    #[test]
    fn test_legacy_payload_without_name() {
        // old user-input records carry the name only on the envelope
        let wire = r#"{"event":"on_custom_event","name":"user_input","data":"{\"messages\":[],\"current\":\"user_input\",\"next\":\"node_research_manager\"}"}"#;
        let ev = RawEvent::from_wire(wire).unwrap();
        assert_eq!(ev.name, EventName::UserInput);
        assert!(ev.messages.is_empty());
    }

    #[test]
    fn test_unknown_event_name_rejected() {
        let wire = r#"{"event":"on_custom_event","name":"call_mystery","data":"{\"messages\":[],\"current\":\"x\"}"}"#;
        assert!(RawEvent::from_wire(wire).is_err());
    }

    #[test]
    fn test_plain_string_content() {
        let json = r#"{"content":"just text","tool_calls":[]}"#;
        let msg: AgentMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.content.first_text(), Some("just text"));
    }

    #[test]
    fn test_bare_image_ref() {
        let json = r#"{"type":"image_url","image_url":"https://x/y.png"}"#;
        let part: ContentPart = serde_json::from_str(json).unwrap();
        match part {
            ContentPart::ImageUrl { image_url } => {
                assert_eq!(image_url.url(), "https://x/y.png")
            }
            _ => panic!("expected image part"),
        }
    }
}
