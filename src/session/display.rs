// src/session/display.rs — Renderable units derived from session events

use serde::Serialize;

/// One rendered card: a header line plus a markdown body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardView {
    pub header: String,
    pub markdown: String,
}

/// A downloadable file attached to a tool result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactView {
    pub name: String,
    pub id: String,
    #[serde(rename = "download_link")]
    pub download_url: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// The renderable content of one display unit. Closed set: the reconciler
/// and the replayer both produce only these shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayBody {
    Separator,
    User {
        text: String,
        images: Vec<String>,
    },
    Agent {
        agent: Option<String>,
        view: CardView,
        tool_calls: Vec<CardView>,
    },
    /// The coalesced text of one streaming run.
    Stream {
        agent: Option<String>,
        markdown: String,
    },
    ToolCall {
        view: CardView,
    },
    ToolResult {
        view: Option<CardView>,
        images: Vec<String>,
        artifacts: Vec<ArtifactView>,
    },
    Error {
        message: String,
    },
    /// Terminal marker closing a live turn.
    Done,
}

/// One element of the display sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayUnit {
    pub id: String,
    /// Name of the event that produced this unit.
    pub source: String,
    #[serde(flatten)]
    pub body: DisplayBody,
}

impl DisplayUnit {
    pub fn new(id: impl Into<String>, source: impl Into<String>, body: DisplayBody) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            body,
        }
    }
}

/// What a live turn emits. A `Delta` grows the open streaming unit; the
/// matching `Unit` with the same id closes it carrying the full text, so a
/// consumer that ignores deltas still sees every unit exactly once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Unit { unit: DisplayUnit },
    Delta { id: String, text: String },
}
