// src/session/replay.rs — Deterministic projection of a persisted session log

use crate::infra::config::ArtifactsConfig;
use crate::session::display::DisplayUnit;
use crate::session::events::RawEvent;
use crate::session::render;

/// Re-derive the display sequence from the authoritative log. Pure and
/// deterministic: the same log always projects to the same units, and one
/// malformed event drops its own unit without breaking the rest.
pub fn project(chat_id: &str, events: &[RawEvent], artifacts: &ArtifactsConfig) -> Vec<DisplayUnit> {
    events
        .iter()
        .enumerate()
        .filter_map(|(index, event)| {
            let body = render::render_event(event, artifacts)?;
            Some(DisplayUnit::new(
                format!("{chat_id}-{index}"),
                event.name.as_str(),
                body,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::display::DisplayBody;
    use crate::session::events::{
        ContentPart, EventName, MessageContent, RawEvent, WireMessage,
    };
    use pretty_assertions::assert_eq;

    fn artifacts() -> ArtifactsConfig {
        ArtifactsConfig::default()
    }

    fn toolset_event(tool: &str, payload: &str) -> RawEvent {
        RawEvent {
            name: EventName::CallToolset,
            messages: vec![WireMessage::human(MessageContent::Parts(vec![
                ContentPart::Text {
                    text: payload.into(),
                },
            ]))],
            current: tool.into(),
            next: "node_research_manager".into(),
        }
    }

    #[test]
    fn test_projection_is_deterministic() {
        let log = vec![
            RawEvent::user_input("count papers by year", &[]),
            toolset_event("sql_query", r#"{"response": "1999 | 12"}"#),
        ];
        let a = project("c1", &log, &artifacts());
        let b = project("c1", &log, &artifacts());
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].id, "c1-0");
        assert_eq!(a[1].id, "c1-1");
    }

    #[test]
    fn test_malformed_event_dropped_not_fatal() {
        let log = vec![
            RawEvent::user_input("q", &[]),
            toolset_event("sql_query", "{broken json"),
            RawEvent::user_input("q2", &[]),
        ];
        let units = project("c1", &log, &artifacts());
        // the bad toolset event disappears; its neighbours survive
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].id, "c1-0");
        assert_eq!(units[1].id, "c1-2");
    }

    #[test]
    fn test_user_event_projects_to_user_body() {
        let log = vec![RawEvent::user_input("hello", &[])];
        let units = project("c1", &log, &artifacts());
        assert_eq!(units[0].source, "user_input");
        match &units[0].body {
            DisplayBody::User { text, .. } => assert_eq!(text, "hello"),
            other => panic!("unexpected body: {other:?}"),
        }
    }
}
