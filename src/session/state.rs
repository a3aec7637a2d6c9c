// src/session/state.rs — Owned per-session state

use crate::session::events::RawEvent;

/// The authoritative log for one chat session. Owned by exactly one turn
/// task at a time; events are only ever appended, never rewritten.
#[derive(Debug, Clone)]
pub struct SessionState {
    id: String,
    title: Option<String>,
    events: Vec<RawEvent>,
}

impl SessionState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            events: Vec::new(),
        }
    }

    pub fn from_parts(id: String, title: Option<String>, events: Vec<RawEvent>) -> Self {
        Self { id, title, events }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Set once from the first user message; later calls are ignored.
    pub fn set_title_once(&mut self, title: String) {
        if self.title.is_none() {
            self.title = Some(title);
        }
    }

    pub fn events(&self) -> &[RawEvent] {
        &self.events
    }

    pub fn append(&mut self, event: RawEvent) {
        self.events.push(event);
    }

    pub fn into_events(self) -> Vec<RawEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_set_once() {
        let mut s = SessionState::new("c1");
        s.set_title_once("first".into());
        s.set_title_once("second".into());
        assert_eq!(s.title(), Some("first"));
    }

    #[test]
    fn test_append_only_growth() {
        let mut s = SessionState::new("c1");
        s.append(RawEvent::user_input("hi", &[]));
        s.append(RawEvent::user_input("again", &[]));
        assert_eq!(s.events().len(), 2);
    }
}
