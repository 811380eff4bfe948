//! The session id captured from an `initialize` response (spec §4.1).
//!
//! Held behind a lock rather than an atomic because it transitions between
//! three meaningfully different states (`None` before/after termination,
//! `Some` once captured) that must be observed and replaced as a unit — a
//! racing `send` and `terminate_session` must never interleave a partial
//! write.

use std::sync::RwLock;

#[derive(Default)]
pub struct SessionSlot {
    id: RwLock<Option<String>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.id.read().expect("session slot lock poisoned").clone()
    }

    /// Captures the session id exactly once: per spec §4.1, only the first
    /// `initialize` response's `mcp-session-id` is ever stored. Later
    /// responses carrying the header (if any) are ignored.
    pub fn capture(&self, session_id: String) {
        let mut guard = self.id.write().expect("session slot lock poisoned");
        if guard.is_none() {
            *guard = Some(session_id);
        }
    }

    pub fn clear(&self) {
        *self.id.write().expect("session slot lock poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_is_a_one_shot() {
        let slot = SessionSlot::new();
        slot.capture("first".to_string());
        slot.capture("second".to_string());
        assert_eq!(slot.get().as_deref(), Some("first"));
    }

    #[test]
    fn clear_allows_a_later_capture() {
        let slot = SessionSlot::new();
        slot.capture("first".to_string());
        slot.clear();
        assert_eq!(slot.get(), None);
        slot.capture("second".to_string());
        assert_eq!(slot.get().as_deref(), Some("second"));
    }
}
