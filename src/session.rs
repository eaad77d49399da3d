//! Conversation sessions.
//!
//! A [`Session`] owns the append-only turn history used as extra prompt
//! context. Callers create one per conversation and pass it into each call;
//! nothing is shared between sessions.

use uuid::Uuid;

use crate::completion::{Message, Role};

/// One conversation: a random id and its message history.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    history: Vec<Message>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            history: Vec::new(),
        }
    }

    /// Reported as `metadata.session_id` in query responses.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.history.push(Message::assistant(content));
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// The last `max` turns, oldest first.
    pub fn recent(&self, max: usize) -> Vec<Message> {
        let start = self.history.len().saturating_sub(max);
        self.history[start..].to_vec()
    }

    /// Number of user turns so far.
    pub fn turns(&self) -> usize {
        self.history.iter().filter(|m| m.role == Role::User).count()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Drop all history and start over under a fresh id.
    pub fn reset(&mut self) {
        self.history.clear();
        self.id = Uuid::new_v4();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_window() {
        let mut session = Session::new();
        for i in 0..4 {
            session.push_user(format!("q{}", i));
            session.push_assistant(format!("a{}", i));
        }
        assert_eq!(session.len(), 8);
        assert_eq!(session.turns(), 4);

        let recent = session.recent(3);
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a2", "q3", "a3"]);
        assert_eq!(session.recent(100).len(), 8);
    }

    #[test]
    fn test_reset_clears_and_renews_id() {
        let mut session = Session::new();
        let first = session.id();
        session.push_user("hello");
        session.reset();
        assert!(session.is_empty());
        assert_ne!(session.id(), first);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let mut a = Session::new();
        let b = Session::new();
        a.push_user("only in a");
        assert!(b.is_empty());
        assert_ne!(a.id(), b.id());
    }
}
