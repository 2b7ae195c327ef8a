use crate::error::{OncoError, Result};
use crate::message::Message;

/// Transcript of one chat session plus its transient UI echo flags.
///
/// Append-only: messages are never edited or removed individually, only
/// dropped wholesale by [`SessionStore::reset`].
#[derive(Default, Clone, Debug)]
pub struct SessionStore {
    transcript: Vec<Message>,
    clear_input_pending: bool,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) -> Result<()> {
        if !message.role.is_conversational() {
            return Err(OncoError::Protocol(format!(
                "transcript only accepts user and assistant messages, got {:?}",
                message.role
            )));
        }
        self.transcript.push(message);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.transcript.clear();
    }

    pub fn read(&self) -> &[Message] {
        &self.transcript
    }

    /// Ask the next render to empty the input box.
    pub fn request_input_clear(&mut self) {
        self.clear_input_pending = true;
    }

    /// Consume the clear-input request, if any.
    pub fn take_input_clear(&mut self) -> bool {
        std::mem::take(&mut self.clear_input_pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn appends_in_order() {
        let mut store = SessionStore::new();
        store.append(Message::user("a")).unwrap();
        store.append(Message::assistant("b")).unwrap();

        let roles: Vec<Role> = store.read().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(store.read()[1].content, "b");
    }

    #[test]
    fn rejects_non_chat_roles() {
        let mut store = SessionStore::new();
        assert!(store.append(Message::system("persona")).is_err());
        assert!(store.read().is_empty());
    }

    #[test]
    fn reset_empties_transcript() {
        let mut store = SessionStore::new();
        for i in 0..4 {
            store.append(Message::user(format!("q{i}"))).unwrap();
        }
        store.reset();
        assert!(store.read().is_empty());
    }

    #[test]
    fn clear_input_flag_is_one_shot() {
        let mut store = SessionStore::new();
        assert!(!store.take_input_clear());
        store.request_input_clear();
        assert!(store.take_input_clear());
        assert!(!store.take_input_clear());
    }
}
