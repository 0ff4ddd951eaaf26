use crate::models::Message;

/// Ordered record of the messages seen in the current session.
///
/// Insertion order is display order. Entries are never reordered or removed
/// individually; the log is only replaced wholesale by a history load or
/// emptied when the session ends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with a freshly loaded history.
    pub fn replace(&mut self, history: Vec<Message>) {
        self.entries = history;
    }

    /// Append one message after everything already in the log.
    pub fn append(&mut self, message: Message) {
        self.entries.push(message);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.entries
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
