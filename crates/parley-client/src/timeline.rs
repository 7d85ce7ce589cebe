//! Ordered message timeline.
//!
//! The timeline only ever grows by index. An existing entry changes in
//! exactly one way: an assistant entry is extended by a fragment carrying
//! its correlation id. Switching conversations clears it wholesale.

use parley_core::{CorrelationId, MessageEntry};

/// The visible message list plus the loading flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageTimeline {
    entries: Vec<MessageEntry>,
    loading: bool,
}

impl MessageTimeline {
    /// Create an empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a piece of assistant content.
    ///
    /// With a correlation id, the last entry is extended only when it is the
    /// assistant entry for that id. Without one, any trailing assistant
    /// entry is extended; otherwise a new entry with a fresh id starts.
    ///
    /// Returns the id of the entry that received the content.
    pub fn apply(&mut self, content: &str, correlation_id: Option<&CorrelationId>) -> CorrelationId {
        match correlation_id {
            Some(id) => {
                if let Some(last) = self.entries.last_mut() {
                    if last.is_assistant_turn(id) {
                        last.extend(content);
                        return id.clone();
                    }
                }
                self.entries
                    .push(MessageEntry::assistant(content, Some(id.clone())));
                id.clone()
            }
            None => {
                if let Some(last) = self.entries.last_mut() {
                    if last.is_assistant() {
                        last.extend(content);
                        return last
                            .correlation_id
                            .get_or_insert_with(CorrelationId::generate)
                            .clone();
                    }
                }
                let id = CorrelationId::generate();
                self.entries
                    .push(MessageEntry::assistant(content, Some(id.clone())));
                id
            }
        }
    }

    /// Append the user's own message.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.entries.push(MessageEntry::user(content));
    }

    /// Replace everything with a fetched history.
    pub fn replace(&mut self, entries: Vec<MessageEntry>) {
        self.entries = entries;
    }

    /// Drop all entries and the loading flag.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.loading = false;
    }

    /// Entries in display order.
    #[must_use]
    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Suggestions are offered exactly while the timeline is empty.
    #[must_use]
    pub fn show_suggestions(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last character of a trailing assistant entry.
    #[must_use]
    pub fn last_visible_char(&self) -> Option<char> {
        self.entries
            .last()
            .filter(|entry| entry.is_assistant())
            .and_then(MessageEntry::last_char)
    }

    /// Whether a reply is expected.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Set or clear the loading flag.
    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::Role;

    fn id(s: &str) -> CorrelationId {
        CorrelationId::new(s)
    }

    #[test]
    fn fragments_with_same_id_coalesce() {
        let mut timeline = MessageTimeline::new();
        timeline.push_user("hi");
        timeline.apply("Hel", Some(&id("t1")));
        timeline.apply("lo", Some(&id("t1")));

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.entries()[1].content, "Hello");
        assert_eq!(timeline.entries()[1].correlation_id, Some(id("t1")));
    }

    #[test]
    fn different_id_starts_new_entry() {
        let mut timeline = MessageTimeline::new();
        timeline.apply("one", Some(&id("t1")));
        timeline.apply("two", Some(&id("t2")));

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.entries()[0].content, "one");
        assert_eq!(timeline.entries()[1].content, "two");
    }

    #[test]
    fn labelled_fragment_never_extends_user_entry() {
        let mut timeline = MessageTimeline::new();
        timeline.push_user("question");
        timeline.apply("answer", Some(&id("t1")));

        assert_eq!(timeline.entries()[0].content, "question");
        assert_eq!(timeline.entries()[1].role, Role::Assistant);
    }

    #[test]
    fn unlabelled_text_follows_position() {
        let mut timeline = MessageTimeline::new();
        timeline.push_user("q1");
        let first = timeline.apply("Hi", None);
        let same = timeline.apply(" there", None);
        assert_eq!(first, same);
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.entries()[1].content, "Hi there");

        timeline.push_user("q2");
        let second = timeline.apply("Again", None);
        assert_ne!(first, second);
        assert_eq!(timeline.len(), 4);
    }

    #[test]
    fn unlabelled_text_merges_into_labelled_turn() {
        // Positional rule: no id means "continue whatever assistant turn is open".
        let mut timeline = MessageTimeline::new();
        timeline.apply("a", Some(&id("t1")));
        assert_eq!(timeline.apply("b", None), id("t1"));
        assert_eq!(timeline.entries()[0].content, "ab");
    }

    #[test]
    fn suggestions_track_emptiness() {
        let mut timeline = MessageTimeline::new();
        assert!(timeline.show_suggestions());
        timeline.push_user("x");
        assert!(!timeline.show_suggestions());
        timeline.clear();
        assert!(timeline.show_suggestions());
    }

    #[test]
    fn last_visible_char_only_for_assistant() {
        let mut timeline = MessageTimeline::new();
        timeline.push_user("Why?");
        assert_eq!(timeline.last_visible_char(), None);
        timeline.apply("Because.", Some(&id("t1")));
        assert_eq!(timeline.last_visible_char(), Some('.'));
    }

    #[test]
    fn clear_resets_loading() {
        let mut timeline = MessageTimeline::new();
        timeline.set_loading(true);
        timeline.clear();
        assert!(!timeline.is_loading());
    }
}
