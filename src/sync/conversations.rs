use super::ordered::{Keyed, OrderedMap};
use crate::model::{Conversation, Message};
use std::cmp::Ordering;
use tracing::debug;

impl Keyed for Conversation {
    type Key = str;

    fn key(&self) -> &str {
        &self.id
    }
}

/// Most recent activity first; conversations without activity go last.
fn newest_first(a: &Conversation, b: &Conversation) -> Ordering {
    match (a.last_message_at, b.last_message_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Result of folding a `new_message` event into the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListChange {
    /// The conversation was moved to the top.
    Moved {
        from: usize,
        unread: u32,
        counted_unread: bool,
    },
    /// The conversation is not in the list; a full reseed is required.
    NeedsReseed,
}

/// The inbox list: REST-seeded conversation summaries patched by live events.
#[derive(Debug, Default)]
pub struct ConversationList {
    entries: OrderedMap<Conversation>,
}

impl ConversationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(conversations: Vec<Conversation>) -> Self {
        let mut list = Self::new();
        list.seed(conversations);
        list
    }

    /// Replace the list wholesale.
    pub fn seed(&mut self, conversations: Vec<Conversation>) {
        self.entries = OrderedMap::from_unordered(conversations, newest_first);
        debug!("Conversation list seeded with {} entries", self.entries.len());
    }

    pub fn apply_new_message(&mut self, message: &Message, active: Option<&str>) -> ListChange {
        let Some(conversation) = self.entries.get_mut(message.conversation_id.as_str()) else {
            debug!(
                "Message {} for unknown conversation {}",
                message.id, message.conversation_id
            );
            return ListChange::NeedsReseed;
        };

        conversation.record_message(message);
        let counted_unread = message.is_incoming() && active != Some(conversation.id.as_str());
        if counted_unread {
            conversation.unread_count = conversation.unread_count.saturating_add(1);
        }
        let unread = conversation.unread_count;

        let from = self
            .entries
            .move_to_front(message.conversation_id.as_str())
            .unwrap_or_default();
        ListChange::Moved {
            from,
            unread,
            counted_unread,
        }
    }

    /// Upsert a server summary. Returns the entry's new index.
    pub fn apply_conversation_update(
        &mut self,
        mut conversation: Conversation,
        active: Option<&str>,
    ) -> usize {
        if active == Some(conversation.id.as_str()) {
            conversation.unread_count = 0;
        }

        if let Some(idx) = self.entries.position(conversation.id.as_str()) {
            let unchanged_time = self.entries.as_slice()[idx].last_message_at
                == conversation.last_message_at;
            if unchanged_time {
                self.entries.replace_at(idx, conversation);
                return idx;
            }
        }
        self.entries.insert_ordered(conversation, newest_first)
    }

    /// Reset the local unread count. Returns the count before the reset.
    pub fn mark_read(&mut self, id: &str) -> Option<u32> {
        self.entries
            .get_mut(id)
            .map(|c| std::mem::take(&mut c.unread_count))
    }

    pub fn remove(&mut self, id: &str) -> Option<Conversation> {
        self.entries.remove(id)
    }

    /// Returns how many entries were renamed.
    pub fn rename_contact(&mut self, contact_id: &str, name: &str) -> usize {
        let mut renamed = 0;
        for conversation in self.entries.iter_mut() {
            if conversation.contact.id == contact_id {
                conversation.contact.name = name.to_string();
                renamed += 1;
            }
        }
        renamed
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.entries.get(id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.position(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Conversation] {
        self.entries.as_slice()
    }

    pub fn total_unread(&self) -> u64 {
        self.entries.iter().map(|c| c.unread_count as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;
    use crate::sync::testing::{at, conversation, incoming, message};
    use std::collections::HashSet;

    fn ids(list: &ConversationList) -> Vec<&str> {
        list.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn seed_orders_newest_first_with_untimed_last() {
        let list = ConversationList::seeded(vec![
            conversation("quiet", 0, None),
            conversation("old", 0, Some(at(1))),
            conversation("new", 0, Some(at(5))),
            conversation("tie", 0, Some(at(1))),
            conversation("old", 9, Some(at(9))),
        ]);

        assert_eq!(ids(&list), vec!["new", "old", "tie", "quiet"]);
        assert_eq!(list.get("old").unwrap().unread_count, 0);
    }

    #[test]
    fn incoming_message_for_inactive_conversation_counts_and_moves_up() {
        let mut list = ConversationList::seeded(vec![
            conversation("a", 0, Some(at(9))),
            conversation("b", 1, Some(at(8))),
            conversation("c", 5, Some(at(7))),
        ]);

        let change = list.apply_new_message(&incoming("m1", "c", at(10)), Some("a"));

        assert_eq!(
            change,
            ListChange::Moved {
                from: 2,
                unread: 6,
                counted_unread: true
            }
        );
        assert_eq!(ids(&list), vec!["c", "a", "b"]);
        let c = list.get("c").unwrap();
        assert_eq!(c.last_message.as_deref(), Some("body of m1"));
        assert_eq!(c.last_message_at, Some(at(10)));
    }

    #[test]
    fn active_or_outgoing_messages_do_not_count_unread() {
        let mut list = ConversationList::seeded(vec![
            conversation("a", 0, Some(at(9))),
            conversation("b", 2, Some(at(8))),
        ]);

        let change = list.apply_new_message(&incoming("m1", "b", at(10)), Some("b"));
        assert!(matches!(change, ListChange::Moved { unread: 2, counted_unread: false, .. }));

        let reply = message("m2", "a", Direction::Outgoing, at(11));
        let change = list.apply_new_message(&reply, None);
        assert!(matches!(change, ListChange::Moved { unread: 0, counted_unread: false, .. }));
        assert_eq!(ids(&list), vec!["a", "b"]);
    }

    #[test]
    fn unknown_conversation_needs_reseed_without_synthesizing() {
        let mut list = ConversationList::seeded(vec![conversation("a", 0, Some(at(1)))]);

        let change = list.apply_new_message(&incoming("m1", "zz", at(2)), None);

        assert_eq!(change, ListChange::NeedsReseed);
        assert_eq!(ids(&list), vec!["a"]);
    }

    #[test]
    fn interleaved_events_and_reseeds_keep_ids_unique() {
        let mut list = ConversationList::new();
        let snapshot = vec![
            conversation("a", 0, Some(at(1))),
            conversation("b", 0, Some(at(2))),
            conversation("c", 0, Some(at(3))),
        ];

        for round in 0..20 {
            if round % 3 == 0 {
                let mut seed = snapshot.clone();
                seed.extend(snapshot.iter().cloned());
                list.seed(seed);
            }
            let target = ["a", "b", "c", "d"][round % 4];
            list.apply_new_message(&incoming(&format!("m{}", round), target, at(10 + round as i64)), None);
            list.apply_conversation_update(conversation(target, 1, Some(at(50 + round as i64))), None);

            let unique: HashSet<_> = list.iter().map(|c| c.id.clone()).collect();
            assert_eq!(unique.len(), list.len());
        }
    }

    #[test]
    fn conversation_update_upserts_and_repositions() {
        let mut list = ConversationList::seeded(vec![
            conversation("a", 0, Some(at(9))),
            conversation("b", 0, Some(at(5))),
        ]);

        let idx = list.apply_conversation_update(conversation("c", 2, Some(at(7))), None);
        assert_eq!(idx, 1);
        assert_eq!(ids(&list), vec!["a", "c", "b"]);

        let idx = list.apply_conversation_update(conversation("b", 4, Some(at(12))), Some("b"));
        assert_eq!(idx, 0);
        assert_eq!(ids(&list), vec!["b", "a", "c"]);
        assert_eq!(list.get("b").unwrap().unread_count, 0);

        let mut renamed = conversation("c", 3, Some(at(7)));
        renamed.contact.name = "Renamed".into();
        assert_eq!(list.apply_conversation_update(renamed, None), 2);
        assert_eq!(list.get("c").unwrap().display_name(), "Renamed");
    }

    #[test]
    fn mark_read_remove_and_rename() {
        let mut list = ConversationList::seeded(vec![
            conversation("a", 6, Some(at(2))),
            conversation("b", 1, Some(at(1))),
        ]);
        assert_eq!(list.total_unread(), 7);

        assert_eq!(list.mark_read("a"), Some(6));
        assert_eq!(list.mark_read("a"), Some(0));
        assert_eq!(list.mark_read("missing"), None);

        assert_eq!(list.rename_contact("contact-b", "Bea"), 1);
        assert_eq!(list.get("b").unwrap().display_name(), "Bea");

        assert!(list.remove("b").is_some());
        assert_eq!(list.total_unread(), 0);
        assert_eq!(ids(&list), vec!["a"]);
    }
}
