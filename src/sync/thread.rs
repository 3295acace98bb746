use super::ordered::{Keyed, OrderedMap};
use crate::infrastructure::MessagePage;
use crate::model::{DeliveryStatus, Message, MessageDraft, StatusUpdate};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

impl Keyed for Message {
    type Key = str;

    fn key(&self) -> &str {
        &self.id
    }
}

fn oldest_first(a: &Message, b: &Message) -> Ordering {
    a.created_at.cmp(&b.created_at)
}

/// A rendered row of the thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadItem<'a> {
    DateSeparator(NaiveDate),
    Message(&'a Message),
}

/// Messages of the conversation currently open, oldest first.
#[derive(Debug)]
pub struct ActiveThread {
    conversation_id: String,
    messages: OrderedMap<Message>,
    drafts: HashMap<String, MessageDraft>,
    loaded_pages: u32,
    has_more: bool,
}

impl ActiveThread {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: OrderedMap::new(),
            drafts: HashMap::new(),
            loaded_pages: 0,
            has_more: false,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Replace history with the newest page. Local optimistic entries survive.
    pub fn seed(&mut self, mut page: MessagePage) {
        page.stamp_conversation(&self.conversation_id);
        let local: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.is_temporary())
            .cloned()
            .collect();

        self.messages = OrderedMap::from_unordered(page.results.into_iter().chain(local), oldest_first);
        self.loaded_pages = 1;
        self.has_more = page.next.is_some();
        debug!(
            "Thread {} seeded with {} messages",
            self.conversation_id,
            self.messages.len()
        );
    }

    /// Fold a fresh copy of the newest page into the thread.
    ///
    /// Older pages already loaded stay. Known messages take the page's
    /// delivery status and unseen ones are inserted in order. A thread with
    /// nothing loaded yet is seeded instead.
    pub fn merge_latest(&mut self, mut page: MessagePage) -> usize {
        if self.loaded_pages == 0 {
            let count = page.results.len();
            self.seed(page);
            return count;
        }
        page.stamp_conversation(&self.conversation_id);
        let mut added = 0;
        for message in page.results {
            if let Some(known) = self.messages.get_mut(message.id.as_str()) {
                known.delivery_status = message.delivery_status;
                continue;
            }
            self.messages.insert_ordered(message, oldest_first);
            added += 1;
        }
        if self.loaded_pages == 1 {
            self.has_more = page.next.is_some();
        }
        added
    }

    /// Merge an older page. Messages already present are kept as they are.
    pub fn prepend_page(&mut self, mut page: MessagePage) -> usize {
        page.stamp_conversation(&self.conversation_id);
        let mut added = 0;
        for message in page.results {
            if self.messages.append_if_absent(message) {
                added += 1;
            }
        }
        self.messages.sort_by(oldest_first);
        self.loaded_pages += 1;
        self.has_more = page.next.is_some();
        added
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Page number to request for older history, if any remains.
    pub fn next_page(&self) -> Option<u32> {
        (self.loaded_pages == 0 || self.has_more).then_some(self.loaded_pages + 1)
    }

    /// Returns `false` for a duplicate or a message of another conversation.
    pub fn apply_new_message(&mut self, message: Message) -> bool {
        if message.conversation_id != self.conversation_id || self.messages.contains(message.id.as_str()) {
            return false;
        }
        self.messages.insert_ordered(message, oldest_first);
        true
    }

    /// Returns `false` when the message is not loaded.
    pub fn apply_status_update(&mut self, update: &StatusUpdate) -> bool {
        match self.messages.get_mut(update.message_id.as_str()) {
            Some(message) => {
                message.delivery_status = update.delivery_status;
                true
            }
            None => false,
        }
    }

    /// Render a pending copy of `draft`. Returns its temporary id.
    pub fn begin_send(&mut self, draft: MessageDraft, now: DateTime<Utc>) -> String {
        let pending = draft.to_pending_message(&self.conversation_id, now);
        let temp_id = pending.id.clone();
        self.messages.insert_ordered(pending, oldest_first);
        self.drafts.insert(temp_id.clone(), draft);
        temp_id
    }

    /// Swap the pending entry for the server's copy.
    ///
    /// If the server copy already arrived over the socket the pending entry is
    /// dropped and the delivered copy kept. The server timestamp may differ
    /// from the local one, so the thread is re-sorted afterwards.
    pub fn confirm_send(&mut self, temp_id: &str, mut server: Message) -> bool {
        let Some(idx) = self.messages.position(temp_id) else {
            return false;
        };
        self.drafts.remove(temp_id);
        if server.conversation_id.is_empty() {
            server.conversation_id = self.conversation_id.clone();
        }
        self.messages.replace_at(idx, server);
        self.messages.sort_by(oldest_first);
        true
    }

    pub fn fail_send(&mut self, temp_id: &str) -> bool {
        match self.messages.get_mut(temp_id) {
            Some(message) if message.delivery_status == DeliveryStatus::Pending => {
                message.delivery_status = DeliveryStatus::Failed;
                true
            }
            Some(message) => {
                warn!(
                    "Ignoring failure for {} in state {}",
                    temp_id,
                    message.delivery_status.as_str()
                );
                false
            }
            None => false,
        }
    }

    fn is_failed(&self, temp_id: &str) -> bool {
        self.messages
            .get(temp_id)
            .is_some_and(|m| m.delivery_status == DeliveryStatus::Failed)
    }

    /// Draft of a failed send. The entry stays until [`Self::discard_failed`].
    pub fn failed_draft(&self, temp_id: &str) -> Option<&MessageDraft> {
        if !self.is_failed(temp_id) {
            return None;
        }
        self.drafts.get(temp_id)
    }

    /// Drop a failed entry once its draft was sent again.
    pub fn discard_failed(&mut self, temp_id: &str) -> bool {
        if !self.is_failed(temp_id) {
            return false;
        }
        self.messages.remove(temp_id);
        self.drafts.remove(temp_id);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.get(id)
    }

    pub fn messages(&self) -> &[Message] {
        self.messages.as_slice()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages with a separator before the first message of each local day.
    pub fn timeline<Tz: TimeZone>(&self, tz: &Tz) -> Vec<ThreadItem<'_>> {
        let mut items = Vec::with_capacity(self.messages.len() + 4);
        let mut current: Option<NaiveDate> = None;
        for message in self.messages.iter() {
            let day = message.created_at.with_timezone(tz).date_naive();
            if current != Some(day) {
                items.push(ThreadItem::DateSeparator(day));
                current = Some(day);
            }
            items.push(ThreadItem::Message(message));
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;
    use crate::sync::testing::{at, incoming, message};
    use chrono::FixedOffset;

    fn page(results: Vec<Message>, next: bool) -> MessagePage {
        MessagePage {
            count: results.len() as u64,
            next: next.then(|| "next".to_string()),
            previous: None,
            results,
        }
    }

    fn ids(thread: &ActiveThread) -> Vec<&str> {
        thread.messages().iter().map(|m| m.id.as_str()).collect()
    }

    fn text(body: &str) -> MessageDraft {
        MessageDraft::Text { body: body.into() }
    }

    #[test]
    fn seed_sorts_ascending_and_stamps_conversation() {
        let mut thread = ActiveThread::new("c1");
        let unstamped = incoming("m2", "", at(2));

        thread.seed(page(vec![incoming("m3", "c1", at(3)), unstamped, incoming("m1", "c1", at(1))], true));

        assert_eq!(ids(&thread), vec!["m1", "m2", "m3"]);
        assert_eq!(thread.get("m2").unwrap().conversation_id, "c1");
        assert_eq!(thread.next_page(), Some(2));
    }

    #[test]
    fn duplicate_new_message_is_discarded() {
        let mut thread = ActiveThread::new("c1");
        thread.seed(page(vec![incoming("m1", "c1", at(1))], false));

        assert!(thread.apply_new_message(incoming("m2", "c1", at(2))));
        assert!(!thread.apply_new_message(incoming("m2", "c1", at(2))));
        assert!(!thread.apply_new_message(incoming("m9", "other", at(3))));
        assert_eq!(ids(&thread), vec!["m1", "m2"]);
    }

    #[test]
    fn status_update_for_unloaded_message_is_a_no_op() {
        let mut thread = ActiveThread::new("c1");
        thread.seed(page(vec![message("m1", "c1", Direction::Outgoing, at(1))], false));

        let unknown = StatusUpdate {
            message_id: "nope".into(),
            delivery_status: DeliveryStatus::Read,
        };
        assert!(!thread.apply_status_update(&unknown));

        let known = StatusUpdate {
            message_id: "m1".into(),
            delivery_status: DeliveryStatus::Delivered,
        };
        assert!(thread.apply_status_update(&known));
        assert_eq!(thread.get("m1").unwrap().delivery_status, DeliveryStatus::Delivered);
    }

    #[test]
    fn confirm_replaces_pending_entry_in_place() {
        let mut thread = ActiveThread::new("c1");
        thread.seed(page(vec![incoming("m1", "c1", at(1))], false));

        let temp = thread.begin_send(text("hola"), at(5));
        assert_eq!(thread.get(&temp).unwrap().delivery_status, DeliveryStatus::Pending);

        let server = message("srv-1", "c1", Direction::Outgoing, at(6));
        assert!(thread.confirm_send(&temp, server));
        assert_eq!(ids(&thread), vec!["m1", "srv-1"]);
        assert!(thread.failed_draft("srv-1").is_none());
    }

    #[test]
    fn confirm_with_later_server_time_keeps_thread_ascending() {
        let mut thread = ActiveThread::new("c1");
        let temp = thread.begin_send(text("hola"), at(5));
        assert!(thread.apply_new_message(incoming("m6", "c1", at(6))));
        assert_eq!(ids(&thread), vec![temp.as_str(), "m6"]);

        let server = message("srv-1", "c1", Direction::Outgoing, at(7));
        assert!(thread.confirm_send(&temp, server));

        assert_eq!(ids(&thread), vec!["m6", "srv-1"]);
        assert!(thread.apply_new_message(incoming("m8", "c1", at(6))));
        assert_eq!(ids(&thread), vec!["m6", "m8", "srv-1"]);
    }

    #[test]
    fn echo_before_confirm_leaves_single_copy_with_latest_status() {
        let mut thread = ActiveThread::new("c1");
        let temp = thread.begin_send(text("hola"), at(5));

        let echo = message("srv-1", "c1", Direction::Outgoing, at(5));
        assert!(thread.apply_new_message(echo.clone()));
        thread.apply_status_update(&StatusUpdate {
            message_id: "srv-1".into(),
            delivery_status: DeliveryStatus::Delivered,
        });

        assert!(thread.confirm_send(&temp, echo));

        assert_eq!(ids(&thread), vec!["srv-1"]);
        assert_eq!(thread.get("srv-1").unwrap().delivery_status, DeliveryStatus::Delivered);
    }

    #[test]
    fn echo_after_confirm_is_discarded() {
        let mut thread = ActiveThread::new("c1");
        let temp = thread.begin_send(text("hola"), at(5));
        let server = message("srv-1", "c1", Direction::Outgoing, at(5));

        thread.confirm_send(&temp, server.clone());
        assert!(!thread.apply_new_message(server));
        assert_eq!(thread.len(), 1);
    }

    #[test]
    fn failed_send_stays_visible_until_retried() {
        let mut thread = ActiveThread::new("c1");
        let temp = thread.begin_send(text("hola"), at(5));

        assert!(thread.fail_send(&temp));
        assert!(!thread.fail_send(&temp));
        assert_eq!(thread.get(&temp).unwrap().delivery_status, DeliveryStatus::Failed);

        assert_eq!(thread.failed_draft(&temp), Some(&text("hola")));
        assert_eq!(thread.len(), 1);
        assert!(thread.discard_failed(&temp));
        assert!(thread.is_empty());
        assert_eq!(thread.failed_draft(&temp), None);
        assert!(!thread.discard_failed(&temp));
    }

    #[test]
    fn reseed_keeps_optimistic_entries() {
        let mut thread = ActiveThread::new("c1");
        let temp = thread.begin_send(text("hola"), at(5));

        thread.seed(page(vec![incoming("m1", "c1", at(1))], false));

        assert_eq!(ids(&thread), vec!["m1", temp.as_str()]);
    }

    #[test]
    fn older_pages_merge_without_duplicates() {
        let mut thread = ActiveThread::new("c1");
        thread.seed(page(vec![incoming("m3", "c1", at(3)), incoming("m4", "c1", at(4))], true));

        let added = thread.prepend_page(page(vec![incoming("m1", "c1", at(1)), incoming("m3", "c1", at(3))], false));

        assert_eq!(added, 1);
        assert_eq!(ids(&thread), vec!["m1", "m3", "m4"]);
        assert!(!thread.has_more());
        assert_eq!(thread.next_page(), None);
    }

    #[test]
    fn refreshing_the_newest_page_keeps_older_history() {
        let mut thread = ActiveThread::new("c1");
        thread.seed(page(
            vec![incoming("m3", "c1", at(3)), message("m4", "c1", Direction::Outgoing, at(4))],
            true,
        ));
        thread.prepend_page(page(vec![incoming("m1", "c1", at(1)), incoming("m2", "c1", at(2))], false));

        let mut read = message("m4", "c1", Direction::Outgoing, at(4));
        read.delivery_status = DeliveryStatus::Read;
        let added = thread.merge_latest(page(vec![read, incoming("m5", "c1", at(5))], true));

        assert_eq!(added, 1);
        assert_eq!(ids(&thread), vec!["m1", "m2", "m3", "m4", "m5"]);
        assert_eq!(thread.get("m4").unwrap().delivery_status, DeliveryStatus::Read);
        assert_eq!(thread.next_page(), None);
    }

    #[test]
    fn merge_into_an_empty_thread_seeds_it() {
        let mut thread = ActiveThread::new("c1");
        thread.merge_latest(page(vec![incoming("m2", "c1", at(2)), incoming("m1", "c1", at(1))], true));

        assert_eq!(ids(&thread), vec!["m1", "m2"]);
        assert_eq!(thread.next_page(), Some(2));
    }

    #[test]
    fn timeline_splits_days_in_the_given_zone() {
        let mut thread = ActiveThread::new("c1");
        // 09:00Z on May 1st and 23:30Z on May 1st.
        thread.seed(page(vec![incoming("m1", "c1", at(0)), incoming("m2", "c1", at(14 * 60 + 30))], false));

        let utc = thread.timeline(&Utc);
        assert_eq!(utc.len(), 3);

        let bogota = FixedOffset::west_opt(5 * 3600).unwrap();
        let local = thread.timeline(&bogota);
        assert_eq!(local.len(), 3);

        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let shifted = thread.timeline(&tokyo);
        assert_eq!(shifted.len(), 4);
        assert_eq!(
            shifted[2],
            ThreadItem::DateSeparator(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap())
        );
    }
}
