//! MessageBus: bounded per-agent priority mailboxes with
//! dead-letter and broadcast semantics. `send` and `receive` are both
//! non-blocking — blocking receive is out
//! of scope.

use std::collections::VecDeque;

use agentos_types::{DeliveryStatus, Message, MessagePriority, MessageType, Recipient};
use dashmap::DashMap;

/// Default per-agent mailbox capacity before the oldest lowest-priority
/// message is dropped to a dead letter.
const DEFAULT_MAILBOX_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct BusStats {
    pub registered_agents: u64,
    pub total_queued: u64,
    pub dead_letters: u64,
}

struct Mailbox {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl Mailbox {
    fn new(capacity: usize) -> Self {
        Mailbox { messages: VecDeque::new(), capacity }
    }

    /// Inserts keeping `messages` sorted by priority descending, then FIFO
    /// within a priority class.
    fn insert(&mut self, message: Message) {
        let pos = self
            .messages
            .iter()
            .position(|m| m.priority < message.priority)
            .unwrap_or(self.messages.len());
        self.messages.insert(pos, message);
    }
}

/// A registered callback subscription:
/// `callback` fires synchronously for every delivered message matching both
/// filters (`None` means "match everything" for that filter).
struct Subscription {
    callback: Box<dyn Fn(&Message) + Send + Sync>,
    message_types: Option<Vec<MessageType>>,
    topic_tags: Option<Vec<String>>,
}

impl Subscription {
    fn matches(&self, message: &Message) -> bool {
        let type_ok = self
            .message_types
            .as_ref()
            .map(|types| types.contains(&message.message_type))
            .unwrap_or(true);
        let tag_ok = self
            .topic_tags
            .as_ref()
            .map(|tags| tags.iter().any(|t| message.tags.contains(t)))
            .unwrap_or(true);
        type_ok && tag_ok
    }
}

pub struct MessageBus {
    mailboxes: DashMap<String, Mailbox>,
    dead_letters: std::sync::Mutex<VecDeque<Message>>,
    subscribers: std::sync::RwLock<Vec<(String, Subscription)>>,
    mailbox_capacity: usize,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

impl MessageBus {
    pub fn new(mailbox_capacity: usize) -> Self {
        MessageBus {
            mailboxes: DashMap::new(),
            dead_letters: std::sync::Mutex::new(VecDeque::new()),
            subscribers: std::sync::RwLock::new(Vec::new()),
            mailbox_capacity,
        }
    }

    pub fn register_agent(&self, agent_id: &str) {
        self.mailboxes
            .entry(agent_id.to_string())
            .or_insert_with(|| Mailbox::new(self.mailbox_capacity));
    }

    /// Leaves no trace in `mailboxes`, so an unregistered agent cannot cause
    /// unbounded memory growth.
    pub fn unregister_agent(&self, agent_id: &str) {
        self.mailboxes.remove(agent_id);
    }

    /// Registers a callback that fires synchronously, in subscription order,
    /// for every delivered message matching `message_types`/`topic_tags`
    pub fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        callback: Box<dyn Fn(&Message) + Send + Sync>,
        message_types: Option<Vec<MessageType>>,
        topic_tags: Option<Vec<String>>,
    ) {
        self.subscribers
            .write()
            .unwrap()
            .push((subscriber_id.into(), Subscription { callback, message_types, topic_tags }));
    }

    pub fn unsubscribe(&self, subscriber_id: &str) {
        self.subscribers.write().unwrap().retain(|(id, _)| id != subscriber_id);
    }

    fn notify_subscribers(&self, message: &Message) {
        for (_, sub) in self.subscribers.read().unwrap().iter() {
            if !sub.matches(message) {
                continue;
            }
            let callback: &(dyn Fn(&Message) + Send + Sync) = sub.callback.as_ref();
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(message)));
        }
    }

    fn dead_letter(&self, message: Message) {
        let mut message = message;
        message.delivery_status = DeliveryStatus::DeadLettered;
        self.dead_letters.lock().unwrap().push_back(message);
    }

    /// Non-blocking enqueue. A recipient id of `""` always goes
    /// to the dead-letter queue; any other unregistered recipient is
    /// auto-registered.
    pub fn send(&self, message: Message) {
        let targets: Vec<String> = match &message.recipient {
            Recipient::Agent(id) => vec![id.clone()],
            Recipient::List(ids) => ids.clone(),
            Recipient::AllExceptSender => self
                .mailboxes
                .iter()
                .map(|e| e.key().clone())
                .filter(|id| id != &message.sender)
                .collect(),
        };

        if targets.is_empty() {
            self.dead_letter(message);
            return;
        }

        for target in targets {
            if target.is_empty() {
                self.dead_letter(clone_for(&message, target));
                continue;
            }
            self.register_agent(&target);
            let mut mailbox = self.mailboxes.get_mut(&target).unwrap();
            let mut copy = clone_for(&message, target.clone());
            copy.delivery_status = DeliveryStatus::Delivered;
            copy.delivered_at = Some(chrono::Utc::now());
            if mailbox.messages.len() >= mailbox.capacity {
                if let Some(dropped) = mailbox.messages.pop_back() {
                    drop(mailbox);
                    self.dead_letter(dropped);
                    mailbox = self.mailboxes.get_mut(&target).unwrap();
                }
            }
            mailbox.insert(copy.clone());
            drop(mailbox);
            self.notify_subscribers(&copy);
        }
    }

    /// Non-blocking dequeue of the highest-priority message; returns `None`
    /// on an empty mailbox.
    pub fn receive(&self, agent_id: &str) -> Option<Message> {
        let mut mailbox = self.mailboxes.get_mut(agent_id)?;
        let mut message = mailbox.messages.pop_front()?;
        message.delivery_status = DeliveryStatus::Read;
        message.read_at = Some(chrono::Utc::now());
        Some(message)
    }

    pub fn receive_all(&self, agent_id: &str, limit: usize) -> Vec<Message> {
        let mut out = Vec::new();
        while out.len() < limit {
            match self.receive(agent_id) {
                Some(m) => out.push(m),
                None => break,
            }
        }
        out
    }

    pub fn peek(&self, agent_id: &str) -> Option<Message> {
        self.mailboxes.get(agent_id)?.messages.front().cloned()
    }

    pub fn clear_agent_mailbox(&self, agent_id: &str) {
        if let Some(mut mailbox) = self.mailboxes.get_mut(agent_id) {
            mailbox.messages.clear();
        }
    }

    pub fn get_dead_letters(&self) -> Vec<Message> {
        self.dead_letters.lock().unwrap().iter().cloned().collect()
    }

    pub fn clear_dead_letters(&self) {
        self.dead_letters.lock().unwrap().clear();
    }

    pub fn get_stats(&self) -> BusStats {
        BusStats {
            registered_agents: self.mailboxes.len() as u64,
            total_queued: self.mailboxes.iter().map(|e| e.value().messages.len() as u64).sum(),
            dead_letters: self.dead_letters.lock().unwrap().len() as u64,
        }
    }
}

fn clone_for(message: &Message, recipient_id: String) -> Message {
    let mut copy = message.clone();
    copy.recipient = Recipient::Agent(recipient_id);
    copy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender: &str, recipient: Recipient, priority: MessagePriority) -> Message {
        Message::new(
            uuid::Uuid::new_v4().to_string(),
            sender,
            recipient,
            MessageType::Inform,
            priority,
            serde_json::json!({"hello": "world"}),
        )
    }

    #[test]
    fn higher_priority_delivered_before_lower() {
        let bus = MessageBus::default();
        bus.register_agent("a");
        bus.send(msg("s", Recipient::Agent("a".into()), MessagePriority::Low));
        bus.send(msg("s", Recipient::Agent("a".into()), MessagePriority::Critical));
        let first = bus.receive("a").unwrap();
        assert_eq!(first.priority, MessagePriority::Critical);
    }

    #[test]
    fn same_priority_preserves_send_order() {
        let bus = MessageBus::default();
        bus.register_agent("a");
        let m1 = msg("s", Recipient::Agent("a".into()), MessagePriority::Normal);
        let m2 = msg("s", Recipient::Agent("a".into()), MessagePriority::Normal);
        let id1 = m1.id.clone();
        let id2 = m2.id.clone();
        bus.send(m1);
        bus.send(m2);
        assert_eq!(bus.receive("a").unwrap().id, id1);
        assert_eq!(bus.receive("a").unwrap().id, id2);
    }

    #[test]
    fn empty_recipient_is_dead_lettered() {
        let bus = MessageBus::default();
        bus.send(msg("s", Recipient::Agent(String::new()), MessagePriority::Normal));
        assert_eq!(bus.get_dead_letters().len(), 1);
        assert_eq!(bus.get_stats().total_queued, 0);
    }

    #[test]
    fn unregistered_recipient_auto_registers() {
        let bus = MessageBus::default();
        bus.send(msg("s", Recipient::Agent("new-agent".into()), MessagePriority::Normal));
        assert!(bus.get_dead_letters().is_empty());
        assert!(bus.receive("new-agent").is_some());
    }

    #[test]
    fn register_unregister_register_leaves_empty_mailbox() {
        let bus = MessageBus::default();
        bus.register_agent("a");
        bus.send(msg("s", Recipient::Agent("a".into()), MessagePriority::Normal));
        bus.unregister_agent("a");
        bus.register_agent("a");
        assert!(bus.receive("a").is_none());
    }

    #[test]
    fn broadcast_reaches_everyone_but_sender() {
        let bus = MessageBus::default();
        bus.register_agent("a");
        bus.register_agent("b");
        bus.register_agent("c");
        bus.send(msg("a", Recipient::AllExceptSender, MessagePriority::Normal));
        assert!(bus.receive("a").is_none());
        assert!(bus.receive("b").is_some());
        assert!(bus.receive("c").is_some());
    }

    #[test]
    fn subscriber_fires_synchronously_on_matching_delivery() {
        let bus = MessageBus::default();
        let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen_clone = seen.clone();
        bus.subscribe(
            "watcher",
            Box::new(move |_m| {
                seen_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
            Some(vec![MessageType::Inform]),
            None,
        );
        bus.send(msg("s", Recipient::Agent("a".into()), MessagePriority::Normal));
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn receive_all_respects_limit() {
        let bus = MessageBus::default();
        bus.register_agent("a");
        for _ in 0..5 {
            bus.send(msg("s", Recipient::Agent("a".into()), MessagePriority::Normal));
        }
        assert_eq!(bus.receive_all("a", 3).len(), 3);
        assert_eq!(bus.receive_all("a", 10).len(), 2);
    }
}
