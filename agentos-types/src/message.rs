//! Inter-agent [`Message`] model for the [`MessageBus`](crate).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Request,
    Inform,
    Broadcast,
    Response,
}

/// Ordered `CRITICAL > HIGH > NORMAL > LOW`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Delivered,
    Read,
    DeadLettered,
}

/// Recipient addressing: a single agent, an explicit fan-out list, or (when
/// `message_type = Broadcast` and this is `None`) everyone but the sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Recipient {
    Agent(String),
    List(Vec<String>),
    AllExceptSender,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub recipient: Recipient,
    pub message_type: MessageType,
    pub priority: MessagePriority,
    pub payload: serde_json::Value,
    pub correlation_id: Option<String>,
    pub delivery_status: DeliveryStatus,
    pub tags: Vec<String>,
    pub queued_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        recipient: Recipient,
        message_type: MessageType,
        priority: MessagePriority,
        payload: serde_json::Value,
    ) -> Self {
        Message {
            id: id.into(),
            sender: sender.into(),
            recipient,
            message_type,
            priority,
            payload,
            correlation_id: None,
            delivery_status: DeliveryStatus::Queued,
            tags: Vec::new(),
            queued_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_matches_spec() {
        assert!(MessagePriority::Critical > MessagePriority::High);
        assert!(MessagePriority::High > MessagePriority::Normal);
        assert!(MessagePriority::Normal > MessagePriority::Low);
    }
}
