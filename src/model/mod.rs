use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the global counter incremented once per newly stored message.
pub const COUNTER_ALL: &str = "all";

/// Name of the counter incremented once per user receiving its first message.
pub const COUNTER_USERS: &str = "users";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub user_id: u64,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Id of the retweeted original, `None` for an original message.
    /// Immutable once set.
    pub retweet_of: Option<u64>,
    /// Fields of the raw feed item not otherwise modeled.
    #[serde(default)]
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub screen_name: String,
    pub name: Option<String>,
    #[serde(default)]
    pub raw: Value,
}

/// Read-time view of a message: the stored entity paired with its owning
/// user and, for retweets, the resolved record of the original.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub message: Message,
    pub user: User,
    pub retweet: Option<Arc<MessageRecord>>,
}

impl MessageRecord {
    pub fn is_retweet(&self) -> bool {
        self.message.retweet_of.is_some()
    }
}

/// Read-time view of a user: the stored entity paired with the records of
/// every message currently attributed to it, in store order.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub messages: Vec<Arc<MessageRecord>>,
}

/// One item as delivered by the feed, before persistence. A retweet embeds
/// the full original under `retweeted_status`.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub id: u64,
    #[serde(default, alias = "full_text")]
    pub text: String,
    #[serde(default)]
    pub created_at: Option<String>,
    pub user: IncomingUser,
    pub retweeted_status: Option<Box<IncomingMessage>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingUser {
    pub id: u64,
    #[serde(default)]
    pub screen_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IncomingMessage {
    /// Entity for this item alone; the embedded original is a separate entity.
    pub fn to_message(&self) -> Message {
        Message {
            id: self.id,
            user_id: self.user.id,
            text: self.text.clone(),
            created_at: self.created_at.as_deref().and_then(parse_created_at),
            retweet_of: self.retweeted_status.as_ref().map(|orig| orig.id),
            raw: Value::Object(self.extra.clone()),
        }
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.user.id,
            screen_name: self.user.screen_name.clone(),
            name: self.user.name.clone(),
            raw: Value::Object(self.user.extra.clone()),
        }
    }
}

/// Feed timestamps come in the classic `Wed Mar 11 09:56:36 +0000 2016`
/// shape; newer payloads use RFC 3339.
pub fn parse_created_at(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y")
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
