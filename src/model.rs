use time::OffsetDateTime;
use uuid::Uuid;

/// An authenticated session issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    // unique, never contains '@'
    pub username: String,
    pub full_name: String,
}

impl Profile {
    pub fn initial(&self) -> char {
        self.full_name
            .chars()
            .next()
            .and_then(|c| c.to_uppercase().next())
            .unwrap_or('?')
    }
}

/// Attributes attached to a new account at sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileAttributes {
    pub username: String,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
}

/// A row-insert notification delivered on a realtime channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeEvent {
    pub channel: String,
    pub message: Message,
}

/// Unordered participant pair identifying a two-party thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    low: Uuid,
    high: Uuid,
}

impl ConversationKey {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// Channel key for the insert feed of this thread, as seen from `me`.
    pub fn channel(&self, me: Uuid) -> String {
        let partner = if self.low == me { self.high } else { self.low };
        format!("public:messages:chat_with_{partner}_{me}")
    }
}
