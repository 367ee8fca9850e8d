//! Message stream of the active conversation plus its composer.

use tracing::error;
use uuid::Uuid;

use crate::{
    backend::MessageStore,
    model::{Message, NewMessage},
};

use super::ChatError;

/// Identifies one load of one partner's thread. Completions carrying an
/// older ticket belong to a superseded selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    partner: Uuid,
    epoch: u64,
}

impl Ticket {
    pub fn partner(&self) -> Uuid {
        self.partner
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Status {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum ThreadView<'a> {
    /// No partner selected.
    Placeholder,
    Loading,
    Failed(&'a str),
    /// History loaded and empty.
    Empty,
    Messages(&'a [Message]),
}

#[derive(Debug)]
pub struct Thread {
    me: Uuid,
    partner: Option<Uuid>,
    epoch: u64,
    status: Status,
    messages: Vec<Message>,
}

pub async fn load_history<S: MessageStore + ?Sized>(
    store: &S,
    me: Uuid,
    partner: Uuid,
) -> anyhow::Result<Vec<Message>> {
    store.conversation(me, partner).await
}

impl Thread {
    pub fn new(me: Uuid) -> Self {
        Self {
            me,
            partner: None,
            epoch: 0,
            status: Status::Idle,
            messages: Vec::new(),
        }
    }

    pub fn partner(&self) -> Option<Uuid> {
        self.partner
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_sent(&self, message: &Message) -> bool {
        message.sender_id == self.me
    }

    pub fn ticket(&self) -> Option<Ticket> {
        self.partner.map(|partner| Ticket {
            partner,
            epoch: self.epoch,
        })
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.ticket() == Some(ticket)
    }

    /// Discards the previous thread wholesale and starts loading `partner`.
    pub fn begin(&mut self, partner: Uuid) -> Ticket {
        self.epoch += 1;
        self.partner = Some(partner);
        self.status = Status::Loading;
        self.messages.clear();
        Ticket {
            partner,
            epoch: self.epoch,
        }
    }

    pub fn clear(&mut self) {
        self.epoch += 1;
        self.partner = None;
        self.status = Status::Idle;
        self.messages.clear();
    }

    /// Returns `false` for a stale response, which is dropped untouched.
    pub fn apply_history(&mut self, ticket: Ticket, result: anyhow::Result<Vec<Message>>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }

        match result {
            Ok(mut history) => {
                // appends that raced the load and are not part of it yet
                let pending: Vec<_> = std::mem::take(&mut self.messages)
                    .into_iter()
                    .filter(|m| !history.iter().any(|h| h.id == m.id))
                    .collect();
                history.extend(pending);
                self.messages = history;
                self.status = Status::Ready;
            }
            Err(e) => {
                error!("Error loading messages: {e:#}");
                self.status = Status::Failed(ChatError::HistoryLoad(e).to_string());
            }
        }
        true
    }

    /// Optimistic append of a message this client just wrote.
    pub fn append_sent(&mut self, ticket: Ticket, message: Message) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Accepts only partner → me inserts; everything else on the feed is cross-talk.
    pub fn ingest(&mut self, message: Message) -> bool {
        if self.partner != Some(message.sender_id) || message.receiver_id != self.me {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn draft(&self, content: &str) -> Option<NewMessage> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        Some(NewMessage {
            sender_id: self.me,
            receiver_id: self.partner?,
            content: content.to_owned(),
        })
    }

    pub fn view(&self) -> ThreadView<'_> {
        if !self.messages.is_empty() {
            return ThreadView::Messages(&self.messages);
        }
        match &self.status {
            Status::Idle => ThreadView::Placeholder,
            Status::Loading => ThreadView::Loading,
            Status::Failed(e) => ThreadView::Failed(e),
            Status::Ready => ThreadView::Empty,
        }
    }
}

/// Input affordances around one in-flight write.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Composer {
    busy: bool,
    error: Option<String>,
}

impl Composer {
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns `false` while a write is already in flight.
    pub fn begin(&mut self) -> bool {
        if self.busy {
            return false;
        }
        self.busy = true;
        self.error = None;
        true
    }

    pub fn finish(&mut self, error: Option<String>) {
        self.busy = false;
        self.error = error;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
