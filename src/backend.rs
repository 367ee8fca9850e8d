pub mod sqlite;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::{
    chat::AuthError,
    model::{Message, NewMessage, Profile, ProfileAttributes, RealtimeEvent, Session},
};

pub use sqlite::SqliteBackend;

/// Identity provider: issues and destroys sessions.
#[async_trait]
pub trait Auth {
    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session, AuthError>;
    async fn sign_up(
        &self,
        identifier: &str,
        secret: &str,
        attributes: ProfileAttributes,
    ) -> Result<Session, AuthError>;
    async fn sign_out(&self, session: &Session) -> anyhow::Result<()>;

    /// Resolves a previously issued token, `None` once it was signed out.
    async fn restore(&self, token: Uuid) -> anyhow::Result<Option<Session>>;

    /// Session transitions for one token. The receiver starts at the current state.
    async fn on_session_change(
        &self,
        token: Uuid,
    ) -> anyhow::Result<watch::Receiver<Option<Session>>>;
}

#[async_trait]
pub trait ProfileStore {
    async fn profile(&self, id: Uuid) -> anyhow::Result<Option<Profile>>;
    async fn profiles_except(&self, id: Uuid) -> anyhow::Result<Vec<Profile>>;
}

#[async_trait]
pub trait MessageStore {
    /// Both directions of the pair, oldest first.
    async fn conversation(&self, me: Uuid, partner: Uuid) -> anyhow::Result<Vec<Message>>;
    async fn insert_message(&self, message: NewMessage) -> anyhow::Result<Message>;
}

/// Push channel of message-table inserts.
#[async_trait]
pub trait RealtimeFeed {
    type Handle: Send + 'static;

    async fn subscribe(
        &self,
        channel: &str,
        sink: mpsc::UnboundedSender<RealtimeEvent>,
    ) -> anyhow::Result<Self::Handle>;
    async fn unsubscribe(&self, handle: Self::Handle) -> anyhow::Result<()>;
}

pub trait Backend:
    Auth + ProfileStore + MessageStore + RealtimeFeed + Clone + Send + Sync + 'static
{
}

impl<T> Backend for T where
    T: Auth + ProfileStore + MessageStore + RealtimeFeed + Clone + Send + Sync + 'static
{
}
