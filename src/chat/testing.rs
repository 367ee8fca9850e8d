use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, mpsc, watch};
use uuid::Uuid;

use crate::{
    backend::{Auth, MessageStore, ProfileStore, RealtimeFeed},
    model::{Message, NewMessage, Profile, ProfileAttributes, RealtimeEvent, Session},
};

use super::{AuthError, identity};

pub fn profile(username: &str, full_name: &str) -> Profile {
    Profile {
        id: Uuid::now_v7(),
        username: username.into(),
        full_name: full_name.into(),
    }
}

pub fn message(sender_id: Uuid, receiver_id: Uuid, content: &str) -> Message {
    Message {
        id: Uuid::now_v7(),
        sender_id,
        receiver_id,
        content: content.into(),
        created_at: OffsetDateTime::now_utc(),
    }
}

#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub sign_ups: usize,
    pub sign_outs: usize,
    pub last_identifier: Option<String>,
    pub directory_loads: usize,
    pub history_loads: usize,
    pub inserts: usize,
    pub subscribes: usize,
    pub unsubscribes: usize,
    pub live: usize,
    pub max_live: usize,
}

#[derive(Default)]
struct State {
    calls: Calls,
    profiles: Vec<Profile>,
    messages: Vec<Message>,
    fail_profile: bool,
    fail_directory: bool,
    fail_history: bool,
    fail_send: bool,
}

/// Records every call; the feed counts handles but never delivers.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

#[derive(Debug)]
pub struct FakeHandle;

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn calls(&self) -> Calls {
        self.state.lock().await.calls.clone()
    }

    pub async fn add_user(&self, username: &str, full_name: &str) -> Profile {
        let profile = profile(username, full_name);
        self.state.lock().await.profiles.push(profile.clone());
        profile
    }

    pub async fn add_message(&self, sender_id: Uuid, receiver_id: Uuid, content: &str) {
        self.state
            .lock()
            .await
            .messages
            .push(message(sender_id, receiver_id, content));
    }

    pub async fn session_for(&self, profile: &Profile) -> Session {
        Session {
            token: Uuid::new_v4(),
            user_id: profile.id,
        }
    }

    pub async fn fail_profile(&self, fail: bool) {
        self.state.lock().await.fail_profile = fail;
    }

    pub async fn fail_directory(&self, fail: bool) {
        self.state.lock().await.fail_directory = fail;
    }

    pub async fn fail_history(&self, fail: bool) {
        self.state.lock().await.fail_history = fail;
    }

    pub async fn fail_send(&self, fail: bool) {
        self.state.lock().await.fail_send = fail;
    }
}

#[async_trait]
impl Auth for FakeBackend {
    async fn sign_in(&self, identifier: &str, _secret: &str) -> Result<Session, AuthError> {
        let mut state = self.state.lock().await;
        state.calls.last_identifier = Some(identifier.to_owned());
        let user_id = state
            .profiles
            .iter()
            .find(|p| identity::identifier_for(&p.username, identity::DEFAULT_DOMAIN) == identifier)
            .map(|p| p.id)
            .ok_or(AuthError::InvalidCredentials)?;
        Ok(Session {
            token: Uuid::new_v4(),
            user_id,
        })
    }

    async fn sign_up(
        &self,
        identifier: &str,
        _secret: &str,
        attributes: ProfileAttributes,
    ) -> Result<Session, AuthError> {
        let mut state = self.state.lock().await;
        state.calls.sign_ups += 1;
        state.calls.last_identifier = Some(identifier.to_owned());
        if state.profiles.iter().any(|p| p.username == attributes.username) {
            return Err(AuthError::UsernameTaken);
        }
        let created = profile(&attributes.username, &attributes.full_name);
        state.profiles.push(created.clone());
        Ok(Session {
            token: Uuid::new_v4(),
            user_id: created.id,
        })
    }

    async fn sign_out(&self, _session: &Session) -> anyhow::Result<()> {
        self.state.lock().await.calls.sign_outs += 1;
        Ok(())
    }

    async fn restore(&self, _token: Uuid) -> anyhow::Result<Option<Session>> {
        Ok(None)
    }

    async fn on_session_change(
        &self,
        _token: Uuid,
    ) -> anyhow::Result<watch::Receiver<Option<Session>>> {
        Ok(watch::channel(None).1)
    }
}

#[async_trait]
impl ProfileStore for FakeBackend {
    async fn profile(&self, id: Uuid) -> anyhow::Result<Option<Profile>> {
        let state = self.state.lock().await;
        if state.fail_profile {
            return Err(anyhow!("profile lookup failed"));
        }
        Ok(state.profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn profiles_except(&self, id: Uuid) -> anyhow::Result<Vec<Profile>> {
        let mut state = self.state.lock().await;
        state.calls.directory_loads += 1;
        if state.fail_directory {
            return Err(anyhow!("directory lookup failed"));
        }
        Ok(state.profiles.iter().filter(|p| p.id != id).cloned().collect())
    }
}

#[async_trait]
impl MessageStore for FakeBackend {
    async fn conversation(&self, me: Uuid, partner: Uuid) -> anyhow::Result<Vec<Message>> {
        let mut state = self.state.lock().await;
        state.calls.history_loads += 1;
        if state.fail_history {
            return Err(anyhow!("history lookup failed"));
        }
        Ok(state
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == me && m.receiver_id == partner)
                    || (m.sender_id == partner && m.receiver_id == me)
            })
            .cloned()
            .collect())
    }

    async fn insert_message(&self, new: NewMessage) -> anyhow::Result<Message> {
        let mut state = self.state.lock().await;
        state.calls.inserts += 1;
        if state.fail_send {
            return Err(anyhow!("insert failed"));
        }
        let stored = message(new.sender_id, new.receiver_id, &new.content);
        state.messages.push(stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl RealtimeFeed for FakeBackend {
    type Handle = FakeHandle;

    async fn subscribe(
        &self,
        _channel: &str,
        _sink: mpsc::UnboundedSender<RealtimeEvent>,
    ) -> anyhow::Result<FakeHandle> {
        let mut state = self.state.lock().await;
        state.calls.subscribes += 1;
        state.calls.live += 1;
        state.calls.max_live = state.calls.max_live.max(state.calls.live);
        Ok(FakeHandle)
    }

    async fn unsubscribe(&self, _handle: FakeHandle) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.calls.unsubscribes += 1;
        state.calls.live -= 1;
        Ok(())
    }
}
