use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use async_trait::async_trait;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use time::{Duration, OffsetDateTime};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::{self, JoinHandle},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    chat::AuthError,
    model::{Message, NewMessage, Profile, ProfileAttributes, RealtimeEvent, Session},
    res,
};

use super::{Auth, MessageStore, ProfileStore, RealtimeFeed};

const FEED_CAPACITY: usize = 256;
pub const DEFAULT_SESSION_TTL: Duration = Duration::hours(1);

/// Relational store, identity provider and insert feed on top of one SQLite pool.
#[derive(Clone)]
pub struct SqliteBackend {
    db_pool: SqlitePool,
    tx: broadcast::Sender<Message>,
    /// Only tokens someone is watching have an entry.
    watchers: Arc<Mutex<HashMap<Uuid, watch::Sender<Option<Session>>>>>,
    /// Idle time after which a session token stops restoring.
    session_ttl: Duration,
}

/// A live forwarding task from the insert feed into one sink.
#[derive(Debug)]
pub struct FeedHandle {
    channel: String,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl SqliteBackend {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let backend = Self::new(db_pool);
        backend.migrate().await?;
        Ok(backend)
    }

    pub fn new(db_pool: SqlitePool) -> Self {
        Self {
            db_pool,
            tx: broadcast::channel(FEED_CAPACITY).0,
            watchers: Arc::default(),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_session_ttl(mut self, session_ttl: Duration) -> Self {
        self.session_ttl = session_ttl;
        self
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(res::SCHEMA).execute(&self.db_pool).await?;
        Ok(())
    }

    fn expires_at(&self, now: i64) -> i64 {
        now + self.session_ttl.whole_seconds()
    }

    async fn create_session(&self, user_id: Uuid) -> anyhow::Result<Session> {
        let session = Session {
            token: Uuid::new_v4(),
            user_id,
        };
        let now = OffsetDateTime::now_utc().unix_timestamp();
        sqlx::query("INSERT INTO sessions (token,user_id,created_at,expires_at) VALUES (?,?,?,?)")
            .bind(session.token.to_string())
            .bind(user_id.to_string())
            .bind(now)
            .bind(self.expires_at(now))
            .execute(&self.db_pool)
            .await?;
        Ok(session)
    }

    /// Tells every watcher of `token` that its session is gone.
    fn end_session(&self, token: Uuid) {
        let Ok(mut watchers) = self.watchers.lock() else {
            return;
        };
        if let Some(tx) = watchers.remove(&token) {
            tx.send_replace(None);
        }
    }

    /// Deletes expired sessions, notifies their watchers and drops watchers
    /// nobody listens to anymore.
    pub async fn sweep_expired(&self) -> anyhow::Result<usize> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let expired: Vec<(String,)> =
            sqlx::query_as("DELETE FROM sessions WHERE expires_at<=? RETURNING token")
                .bind(now)
                .fetch_all(&self.db_pool)
                .await?;
        for (token,) in &expired {
            self.end_session(Uuid::parse_str(token)?);
        }

        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.retain(|_, tx| tx.receiver_count() > 0);
        }
        if !expired.is_empty() {
            debug!("expired {} sessions", expired.len());
        }
        Ok(expired.len())
    }

    pub fn spawn_sweeper(&self, every: std::time::Duration) -> JoinHandle<()> {
        let backend = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = backend.sweep_expired().await {
                    error!("Error sweeping sessions: {e:#}");
                }
            }
        })
    }
}

/// Argon2 PHC string; the salt travels inside it.
async fn hash_secret(secret: &str) -> anyhow::Result<String> {
    let secret = secret.to_owned();
    task::spawn_blocking(move || -> anyhow::Result<String> {
        let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
            .map_err(|e| anyhow!("encoding salt: {e}"))?;
        let hash = Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| anyhow!("hashing secret: {e}"))?;
        Ok(hash.to_string())
    })
    .await?
}

async fn verify_secret(secret: &str, stored: String) -> anyhow::Result<bool> {
    let secret = secret.to_owned();
    task::spawn_blocking(move || -> anyhow::Result<bool> {
        let hash = PasswordHash::new(&stored).map_err(|e| anyhow!("stored hash: {e}"))?;
        Ok(Argon2::default()
            .verify_password(secret.as_bytes(), &hash)
            .is_ok())
    })
    .await?
}

fn unique_violation_on(err: &sqlx::Error, column: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.message().contains(column)
        }
        _ => false,
    }
}

fn to_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(millis: i64) -> anyhow::Result<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(
        millis as i128 * 1_000_000,
    )?)
}

fn profile_from_row((id, username, full_name): (String, String, String)) -> anyhow::Result<Profile> {
    Ok(Profile {
        id: Uuid::parse_str(&id)?,
        username,
        full_name,
    })
}

fn message_from_row(
    (id, sender_id, receiver_id, content, created_at): (String, String, String, String, i64),
) -> anyhow::Result<Message> {
    Ok(Message {
        id: Uuid::parse_str(&id)?,
        sender_id: Uuid::parse_str(&sender_id)?,
        receiver_id: Uuid::parse_str(&receiver_id)?,
        content,
        created_at: from_millis(created_at)?,
    })
}

#[async_trait]
impl Auth for SqliteBackend {
    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session, AuthError> {
        let Some((id, stored)): Option<(String, String)> =
            sqlx::query_as("SELECT id,password_hash FROM accounts WHERE identifier=?")
                .bind(identifier)
                .fetch_optional(&self.db_pool)
                .await
                .map_err(anyhow::Error::from)?
        else {
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_secret(secret, stored).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let user_id = Uuid::parse_str(&id).map_err(anyhow::Error::from)?;
        info!("welcome {identifier}#{user_id}");
        Ok(self.create_session(user_id).await?)
    }

    async fn sign_up(
        &self,
        identifier: &str,
        secret: &str,
        ProfileAttributes { username, full_name }: ProfileAttributes,
    ) -> Result<Session, AuthError> {
        let user_id = Uuid::now_v7();
        let password_hash = hash_secret(secret).await?;

        let mut txn = self.db_pool.begin().await.map_err(anyhow::Error::from)?;
        sqlx::query("INSERT INTO accounts (id,identifier,password_hash) VALUES (?,?,?)")
            .bind(user_id.to_string())
            .bind(identifier)
            .bind(&password_hash)
            .execute(&mut *txn)
            .await
            .map_err(|e| {
                if unique_violation_on(&e, "accounts.identifier") {
                    AuthError::AccountExists
                } else {
                    AuthError::Backend(e.into())
                }
            })?;
        sqlx::query("INSERT INTO profiles (id,username,full_name) VALUES (?,?,?)")
            .bind(user_id.to_string())
            .bind(&username)
            .bind(&full_name)
            .execute(&mut *txn)
            .await
            .map_err(|e| {
                if unique_violation_on(&e, "profiles.username") {
                    AuthError::UsernameTaken
                } else {
                    AuthError::Backend(e.into())
                }
            })?;
        txn.commit().await.map_err(anyhow::Error::from)?;

        info!("adding @{username}#{user_id}, {full_name}");
        Ok(self.create_session(user_id).await?)
    }

    async fn sign_out(&self, session: &Session) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token=?")
            .bind(session.token.to_string())
            .execute(&self.db_pool)
            .await?;
        self.end_session(session.token);
        debug!("signed out #{}", session.user_id);
        Ok(())
    }

    /// A restore counts as activity and pushes the expiry back.
    async fn restore(&self, token: Uuid) -> anyhow::Result<Option<Session>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT user_id,expires_at FROM sessions WHERE token=?")
                .bind(token.to_string())
                .fetch_optional(&self.db_pool)
                .await?;
        let Some((user_id, expires_at)) = row else {
            return Ok(None);
        };

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if expires_at <= now {
            sqlx::query("DELETE FROM sessions WHERE token=?")
                .bind(token.to_string())
                .execute(&self.db_pool)
                .await?;
            self.end_session(token);
            debug!("session #{token} expired");
            return Ok(None);
        }

        sqlx::query("UPDATE sessions SET expires_at=? WHERE token=?")
            .bind(self.expires_at(now))
            .bind(token.to_string())
            .execute(&self.db_pool)
            .await?;
        Ok(Some(Session {
            token,
            user_id: Uuid::parse_str(&user_id)?,
        }))
    }

    async fn on_session_change(
        &self,
        token: Uuid,
    ) -> anyhow::Result<watch::Receiver<Option<Session>>> {
        let current = self.restore(token).await?;
        let mut watchers = self
            .watchers
            .lock()
            .map_err(|_| anyhow!("session watchers poisoned"))?;

        if let Some(tx) = watchers.get(&token) {
            return Ok(tx.subscribe());
        }
        let (tx, rx) = watch::channel(current.clone());
        if current.is_some() {
            watchers.insert(token, tx);
        }
        Ok(rx)
    }
}

#[async_trait]
impl ProfileStore for SqliteBackend {
    async fn profile(&self, id: Uuid) -> anyhow::Result<Option<Profile>> {
        sqlx::query_as("SELECT id,username,full_name FROM profiles WHERE id=?")
            .bind(id.to_string())
            .fetch_optional(&self.db_pool)
            .await?
            .map(profile_from_row)
            .transpose()
    }

    async fn profiles_except(&self, id: Uuid) -> anyhow::Result<Vec<Profile>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT id,username,full_name FROM profiles WHERE id<>? ORDER BY full_name")
                .bind(id.to_string())
                .fetch_all(&self.db_pool)
                .await?;
        rows.into_iter().map(profile_from_row).collect()
    }
}

#[async_trait]
impl MessageStore for SqliteBackend {
    async fn conversation(&self, me: Uuid, partner: Uuid) -> anyhow::Result<Vec<Message>> {
        let rows: Vec<(String, String, String, String, i64)> = sqlx::query_as(
            "SELECT id,sender_id,receiver_id,content,created_at FROM messages \
             WHERE (sender_id=? AND receiver_id=?) OR (sender_id=? AND receiver_id=?) \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(me.to_string())
        .bind(partner.to_string())
        .bind(partner.to_string())
        .bind(me.to_string())
        .fetch_all(&self.db_pool)
        .await?;
        rows.into_iter().map(message_from_row).collect()
    }

    async fn insert_message(
        &self,
        NewMessage { sender_id, receiver_id, content }: NewMessage,
    ) -> anyhow::Result<Message> {
        let created_at = to_millis(OffsetDateTime::now_utc());
        let message = Message {
            id: Uuid::now_v7(),
            sender_id,
            receiver_id,
            content,
            created_at: from_millis(created_at)?,
        };
        sqlx::query(
            "INSERT INTO messages (id,sender_id,receiver_id,content,created_at) VALUES (?,?,?,?,?)",
        )
        .bind(message.id.to_string())
        .bind(sender_id.to_string())
        .bind(receiver_id.to_string())
        .bind(&message.content)
        .bind(created_at)
        .execute(&self.db_pool)
        .await?;

        // no subscribers is not an error
        let _ = self.tx.send(message.clone());
        Ok(message)
    }
}

#[async_trait]
impl RealtimeFeed for SqliteBackend {
    type Handle = FeedHandle;

    async fn subscribe(
        &self,
        channel: &str,
        sink: mpsc::UnboundedSender<RealtimeEvent>,
    ) -> anyhow::Result<FeedHandle> {
        let mut rx = self.tx.subscribe();
        let name = channel.to_owned();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        let event = RealtimeEvent {
                            channel: name.clone(),
                            message,
                        };
                        if sink.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("{name} lagged, skipped {skipped} inserts");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        debug!("subscribed {channel}");
        Ok(FeedHandle {
            channel: channel.to_owned(),
            task,
        })
    }

    async fn unsubscribe(&self, handle: FeedHandle) -> anyhow::Result<()> {
        handle.task.abort();
        debug!("unsubscribed {}", handle.channel);
        Ok(())
    }
}
