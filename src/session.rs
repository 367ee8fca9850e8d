use tower_sessions::Session;
use uuid::Uuid;

use crate::AppResult;

/// Cookie-session key holding the identity provider's session token.
pub const SESSION_TOKEN: &str = "session_token";

pub async fn token(session: &Session) -> AppResult<Option<Uuid>> {
    Ok(session.get::<Uuid>(SESSION_TOKEN).await?)
}
