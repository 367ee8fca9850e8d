use axum::{debug_handler, extract::State, response::Redirect};
use tower_sessions::Session;

use crate::{
    AppResult, AppState,
    backend::{Auth, SqliteBackend},
    session,
};

#[debug_handler(state = AppState)]
pub(crate) async fn logout(
    State(backend): State<SqliteBackend>,
    session: Session,
) -> AppResult<Redirect> {
    if let Some(token) = session::token(&session).await? {
        if let Some(signed_in) = backend.restore(token).await? {
            backend.sign_out(&signed_in).await?;
        }
    }
    session.clear().await;
    Ok(Redirect::to("/login"))
}
