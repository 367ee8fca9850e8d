use axum::{
    debug_handler,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::error;

use crate::{
    AppResult, AppState,
    backend::{Auth, ProfileStore, SqliteBackend},
    chat::ChatError,
    include_res, render, res, session,
};

/// Signed out goes to the login page; signed in gets the chat shell, which
/// the websocket then fills in.
#[debug_handler(state = AppState)]
pub async fn index(
    State(backend): State<SqliteBackend>,
    session: Session,
) -> AppResult<Response> {
    let Some(token) = session::token(&session).await? else {
        return Ok(Redirect::to("/login").into_response());
    };
    let Some(signed_in) = backend.restore(token).await? else {
        session.clear().await;
        return Ok(Redirect::to("/login").into_response());
    };

    let profile = match backend.profile(signed_in.user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return Ok(res::error_page(&ChatError::ProfileMissing.to_string())),
        Err(e) => {
            error!("Error fetching user profile: {e:#}");
            return Ok(res::error_page(&ChatError::ProfileLoad(e).to_string()));
        }
    };

    Ok(Html(
        include_res!(str, "/pages/chat.html")
            .replace(
                "{user_list}",
                r#"<div class="loading-scaffold"><div class="spinner"></div></div>"#,
            )
            .replace("{chat_window}", &render::chat_placeholder())
            .replace("{username}", &render::escape(&profile.username)),
    )
    .into_response())
}
