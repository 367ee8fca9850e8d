use axum::{
    Form, debug_handler,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::debug;

use crate::{
    AppResult, AppState,
    backend::{Auth, SqliteBackend},
    chat::identity,
    session::{self, SESSION_TOKEN},
};

use super::auth_page;

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    username: String,
    password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn login_page(
    State(backend): State<SqliteBackend>,
    session: Session,
) -> AppResult<Response> {
    if let Some(token) = session::token(&session).await? {
        if backend.restore(token).await?.is_some() {
            return Ok(Redirect::to("/").into_response());
        }
    }
    Ok(auth_page("", "").into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(LoginForm { username, password }): Form<LoginForm>,
) -> AppResult<Response> {
    match identity::sign_in(
        &state.backend,
        &state.config.identifier_domain,
        &username,
        &password,
    )
    .await
    {
        Ok(signed_in) => {
            session.cycle_id().await?;
            session.insert(SESSION_TOKEN, signed_in.token).await?;
            Ok(Redirect::to("/").into_response())
        }
        Err(e) => {
            debug!("sign in rejected: {e}");
            Ok(auth_page(&e.to_string(), "").into_response())
        }
    }
}
