use axum::{
    Form, debug_handler,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::debug;

use crate::{AppResult, AppState, chat::identity, session::SESSION_TOKEN};

use super::auth_page;

#[derive(Deserialize)]
pub(crate) struct SignUpForm {
    full_name: String,
    username: String,
    password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn signup(
    State(state): State<AppState>,
    session: Session,
    Form(SignUpForm { full_name, username, password }): Form<SignUpForm>,
) -> AppResult<Response> {
    match identity::sign_up(
        &state.backend,
        &state.config.identifier_domain,
        &full_name,
        &username,
        &password,
    )
    .await
    {
        Ok(signed_up) => {
            session.cycle_id().await?;
            session.insert(SESSION_TOKEN, signed_up.token).await?;
            Ok(Redirect::to("/").into_response())
        }
        Err(e) => {
            debug!("sign up rejected: {e}");
            Ok(auth_page("", &e.to_string()).into_response())
        }
    }
}
