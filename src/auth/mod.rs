mod login;
mod logout;
mod signup;

use axum::{
    Router,
    response::Html,
    routing::{get, post},
};

use crate::{AppState, include_res, render::escape};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login::login_page).post(login::login))
        .route("/signup", post(signup::signup))
        .route("/logout", post(logout::logout))
}

pub(crate) fn auth_page(login_error: &str, signup_error: &str) -> Html<String> {
    Html(
        include_res!(str, "/pages/login.html")
            .replace("{login_error}", &escape(login_error))
            .replace("{signup_error}", &escape(signup_error)),
    )
}
