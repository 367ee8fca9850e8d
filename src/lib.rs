pub mod auth;
pub mod backend;
pub mod chat;
pub mod config;
pub mod index;
pub mod model;
pub mod render;
pub mod res;
pub mod session;
pub mod ws;

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::trace::TraceLayer;

use backend::SqliteBackend;
use config::Config;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub backend: SqliteBackend,
    pub config: Arc<Config>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index::index))
        .route("/ws", get(ws::chat_ws))
        .merge(auth::router())
        .layer(TraceLayer::new_for_http())
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("{:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}\n\n{}", self.0, self.0.backtrace()),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
