use axum::{http::StatusCode, response::{Html, IntoResponse, Response}};

#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

pub const SCHEMA: &str = include_res!(str, "/schema.sql");

/// Terminal error page for a render cycle that cannot continue.
pub fn error_page(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(
            include_res!(str, "/pages/error.html")
                .replace("{message}", &crate::render::escape(message)),
        ),
    )
        .into_response()
}
