use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use tokio::sync::watch;
use tower_sessions::Session as CookieSession;
use tracing::{debug, info, warn};

use crate::{
    AppResult, AppState,
    backend::{Auth, SqliteBackend},
    chat::{Change, Command, Event, GateView, SessionGate, mailbox},
    model::Session,
    render::{self, CHAT_WINDOW, Patch, USER_LIST},
    session,
};

#[debug_handler(state = AppState)]
pub async fn chat_ws(
    State(backend): State<SqliteBackend>,
    cookie: CookieSession,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let Some(token) = session::token(&cookie).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    let session_rx = backend.on_session_change(token).await?;

    Ok(ws.on_upgrade(move |socket| drive(socket, backend, cookie, session_rx)))
}

fn gate_patches(gate: &SessionGate<SqliteBackend>) -> Vec<Patch> {
    match gate.view() {
        GateView::SignedIn(controller) => {
            render::patches(controller, &[Change::Listing, Change::Selection])
        }
        GateView::Failed(e) => vec![
            Patch::Replace {
                target: USER_LIST,
                html: String::new(),
            },
            Patch::Replace {
                target: CHAT_WINDOW,
                html: format!(r#"<div class="error-message">{}</div>"#, render::escape(&e.to_string())),
            },
        ],
        GateView::Pending | GateView::SignedOut => vec![Patch::Redirect {
            location: "/login".to_owned(),
        }],
    }
}

async fn push(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    patches: Vec<Patch>,
) -> anyhow::Result<()> {
    if patches.is_empty() {
        return Ok(());
    }
    let text = serde_json::to_string(&patches)?;
    sender.send(WsMessage::Text(text.into())).await?;
    Ok(())
}

/// One connection is one rendering surface: a single task owns its gate and
/// applies commands, completions and feed events in arrival order.
async fn drive(
    socket: WebSocket,
    backend: SqliteBackend,
    cookie: CookieSession,
    mut session_rx: watch::Receiver<Option<Session>>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut mailbox) = mailbox();
    let mut gate = SessionGate::new(backend, outbox);

    let initial = session_rx.borrow_and_update().clone();
    gate.on_session_change(initial).await;
    let mut open = push(&mut sender, gate_patches(&gate)).await.is_ok()
        && matches!(gate.view(), GateView::SignedIn(_));

    while open {
        let changes = tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<Command>(text.as_str()) {
                    Ok(command) => gate.handle(Event::Command(command)).await,
                    Err(e) => {
                        debug!("ignoring malformed command: {e}");
                        continue;
                    }
                },
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
            Some(event) = mailbox.recv() => gate.handle(event).await,
            changed = session_rx.changed() => {
                let next = match changed {
                    Ok(()) => session_rx.borrow_and_update().clone(),
                    Err(_) => None,
                };
                gate.on_session_change(next).await;
                open = matches!(gate.view(), GateView::SignedIn(_));
                if !open {
                    cookie.clear().await;
                }
                if push(&mut sender, gate_patches(&gate)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let signed_out = changes.contains(&Change::SignedOut);
        let patches = match gate.controller() {
            Some(controller) => render::patches(controller, &changes),
            None => Vec::new(),
        };
        if let Err(e) = push(&mut sender, patches).await {
            warn!("dropping chat connection: {e:#}");
            break;
        }
        if signed_out {
            cookie.clear().await;
            break;
        }
    }

    gate.unmount().await;
    info!("chat connection closed");
}
