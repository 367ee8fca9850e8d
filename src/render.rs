use pulldown_cmark::{Event, Parser};
use pulldown_cmark_escape::{FmtWriter, escape_html};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    backend::Backend,
    chat::{Change, ChatController, Listing, ThreadView},
    include_res,
    model::{Message, Profile},
};

pub const USER_LIST: &str = "user-list";
pub const CHAT_WINDOW: &str = "chat-window-content";
pub const MESSAGES: &str = "messages-container";

/// DOM update pushed to the browser over the websocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Patch {
    Replace { target: &'static str, html: String },
    Append { target: &'static str, html: String },
    Composer { busy: bool, clear: bool, error: Option<String> },
    Redirect { location: String },
}

/// Text and double-quoted attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // writing into a String cannot fail
    let _ = escape_html(FmtWriter(&mut out), text);
    out
}

/// Markdown message body; raw HTML is shown as text.
pub fn content_html(content: &str) -> String {
    let parser = Parser::new(content).map(|event| match event {
        Event::Html(html) | Event::InlineHtml(html) => Event::Text(html),
        _ => event,
    });

    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

pub fn user_card(profile: &Profile, active: bool) -> String {
    include_res!(str, "/pages/chat/user_card.html")
        .replace("{active}", if active { " active" } else { "" })
        .replace("{id}", &profile.id.to_string())
        .replace("{initial}", &escape(&profile.initial().to_string()))
        .replace("{full_name}", &escape(&profile.full_name))
        .replace("{username}", &escape(&profile.username))
}

pub fn user_list(listing: &Listing<'_>, active: Option<Uuid>) -> String {
    match listing {
        Listing::Failed(error) => format!(r#"<p class="error-message">{}</p>"#, escape(error)),
        Listing::Prompt => r#"<p class="text-secondary">Search for users to begin.</p>"#.to_owned(),
        Listing::NoResults => r#"<p class="text-secondary">No users found.</p>"#.to_owned(),
        Listing::Matches(profiles) => profiles
            .iter()
            .map(|profile| user_card(profile, active == Some(profile.id)))
            .collect(),
    }
}

pub fn bubble(message: &Message, sent: bool) -> String {
    format!(
        r#"<div class="message-bubble {}" data-message-id="{}">{}</div>"#,
        if sent { "sent" } else { "received" },
        message.id,
        content_html(&message.content),
    )
}

pub fn chat_placeholder() -> String {
    include_res!(str, "/pages/chat/placeholder.html").to_owned()
}

pub fn chat_window(partner: &Profile) -> String {
    include_res!(str, "/pages/chat/window.html")
        .replace("{initial}", &escape(&partner.initial().to_string()))
        .replace("{full_name}", &escape(&partner.full_name))
        .replace("{username}", &escape(&partner.username))
}

pub fn thread<B: Backend>(controller: &ChatController<B>) -> String {
    let thread = controller.thread();
    match thread.view() {
        ThreadView::Placeholder => String::new(),
        ThreadView::Loading => r#"<div class="loading-scaffold"><div class="spinner"></div></div>"#.to_owned(),
        ThreadView::Failed(error) => format!(r#"<p class="error-message">{}</p>"#, escape(error)),
        ThreadView::Empty => r#"<p class="text-secondary">No messages yet. Say hello!</p>"#.to_owned(),
        ThreadView::Messages(messages) => messages
            .iter()
            .map(|message| bubble(message, thread.is_sent(message)))
            .collect(),
    }
}

/// Translates the parts of the view a transition touched into DOM patches.
pub fn patches<B: Backend>(controller: &ChatController<B>, changes: &[Change]) -> Vec<Patch> {
    let mut patches = Vec::new();
    for change in changes {
        match *change {
            Change::Listing => patches.push(Patch::Replace {
                target: USER_LIST,
                html: user_list(&controller.listing(), controller.partner().map(|p| p.id)),
            }),
            Change::Selection => {
                patches.push(Patch::Replace {
                    target: USER_LIST,
                    html: user_list(&controller.listing(), controller.partner().map(|p| p.id)),
                });
                patches.push(Patch::Replace {
                    target: CHAT_WINDOW,
                    html: match controller.partner() {
                        Some(partner) => chat_window(partner),
                        None => chat_placeholder(),
                    },
                });
            }
            Change::Thread => {
                if controller.partner().is_some() {
                    patches.push(Patch::Replace {
                        target: MESSAGES,
                        html: thread(controller),
                    });
                }
            }
            Change::Appended => {
                let thread_state = controller.thread();
                let messages = thread_state.messages();
                match messages {
                    // first bubble replaces whatever placeholder was shown
                    [_] => patches.push(Patch::Replace {
                        target: MESSAGES,
                        html: thread(controller),
                    }),
                    [.., last] => patches.push(Patch::Append {
                        target: MESSAGES,
                        html: bubble(last, thread_state.is_sent(last)),
                    }),
                    [] => {}
                }
            }
            Change::Composer { clear } => {
                let composer = controller.composer();
                patches.push(Patch::Composer {
                    busy: composer.is_busy(),
                    clear,
                    error: composer.error().map(str::to_owned),
                });
            }
            Change::SignedOut => patches.push(Patch::Redirect {
                location: "/login".to_owned(),
            }),
        }
    }
    patches
}
