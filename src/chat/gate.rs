use tracing::info;

use crate::{backend::Backend, model::Session};

use super::{
    ChatError,
    controller::{ChatController, Change, Event, Outbox},
};

pub enum GateView<B: Backend> {
    /// No session notification seen yet.
    Pending,
    SignedOut,
    /// Terminal for this render cycle.
    Failed(ChatError),
    SignedIn(Box<ChatController<B>>),
}

/// Switches between the signed-out and signed-in views on session transitions.
pub struct SessionGate<B: Backend> {
    backend: B,
    outbox: Outbox,
    view: GateView<B>,
}

impl<B: Backend> SessionGate<B> {
    pub fn new(backend: B, outbox: Outbox) -> Self {
        Self {
            backend,
            outbox,
            view: GateView::Pending,
        }
    }

    pub fn view(&self) -> &GateView<B> {
        &self.view
    }

    pub fn controller(&self) -> Option<&ChatController<B>> {
        match &self.view {
            GateView::SignedIn(controller) => Some(controller.as_ref()),
            _ => None,
        }
    }

    /// Every notification remounts; the old view's feed is released first.
    pub async fn on_session_change(&mut self, session: Option<Session>) {
        if let GateView::SignedIn(controller) = &mut self.view {
            controller.teardown().await;
        }

        self.view = match session {
            None => {
                info!("session ended");
                GateView::SignedOut
            }
            Some(session) => {
                match ChatController::mount(self.backend.clone(), session, self.outbox.clone()).await {
                    Ok(controller) => GateView::SignedIn(Box::new(controller)),
                    Err(e) => GateView::Failed(e),
                }
            }
        };
    }

    /// Drops the mounted view without a session transition, e.g. when the
    /// rendering surface goes away.
    pub async fn unmount(&mut self) {
        if let GateView::SignedIn(controller) = &mut self.view {
            controller.teardown().await;
        }
        self.view = GateView::Pending;
    }

    /// Events only reach a mounted conversation view.
    pub async fn handle(&mut self, event: Event) -> Vec<Change> {
        match &mut self.view {
            GateView::SignedIn(controller) => controller.handle(event).await,
            _ => Vec::new(),
        }
    }
}
