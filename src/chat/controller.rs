use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    backend::Backend,
    model::{Message, Profile, RealtimeEvent, Session},
};

use super::{
    ChatError,
    directory::{Directory, Listing},
    selector::{Selection, Selector},
    subscription::Subscriptions,
    thread::{Composer, Thread, Ticket, load_history},
};

/// User intents coming from the rendering surface.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    SelectPartner { partner_id: Uuid },
    Search { query: String },
    Send { content: String },
    Deselect,
    Logout,
}

#[derive(Debug)]
pub enum Event {
    Command(Command),
    HistoryLoaded {
        ticket: Ticket,
        result: anyhow::Result<Vec<Message>>,
    },
    SendFinished {
        ticket: Ticket,
        result: anyhow::Result<Message>,
    },
    Realtime(RealtimeEvent),
}

/// Which parts of the view a transition touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Listing,
    Selection,
    Thread,
    /// The last message of the thread is new; scroll to it.
    Appended,
    Composer { clear: bool },
    SignedOut,
}

/// Sending half handed to background completions and the realtime feed.
#[derive(Debug, Clone)]
pub struct Outbox {
    events: mpsc::UnboundedSender<Event>,
    realtime: mpsc::UnboundedSender<RealtimeEvent>,
}

#[derive(Debug)]
pub struct Mailbox {
    events: mpsc::UnboundedReceiver<Event>,
    realtime: mpsc::UnboundedReceiver<RealtimeEvent>,
}

pub fn mailbox() -> (Outbox, Mailbox) {
    let (events_tx, events) = mpsc::unbounded_channel();
    let (realtime_tx, realtime) = mpsc::unbounded_channel();
    (
        Outbox {
            events: events_tx,
            realtime: realtime_tx,
        },
        Mailbox { events, realtime },
    )
}

impl Mailbox {
    pub async fn recv(&mut self) -> Option<Event> {
        tokio::select! {
            Some(event) = self.events.recv() => Some(event),
            Some(event) = self.realtime.recv() => Some(Event::Realtime(event)),
            else => None,
        }
    }
}

/// Session-scoped conversation state. One instance per authenticated view;
/// every transition goes through [`ChatController::handle`].
pub struct ChatController<B: Backend> {
    backend: B,
    session: Session,
    profile: Profile,
    directory: Directory,
    query: String,
    selector: Selector,
    thread: Thread,
    composer: Composer,
    subscriptions: Subscriptions<B>,
    outbox: mpsc::UnboundedSender<Event>,
}

impl<B: Backend> ChatController<B> {
    /// Loads the owner's profile (fatal on failure) and the directory (fails open).
    pub async fn mount(backend: B, session: Session, outbox: Outbox) -> Result<Self, ChatError> {
        let profile = match backend.profile(session.user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                error!("no profile for #{}", session.user_id);
                return Err(ChatError::ProfileMissing);
            }
            Err(e) => {
                error!("Error fetching user profile: {e:#}");
                return Err(ChatError::ProfileLoad(e));
            }
        };

        let directory = Directory::load(&backend, profile.id).await;
        debug!("@{} sees {} users", profile.username, directory.len());

        Ok(Self {
            thread: Thread::new(profile.id),
            subscriptions: Subscriptions::new(outbox.realtime),
            outbox: outbox.events,
            backend,
            session,
            profile,
            directory,
            query: String::new(),
            selector: Selector::default(),
            composer: Composer::default(),
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn listing(&self) -> Listing<'_> {
        self.directory.filter(&self.query)
    }

    pub fn selection(&self) -> Selection {
        self.selector.selection()
    }

    pub fn partner(&self) -> Option<&Profile> {
        self.selector.active().and_then(|id| self.directory.get(id))
    }

    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn subscription(&self) -> Option<&str> {
        self.subscriptions.channel()
    }

    pub async fn handle(&mut self, event: Event) -> Vec<Change> {
        match event {
            Event::Command(Command::SelectPartner { partner_id }) => self.select(partner_id).await,
            Event::Command(Command::Search { query }) => self.search(query),
            Event::Command(Command::Send { content }) => self.send(&content),
            Event::Command(Command::Deselect) => self.deselect().await,
            Event::Command(Command::Logout) => self.logout().await,
            Event::HistoryLoaded { ticket, result } => self.history_loaded(ticket, result).await,
            Event::SendFinished { ticket, result } => self.send_finished(ticket, result),
            Event::Realtime(event) => self.ingest(event),
        }
    }

    fn search(&mut self, query: String) -> Vec<Change> {
        self.query = query;
        vec![Change::Listing]
    }

    async fn select(&mut self, partner: Uuid) -> Vec<Change> {
        if self.directory.get(partner).is_none() {
            debug!("ignoring selection of unknown user #{partner}");
            return Vec::new();
        }
        if !self.selector.select(partner) {
            return Vec::new();
        }

        self.subscriptions.release(&self.backend).await;
        self.composer.reset();
        let ticket = self.thread.begin(partner);

        let backend = self.backend.clone();
        let outbox = self.outbox.clone();
        let me = self.profile.id;
        tokio::spawn(async move {
            let result = load_history(&backend, me, partner).await;
            let _ = outbox.send(Event::HistoryLoaded { ticket, result });
        });

        vec![Change::Selection, Change::Thread, Change::Composer { clear: true }]
    }

    async fn history_loaded(
        &mut self,
        ticket: Ticket,
        result: anyhow::Result<Vec<Message>>,
    ) -> Vec<Change> {
        if !self.thread.apply_history(ticket, result) {
            debug!("dropping stale history for #{}", ticket.partner());
            return Vec::new();
        }

        // the feed is bound only once history is in place
        if let Err(e) = self
            .subscriptions
            .bind(&self.backend, self.profile.id, ticket.partner())
            .await
        {
            warn!("{:#}", anyhow::Error::from(e));
        }
        vec![Change::Thread]
    }

    fn send(&mut self, content: &str) -> Vec<Change> {
        let (Some(ticket), Some(draft)) = (self.thread.ticket(), self.thread.draft(content)) else {
            return Vec::new();
        };
        if !self.composer.begin() {
            return Vec::new();
        }

        let backend = self.backend.clone();
        let outbox = self.outbox.clone();
        tokio::spawn(async move {
            let result = backend.insert_message(draft).await;
            let _ = outbox.send(Event::SendFinished { ticket, result });
        });

        vec![Change::Composer { clear: false }]
    }

    fn send_finished(&mut self, ticket: Ticket, result: anyhow::Result<Message>) -> Vec<Change> {
        if !self.thread.is_current(ticket) {
            // persisted for a thread that is no longer shown
            return Vec::new();
        }

        match result {
            Ok(message) => {
                self.composer.finish(None);
                self.thread.append_sent(ticket, message);
                vec![Change::Appended, Change::Composer { clear: true }]
            }
            Err(e) => {
                error!("Error sending message: {e:#}");
                self.composer.finish(Some(ChatError::Send(e).to_string()));
                vec![Change::Composer { clear: false }]
            }
        }
    }

    fn ingest(&mut self, event: RealtimeEvent) -> Vec<Change> {
        if self.subscriptions.channel() != Some(event.channel.as_str()) {
            return Vec::new();
        }
        if self.thread.ingest(event.message) {
            vec![Change::Appended]
        } else {
            Vec::new()
        }
    }

    async fn deselect(&mut self) -> Vec<Change> {
        if !self.selector.deselect() {
            return Vec::new();
        }
        self.thread.clear();
        self.composer.reset();
        self.subscriptions.release(&self.backend).await;
        vec![Change::Selection, Change::Thread]
    }

    async fn logout(&mut self) -> Vec<Change> {
        self.teardown().await;
        if let Err(e) = self.backend.sign_out(&self.session).await {
            error!("Error signing out: {e:#}");
        }
        vec![Change::SignedOut]
    }

    /// Releases the live feed. Must run before this view is dropped.
    pub async fn teardown(&mut self) {
        self.subscriptions.release(&self.backend).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{testing::FakeBackend, thread::ThreadView};

    struct Harness {
        backend: FakeBackend,
        controller: ChatController<FakeBackend>,
        mailbox: Mailbox,
        me: Profile,
        partner: Profile,
        other: Profile,
    }

    async fn harness() -> Harness {
        let backend = FakeBackend::new();
        let me = backend.add_user("a", "User A").await;
        let partner = backend.add_user("b", "User B").await;
        let other = backend.add_user("c", "User C").await;

        let (outbox, mailbox) = mailbox();
        let session = backend.session_for(&me).await;
        let controller = ChatController::mount(backend.clone(), session, outbox)
            .await
            .unwrap();
        Harness {
            backend,
            controller,
            mailbox,
            me,
            partner,
            other,
        }
    }

    impl Harness {
        async fn command(&mut self, command: Command) -> Vec<Change> {
            self.controller.handle(Event::Command(command)).await
        }

        /// Delivers the next background completion.
        async fn settle(&mut self) -> Vec<Change> {
            let event = self.mailbox.recv().await.unwrap();
            self.controller.handle(event).await
        }

        async fn select(&mut self, partner_id: Uuid) -> Vec<Change> {
            self.command(Command::SelectPartner { partner_id }).await
        }

        fn feed(&self, sender: Uuid, receiver: Uuid, content: &str) -> Event {
            Event::Realtime(RealtimeEvent {
                channel: self.controller.subscription().unwrap_or_default().to_owned(),
                message: crate::chat::testing::message(sender, receiver, content),
            })
        }

        fn contents(&self) -> Vec<String> {
            self.controller
                .thread()
                .messages()
                .iter()
                .map(|m| m.content.clone())
                .collect()
        }
    }

    #[tokio::test]
    async fn reselecting_active_partner_is_a_no_op() {
        let mut h = harness().await;
        let partner = h.partner.id;

        h.select(partner).await;
        h.settle().await;
        assert!(h.select(partner).await.is_empty());
        assert_eq!(h.controller.selection(), Selection::Selected(partner));

        let calls = h.backend.calls().await;
        assert_eq!(calls.history_loads, 1);
        assert_eq!(calls.subscribes, 1);
    }

    #[tokio::test]
    async fn two_party_scenario() {
        let mut h = harness().await;
        let (me, partner) = (h.me.id, h.partner.id);

        h.select(partner).await;
        h.settle().await;
        assert_eq!(h.controller.thread().view(), ThreadView::Empty);

        let changes = h.command(Command::Send { content: "hi".into() }).await;
        assert_eq!(changes, [Change::Composer { clear: false }]);
        assert!(h.controller.composer().is_busy());

        let changes = h.settle().await;
        assert_eq!(changes, [Change::Appended, Change::Composer { clear: true }]);
        assert_eq!(h.contents(), ["hi"]);
        assert!(h.controller.thread().is_sent(&h.controller.thread().messages()[0]));

        let hello = h.feed(partner, me, "hello");
        assert_eq!(h.controller.handle(hello).await, [Change::Appended]);
        assert_eq!(h.contents(), ["hi", "hello"]);
        assert!(!h.controller.thread().is_sent(&h.controller.thread().messages()[1]));

        let stranger = Uuid::now_v7();
        let spam = h.feed(stranger, me, "spam");
        assert!(h.controller.handle(spam).await.is_empty());
        assert_eq!(h.contents(), ["hi", "hello"]);
    }

    #[tokio::test]
    async fn stale_history_never_reaches_the_new_thread() {
        let mut h = harness().await;
        let (me, b, c) = (h.me.id, h.partner.id, h.other.id);

        h.backend.add_message(b, me, "from b").await;
        h.backend.add_message(c, me, "from c").await;

        h.select(b).await;
        h.select(c).await;
        h.settle().await;
        h.settle().await;

        assert_eq!(h.contents(), ["from c"]);
        let calls = h.backend.calls().await;
        assert_eq!(calls.subscribes, 1);
        assert_eq!(calls.max_live, 1);
    }

    #[tokio::test]
    async fn failed_send_keeps_content_and_thread() {
        let mut h = harness().await;
        h.select(h.partner.id).await;
        h.settle().await;
        h.backend.fail_send(true).await;

        h.command(Command::Send { content: "hi".into() }).await;
        let changes = h.settle().await;

        assert_eq!(changes, [Change::Composer { clear: false }]);
        assert!(h.contents().is_empty());
        assert!(!h.controller.composer().is_busy());
        assert_eq!(h.controller.composer().error(), Some("Could not send message."));
    }

    #[tokio::test]
    async fn blank_send_is_ignored() {
        let mut h = harness().await;
        h.select(h.partner.id).await;
        h.settle().await;

        assert!(h.command(Command::Send { content: "   ".into() }).await.is_empty());
        assert_eq!(h.backend.calls().await.inserts, 0);
    }

    #[tokio::test]
    async fn send_completion_for_previous_partner_is_dropped() {
        let mut h = harness().await;
        h.select(h.partner.id).await;
        h.settle().await;

        h.command(Command::Send { content: "hi".into() }).await;
        h.command(Command::Deselect).await;
        assert!(h.settle().await.is_empty());
        assert_eq!(h.controller.thread().view(), ThreadView::Placeholder);
    }

    #[tokio::test]
    async fn events_from_a_released_channel_are_dropped() {
        let mut h = harness().await;
        let (me, b, c) = (h.me.id, h.partner.id, h.other.id);
        h.select(b).await;
        h.settle().await;
        let on_old_channel = h.feed(c, me, "late");

        h.select(c).await;
        h.settle().await;

        assert!(h.controller.handle(on_old_channel).await.is_empty());
        let on_new_channel = h.feed(c, me, "fresh");
        assert_eq!(h.controller.handle(on_new_channel).await, [Change::Appended]);
        assert_eq!(h.contents(), ["fresh"]);
    }

    #[tokio::test]
    async fn events_before_bind_are_dropped() {
        let mut h = harness().await;
        let (me, b) = (h.me.id, h.partner.id);
        h.select(b).await;
        assert_eq!(h.controller.subscription(), None);

        let early = Event::Realtime(RealtimeEvent {
            channel: crate::model::ConversationKey::new(me, b).channel(me),
            message: crate::chat::testing::message(b, me, "early"),
        });
        assert!(h.controller.handle(early).await.is_empty());

        h.settle().await;
        assert!(h.controller.subscription().is_some());
        assert!(h.contents().is_empty());
    }

    #[tokio::test]
    async fn at_most_one_live_handle_through_the_session() {
        let mut h = harness().await;
        let partner = h.partner.id;

        h.select(partner).await;
        h.settle().await;
        assert_eq!(h.backend.calls().await.live, 1);

        h.command(Command::Deselect).await;
        assert_eq!(h.backend.calls().await.live, 0);
        assert!(h.command(Command::Deselect).await.is_empty());

        h.select(partner).await;
        h.settle().await;
        let changes = h.command(Command::Logout).await;
        assert_eq!(changes, [Change::SignedOut]);

        let calls = h.backend.calls().await;
        assert_eq!(calls.live, 0);
        assert_eq!(calls.max_live, 1);
        assert_eq!(calls.sign_outs, 1);
    }

    #[tokio::test]
    async fn history_failure_still_binds_the_feed() {
        let mut h = harness().await;
        h.backend.fail_history(true).await;
        h.select(h.partner.id).await;
        h.settle().await;

        assert_eq!(
            h.controller.thread().view(),
            ThreadView::Failed("Could not load messages.")
        );
        assert!(h.controller.subscription().is_some());

        let hello = h.feed(h.partner.id, h.me.id, "hello");
        h.controller.handle(hello).await;
        assert_eq!(h.contents(), ["hello"]);
    }

    #[tokio::test]
    async fn search_filters_without_network() {
        let mut h = harness().await;
        assert_eq!(h.controller.listing(), Listing::Prompt);

        h.command(Command::Search { query: "user".into() }).await;
        let Listing::Matches(found) = h.controller.listing() else {
            panic!("expected matches");
        };
        assert_eq!(found.len(), 2);

        h.command(Command::Search { query: "nobody".into() }).await;
        assert_eq!(h.controller.listing(), Listing::NoResults);
        assert_eq!(h.backend.calls().await.directory_loads, 1);
    }

    #[tokio::test]
    async fn missing_profile_is_fatal() {
        let backend = FakeBackend::new();
        let (outbox, _mailbox) = mailbox();
        let session = Session {
            token: Uuid::new_v4(),
            user_id: Uuid::now_v7(),
        };
        let err = ChatController::mount(backend, session, outbox)
            .await
            .err()
            .unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let id = Uuid::now_v7();
        let select: Command =
            serde_json::from_str(&format!(r#"{{"type":"select_partner","partner_id":"{id}"}}"#))
                .unwrap();
        assert_eq!(select, Command::SelectPartner { partner_id: id });

        let logout: Command = serde_json::from_str(r#"{"type":"logout"}"#).unwrap();
        assert_eq!(logout, Command::Logout);
        assert!(serde_json::from_str::<Command>(r#"{"type":"dance"}"#).is_err());
    }
}
