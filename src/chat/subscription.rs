use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    backend::RealtimeFeed,
    model::{ConversationKey, RealtimeEvent},
};

use super::ChatError;

struct Live<H> {
    channel: String,
    handle: H,
}

/// Owns zero or one live realtime handle, scoped to the active pair.
pub struct Subscriptions<F: RealtimeFeed> {
    live: Option<Live<F::Handle>>,
    sink: mpsc::UnboundedSender<RealtimeEvent>,
}

impl<F: RealtimeFeed> Subscriptions<F> {
    pub fn new(sink: mpsc::UnboundedSender<RealtimeEvent>) -> Self {
        Self { live: None, sink }
    }

    pub fn channel(&self) -> Option<&str> {
        self.live.as_ref().map(|live| live.channel.as_str())
    }

    /// Releases any existing handle before opening the new one.
    pub async fn bind(&mut self, feed: &F, me: Uuid, partner: Uuid) -> Result<(), ChatError> {
        self.release(feed).await;

        let channel = ConversationKey::new(me, partner).channel(me);
        let handle = feed
            .subscribe(&channel, self.sink.clone())
            .await
            .map_err(ChatError::Subscribe)?;
        debug!("bound {channel}");
        self.live = Some(Live { channel, handle });
        Ok(())
    }

    /// No-op without a live handle.
    pub async fn release(&mut self, feed: &F) {
        let Some(Live { channel, handle }) = self.live.take() else {
            return;
        };
        if let Err(e) = feed.unsubscribe(handle).await {
            warn!("releasing {channel} failed: {e:#}");
        }
    }
}
