use futures::stream::{self, Stream};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::transcription::TranscriptEvent;

/// Events retained for the slowest subscriber before it starts skipping
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Bounded wait before a subscriber yields a keep-alive
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(1);

/// Process-wide fan-out of transcript events.
///
/// Every subscriber receives every event published after it subscribed, in
/// publish order. A subscriber that falls more than the buffer size behind
/// skips the overwritten events.
#[derive(Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<TranscriptEvent>,
    keepalive: Duration,
}

/// One item of a subscriber's stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Event(TranscriptEvent),
    /// Nothing arrived within the keep-alive interval
    KeepAlive,
}

impl EventPublisher {
    pub fn new(capacity: usize, keepalive: Duration) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, keepalive }
    }

    /// Non-blocking enqueue; returns how many subscribers will see the event
    pub fn publish(&self, event: TranscriptEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No transcript stream subscribers, event not delivered");
                0
            }
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            keepalive: self.keepalive,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER, DEFAULT_KEEPALIVE)
    }
}

/// An independent reader of the publisher
pub struct Subscription {
    rx: broadcast::Receiver<TranscriptEvent>,
    keepalive: Duration,
}

impl Subscription {
    /// Wait for the next event, or a keep-alive once the interval elapses.
    ///
    /// Returns `None` once the publisher is gone.
    pub async fn next_frame(&mut self) -> Option<StreamFrame> {
        loop {
            match timeout(self.keepalive, self.rx.recv()).await {
                Ok(Ok(event)) => return Some(StreamFrame::Event(event)),
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!("Transcript stream subscriber lagged, skipped {} events", skipped);
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                Err(_elapsed) => return Some(StreamFrame::KeepAlive),
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = StreamFrame> + Send {
        stream::unfold(self, |mut sub| async move {
            sub.next_frame().await.map(|frame| (frame, sub))
        })
    }
}
