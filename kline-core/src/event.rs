//! Realtime events streamed by an open connection

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A named server event (e.g. `"du"` for data updates, `"qsd"` for quote data)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub name: String,
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
}

impl RealtimeEvent {
    pub fn new(name: impl Into<String>, params: Vec<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// First parameter as a string; servers put the chart/quote session id there
    pub fn session_id(&self) -> Option<&str> {
        self.params.first().and_then(|p| p.as_str())
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// Handle to a live event stream.
///
/// Dropping the handle (or calling [`EventSubscription::unsubscribe`]) ends the
/// subscription and runs its release hook, if any; the connection itself
/// stays open.
pub struct EventSubscription {
    rx: broadcast::Receiver<RealtimeEvent>,
    skipped: u64,
    on_release: Option<ReleaseHook>,
}

impl EventSubscription {
    pub fn new(rx: broadcast::Receiver<RealtimeEvent>) -> Self {
        Self {
            rx,
            skipped: 0,
            on_release: None,
        }
    }

    /// Subscription that runs `hook` once when it ends, e.g. to tear down
    /// server-side state that feeds the stream
    pub fn with_release(
        rx: broadcast::Receiver<RealtimeEvent>,
        hook: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            rx,
            skipped: 0,
            on_release: Some(Box::new(hook)),
        }
    }

    /// Wait for the next event. Returns `None` once the connection is gone.
    ///
    /// Events dropped because this subscriber fell behind are counted in
    /// [`EventSubscription::skipped`] rather than surfaced as errors.
    pub async fn next(&mut self) -> Option<RealtimeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.skipped += n;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Number of events missed because the receiver lagged
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Explicitly end the subscription
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("skipped", &self.skipped)
            .field("releases", &self.on_release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscription_receives_until_closed() {
        let (tx, rx) = broadcast::channel(8);
        let mut sub = EventSubscription::new(rx);

        tx.send(RealtimeEvent::new("du", vec![json!("cs_abc")])).unwrap();
        drop(tx);

        let event = sub.next().await.unwrap();
        assert_eq!(event.name, "du");
        assert_eq!(event.session_id(), Some("cs_abc"));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_drops_receiver() {
        let (tx, rx) = broadcast::channel::<RealtimeEvent>(8);
        let sub = EventSubscription::new(rx);
        assert_eq!(tx.receiver_count(), 1);
        sub.unsubscribe();
        assert_eq!(tx.receiver_count(), 0);
    }

    #[test]
    fn test_release_hook_runs_once_on_unsubscribe() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let released = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = broadcast::channel::<RealtimeEvent>(8);
        let counter = Arc::clone(&released);
        let sub = EventSubscription::with_release(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(released.load(Ordering::SeqCst), 0);
        sub.unsubscribe();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lagged_events_are_counted() {
        let (tx, rx) = broadcast::channel(2);
        let mut sub = EventSubscription::new(rx);
        for i in 0..5 {
            tx.send(RealtimeEvent::new(format!("e{}", i), vec![])).unwrap();
        }

        let event = sub.next().await.unwrap();
        assert_eq!(event.name, "e3");
        assert_eq!(sub.skipped(), 3);
    }
}
