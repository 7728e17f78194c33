//! One watch subscription over one named resource.

use crate::client::{EndpointsChange, SharedEndpointsClient};
use crate::endpoint::Endpoint;
use crate::target::Target;

use futures::StreamExt;
use std::collections::BTreeSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{event, Level};

/// A structured event emitted by a [WatchSession].
///
/// All change notification styles collapse into this one tagged type,
/// delivered through a single channel and dispatched by pattern match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    /// An endpoint joined the watched resource.
    Added(Endpoint),
    /// An endpoint left the watched resource.
    Removed(Endpoint),
    /// A full baseline: emitted on initial synchronization, on every
    /// reconnect, and whenever the feed reports the whole set.
    Replaced(BTreeSet<Endpoint>),
    /// The subscription failed. Emitted exactly once, after which the
    /// session delivers nothing further.
    Error(String),
}

impl From<EndpointsChange> for WatchEvent {
    fn from(change: EndpointsChange) -> Self {
        match change {
            EndpointsChange::Added(endpoint) => WatchEvent::Added(endpoint),
            EndpointsChange::Removed(endpoint) => WatchEvent::Removed(endpoint),
            EndpointsChange::Replaced(full_set) => WatchEvent::Replaced(full_set),
        }
    }
}

// Events the session may buffer before the core drains them.
const EVENT_BUFFER: usize = 32;

/// Owns one change-notification subscription for a single named
/// resource.
///
/// The session lists first, emitting a `Replaced` baseline, then
/// forwards the watch feed. It does not self-heal: any transport
/// failure becomes exactly one [WatchEvent::Error] and the session
/// stops, leaving retry policy to whoever owns it.
pub(crate) struct WatchSession {
    handle: Option<JoinHandle<()>>,
    events_rx: mpsc::Receiver<WatchEvent>,
}

impl WatchSession {
    pub(crate) fn start(client: SharedEndpointsClient, target: Target) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let handle = tokio::task::spawn(run_session(client, target, events_tx));
        Self {
            handle: Some(handle),
            events_rx,
        }
    }

    /// Receives the next event; `None` once the session has stopped
    /// and the buffer is drained.
    pub(crate) async fn recv(&mut self) -> Option<WatchEvent> {
        self.events_rx.recv().await
    }

    /// Idempotent; safe to call any number of times, including while
    /// an event delivery is in flight.
    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.events_rx.close();
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.stop();
    }
}

// No orchestrator error escapes this task raw; everything is
// normalized into a terminal WatchEvent::Error.
async fn run_session(
    client: SharedEndpointsClient,
    target: Target,
    events_tx: mpsc::Sender<WatchEvent>,
) {
    let baseline = match client.list(&target).await {
        Ok(endpoints) => endpoints,
        Err(err) => {
            event!(Level::WARN, %target, err = ?err, "Initial endpoints list failed");
            let _ = events_tx.send(WatchEvent::Error(format!("{err:#}"))).await;
            return;
        }
    };
    if events_tx.send(WatchEvent::Replaced(baseline)).await.is_err() {
        return;
    }

    let mut stream = match client.watch(&target).await {
        Ok(stream) => stream,
        Err(err) => {
            event!(Level::WARN, %target, err = ?err, "Opening endpoints watch failed");
            let _ = events_tx.send(WatchEvent::Error(format!("{err:#}"))).await;
            return;
        }
    };

    while let Some(item) = stream.next().await {
        match item {
            Ok(change) => {
                if events_tx.send(change.into()).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                event!(Level::WARN, %target, err = ?err, "Endpoints watch failed");
                let _ = events_tx.send(WatchEvent::Error(format!("{err:#}"))).await;
                return;
            }
        }
    }

    // The server closed the feed without an error; from the consumer's
    // side that is indistinguishable from a transport failure.
    event!(Level::WARN, %target, "Endpoints watch closed by server");
    let _ = events_tx
        .send(WatchEvent::Error("watch stream closed by server".to_string()))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedClient;

    use std::sync::Arc;

    #[tokio::test]
    async fn baseline_is_delivered_before_incremental_events() {
        let client = Arc::new(ScriptedClient::new(["10.0.0.1"]));
        client.push_change(EndpointsChange::Added("10.0.0.2".into()));
        client.close_watch();

        let target = Target::parse("k8s:///svc:8080").unwrap();
        let mut session = WatchSession::start(client, target);

        assert_eq!(
            session.recv().await,
            Some(WatchEvent::Replaced(BTreeSet::from(["10.0.0.1".into()])))
        );
        assert_eq!(
            session.recv().await,
            Some(WatchEvent::Added("10.0.0.2".into()))
        );
    }

    #[tokio::test]
    async fn transport_failure_yields_exactly_one_error_then_silence() {
        let client = Arc::new(ScriptedClient::new(["10.0.0.1"]));
        client.push_failure("connection reset");

        let target = Target::parse("k8s:///svc:8080").unwrap();
        let mut session = WatchSession::start(client, target);

        assert!(matches!(session.recv().await, Some(WatchEvent::Replaced(_))));
        match session.recv().await {
            Some(WatchEvent::Error(detail)) => assert!(detail.contains("connection reset")),
            other => panic!("expected error event, got {other:?}"),
        }
        assert_eq!(session.recv().await, None);
    }

    #[tokio::test]
    async fn failed_initial_list_becomes_an_error_event() {
        let client = Arc::new(ScriptedClient::new(["10.0.0.1"]));
        client.fail_next_list("unauthorized");

        let target = Target::parse("k8s:///svc:8080").unwrap();
        let mut session = WatchSession::start(client, target);

        match session.recv().await {
            Some(WatchEvent::Error(detail)) => assert!(detail.contains("unauthorized")),
            other => panic!("expected error event, got {other:?}"),
        }
        assert_eq!(session.recv().await, None);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let client = Arc::new(ScriptedClient::new(["10.0.0.1"]));
        let target = Target::parse("k8s:///svc:8080").unwrap();
        let mut session = WatchSession::start(client, target);
        session.stop();
        session.stop();
    }
}
