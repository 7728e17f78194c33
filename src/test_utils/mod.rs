//! Utilities to help with testing resolvers

use crate::client::{EndpointsChange, EndpointsClient, EndpointsStream};
use crate::endpoint::Endpoint;
use crate::target::Target;

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

// What a scripted watch feed should yield next.
enum FeedItem {
    Change(EndpointsChange),
    Failure(String),
}

struct Feed {
    // The live end of the most recently opened watch stream, if any.
    live: Option<mpsc::UnboundedSender<Result<EndpointsChange, anyhow::Error>>>,
    // Items queued before (or between) watch streams.
    pending: VecDeque<FeedItem>,
    pending_close: bool,
}

/// A test-only orchestrator client with a scripted list result and a
/// scripted watch feed.
///
/// Tests push changes and failures at any point; the client routes
/// them into whichever watch stream is currently open, or queues them
/// for the next one. List calls can be gated to keep a fetch pending.
pub struct ScriptedClient {
    list_result: Mutex<BTreeSet<Endpoint>>,
    list_failures: Mutex<VecDeque<String>>,
    list_calls: AtomicUsize,
    list_times: Mutex<Vec<tokio::time::Instant>>,
    watch_calls: AtomicUsize,
    gate: watch::Sender<bool>,
    feed: Mutex<Feed>,
}

impl ScriptedClient {
    pub fn new<I, S>(initial: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Endpoint>,
    {
        let (gate, _rx) = watch::channel(false);
        Self {
            list_result: Mutex::new(initial.into_iter().map(Into::into).collect()),
            list_failures: Mutex::new(VecDeque::new()),
            list_calls: AtomicUsize::new(0),
            list_times: Mutex::new(Vec::new()),
            watch_calls: AtomicUsize::new(0),
            gate,
            feed: Mutex::new(Feed {
                live: None,
                pending: VecDeque::new(),
                pending_close: false,
            }),
        }
    }

    /// Changes what subsequent list calls return.
    pub fn set_list<I, S>(&self, endpoints: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Endpoint>,
    {
        *self.list_result.lock().unwrap() = endpoints.into_iter().map(Into::into).collect();
    }

    /// Queues a one-shot failure for the next list call.
    pub fn fail_next_list(&self, detail: impl ToString) {
        self.list_failures
            .lock()
            .unwrap()
            .push_back(detail.to_string());
    }

    /// Stalls all list calls until [Self::release_lists].
    pub fn gate_lists(&self) {
        self.gate.send_replace(true);
    }

    pub fn release_lists(&self) {
        self.gate.send_replace(false);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// When each list call was served, in tokio time.
    pub fn list_times(&self) -> Vec<tokio::time::Instant> {
        self.list_times.lock().unwrap().clone()
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Emits an incremental change on the watch feed.
    pub fn push_change(&self, change: EndpointsChange) {
        let mut feed = self.feed.lock().unwrap();
        if let Some(live) = &feed.live {
            if live.send(Ok(change.clone())).is_ok() {
                return;
            }
            feed.live = None;
        }
        feed.pending.push_back(FeedItem::Change(change));
    }

    /// Emits a transport failure on the watch feed; the stream ends
    /// after it.
    pub fn push_failure(&self, detail: impl ToString) {
        let mut feed = self.feed.lock().unwrap();
        if let Some(live) = feed.live.take() {
            if live.send(Err(anyhow!(detail.to_string()))).is_ok() {
                return;
            }
        }
        feed.pending.push_back(FeedItem::Failure(detail.to_string()));
    }

    /// Ends the watch feed without a failure, as a server hang-up
    /// would.
    pub fn close_watch(&self) {
        let mut feed = self.feed.lock().unwrap();
        if feed.live.take().is_none() {
            feed.pending_close = true;
        }
    }

    async fn wait_for_gate(&self) {
        let mut gate = self.gate.subscribe();
        gate.wait_for(|gated| !gated)
            .await
            .expect("gate sender lives as long as the client");
    }
}

#[async_trait]
impl EndpointsClient for ScriptedClient {
    async fn list(&self, _target: &Target) -> Result<BTreeSet<Endpoint>, anyhow::Error> {
        self.wait_for_gate().await;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.list_times.lock().unwrap().push(tokio::time::Instant::now());
        if let Some(detail) = self.list_failures.lock().unwrap().pop_front() {
            return Err(anyhow!(detail));
        }
        Ok(self.list_result.lock().unwrap().clone())
    }

    async fn watch(&self, _target: &Target) -> Result<EndpointsStream, anyhow::Error> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut feed = self.feed.lock().unwrap();
        for item in feed.pending.drain(..) {
            let item = match item {
                FeedItem::Change(change) => Ok(change),
                FeedItem::Failure(detail) => Err(anyhow!(detail)),
            };
            let _ = tx.send(item);
        }
        if feed.pending_close {
            feed.pending_close = false;
        } else {
            feed.live = Some(tx);
        }
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
