//! Implementation of [Resolver] for cluster endpoint records.

use crate::backoff::Backoff;
use crate::client::SharedEndpointsClient;
use crate::endpoint::{Endpoint, EndpointSet};
use crate::policy::ResolverConfig;
use crate::resolver::{Resolution, ResolutionResult, ResolveError, Resolver};
use crate::target::Target;
use crate::watch::{WatchEvent, WatchSession};

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeSet;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, Sleep};
use tracing::{event, Level};

// Requests sent from the public handle to the worker task.
enum Command {
    Refresh,
}

// Where the resolver currently is in its lifecycle.
//
// Owned exclusively by the worker; the handle only ever observes
// results through the watch channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Initializing,
    Watching,
    Backoff,
    ParseFailed,
    ShuttingDown,
}

type ResyncFetch = BoxFuture<'static, Result<BTreeSet<Endpoint>, anyhow::Error>>;

/// Maintains the address set for one watched resource and pushes
/// resolution results to the watch channel.
struct ResolverWorker {
    client: SharedEndpointsClient,
    target: Target,
    config: ResolverConfig,

    // The working address set; mutated only through its apply_*
    // operations, whose "changed" result gates every push.
    endpoints: EndpointSet,

    // Paces watch restarts. Reset by processed watch events, never by
    // resync activity.
    backoff: Backoff,

    // Message-passing channel to notify the consumer of results.
    result_tx: watch::Sender<Resolution>,

    state: State,
}

impl ResolverWorker {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut terminate_rx: oneshot::Receiver<()>,
    ) {
        let mut session = Some(WatchSession::start(
            self.client.clone(),
            self.target.clone(),
        ));
        self.transition(State::Watching);

        // The session's own baseline list covers startup, so the first
        // resync lands a full interval later.
        let mut resync = interval_at(
            Instant::now() + self.config.resync_interval,
            self.config.resync_interval,
        );
        let mut restart: Option<Pin<Box<Sleep>>> = None;
        let mut resync_fetch: Option<ResyncFetch> = None;

        loop {
            tokio::select! {
                _ = &mut terminate_rx => break,
                command = cmd_rx.recv() => {
                    match command {
                        Some(Command::Refresh) => self.handle_refresh(&mut resync_fetch),
                        // Every handle is gone; nothing left to serve.
                        None => break,
                    }
                },
                watch_event = next_event(&mut session), if session.is_some() => {
                    match watch_event {
                        Some(WatchEvent::Added(endpoint)) => {
                            self.backoff.reset();
                            if self.endpoints.apply_add(endpoint) {
                                self.push_current();
                            }
                        }
                        Some(WatchEvent::Removed(endpoint)) => {
                            self.backoff.reset();
                            if self.endpoints.apply_remove(&endpoint) {
                                self.push_current();
                            }
                        }
                        Some(WatchEvent::Replaced(full_set)) => {
                            self.backoff.reset();
                            if self.endpoints.apply_replace(full_set) {
                                self.push_current();
                            }
                        }
                        Some(WatchEvent::Error(detail)) => {
                            self.begin_backoff(detail, &mut session, &mut restart);
                        }
                        // The event channel closed without a terminal
                        // error; indistinguishable from one.
                        None => {
                            let detail = "watch session ended unexpectedly".to_string();
                            self.begin_backoff(detail, &mut session, &mut restart);
                        }
                    }
                },
                _ = wait_restart(&mut restart), if restart.is_some() => {
                    restart = None;
                    event!(Level::INFO, target = %self.target, "Restarting endpoints watch");
                    session = Some(WatchSession::start(
                        self.client.clone(),
                        self.target.clone(),
                    ));
                    self.transition(State::Watching);
                },
                _ = resync.tick() => self.arm_resync(&mut resync_fetch),
                fetched = wait_fetch(&mut resync_fetch), if resync_fetch.is_some() => {
                    resync_fetch = None;
                    self.handle_resync_result(fetched);
                },
            }
        }

        self.transition(State::ShuttingDown);
        if let Some(mut session) = session.take() {
            session.stop();
        }
    }

    // Stops the session, surfaces the failure right away, and arms the
    // restart timer. The retry itself is paced, the report is not.
    fn begin_backoff(
        &mut self,
        detail: String,
        session: &mut Option<WatchSession>,
        restart: &mut Option<Pin<Box<Sleep>>>,
    ) {
        if let Some(mut session) = session.take() {
            session.stop();
        }
        self.push(ResolutionResult::Failure(ResolveError::Watch {
            target: self.target.to_string(),
            detail,
        }));
        let delay = self.backoff.next();
        event!(
            Level::WARN,
            target = %self.target,
            ?delay,
            attempt = self.backoff.attempt(),
            "Endpoints watch failed; scheduling restart"
        );
        *restart = Some(Box::pin(sleep(delay)));
        self.transition(State::Backoff);
    }

    fn handle_refresh(&mut self, resync_fetch: &mut Option<ResyncFetch>) {
        // Re-deliver a latched failure so the consumer observes a
        // fresh notification, then recheck the endpoint list.
        let latched = self.result_tx.borrow().clone();
        if let Some(result @ ResolutionResult::Failure(_)) = latched {
            self.push(result);
        }
        self.arm_resync(resync_fetch);
    }

    fn arm_resync(&mut self, resync_fetch: &mut Option<ResyncFetch>) {
        if resync_fetch.is_some() {
            // At most one resync runs per instance; a trigger arriving
            // while one is in flight is dropped, not queued.
            event!(
                Level::DEBUG,
                target = %self.target,
                "Resync already in flight; dropping trigger"
            );
            return;
        }
        event!(Level::DEBUG, target = %self.target, "Starting resync fetch");
        let client = self.client.clone();
        let target = self.target.clone();
        *resync_fetch = Some(async move { client.list(&target).await }.boxed());
    }

    fn handle_resync_result(&mut self, fetched: Result<BTreeSet<Endpoint>, anyhow::Error>) {
        match fetched {
            Ok(full_set) => {
                // Resync corrects drift but says nothing about watch
                // health; the backoff state is left alone.
                if self.endpoints.apply_replace(full_set) {
                    event!(
                        Level::INFO,
                        target = %self.target,
                        endpoints = self.endpoints.len(),
                        "Resync corrected endpoint drift"
                    );
                    self.push_current();
                }
            }
            Err(err) => {
                // The watch path owns failure surfacing; a failed
                // resync just means no drift correction this round.
                event!(Level::WARN, target = %self.target, err = ?err, "Resync fetch failed");
            }
        }
    }

    fn push_current(&mut self) {
        let result = if self.endpoints.is_empty() {
            // Scale-to-zero is reported as an explicit failure; a
            // Success with an empty list is never pushed.
            ResolutionResult::Failure(ResolveError::NoEndpoints {
                target: self.target.to_string(),
            })
        } else {
            ResolutionResult::Success(self.endpoints.to_host_ports(self.target.port()))
        };
        self.push(result);
    }

    fn push(&mut self, result: ResolutionResult) {
        event!(Level::DEBUG, target = %self.target, result = ?result, "Pushing resolution result");
        self.result_tx.send_replace(Some(result));
    }

    fn transition(&mut self, next: State) {
        if self.state == next {
            return;
        }
        event!(
            Level::DEBUG,
            target = %self.target,
            from = ?self.state,
            to = ?next,
            "Resolver state transition"
        );
        self.state = next;
    }
}

async fn next_event(session: &mut Option<WatchSession>) -> Option<WatchEvent> {
    match session {
        Some(session) => session.recv().await,
        None => futures::future::pending().await,
    }
}

async fn wait_restart(restart: &mut Option<Pin<Box<Sleep>>>) {
    match restart {
        Some(sleep) => sleep.as_mut().await,
        None => futures::future::pending().await,
    }
}

async fn wait_fetch(fetch: &mut Option<ResyncFetch>) -> Result<BTreeSet<Endpoint>, anyhow::Error> {
    match fetch {
        Some(fetch) => fetch.as_mut().await,
        None => futures::future::pending().await,
    }
}

// A malformed target is a caller bug, never retried: this worker only
// replays the latched parse failure on refresh.
async fn replay_parse_failure(
    result_tx: watch::Sender<Resolution>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut terminate_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut terminate_rx => return,
            command = cmd_rx.recv() => {
                match command {
                    Some(Command::Refresh) => {
                        // Delivered from this task, never inline with
                        // the refresh() caller.
                        let latched = result_tx.borrow().clone();
                        result_tx.send_replace(latched);
                    }
                    None => return,
                }
            },
        }
    }
}

/// Implements [Resolver] by watching the endpoint records of a single
/// named resource.
///
/// The heavy lifting happens in a worker task owning all mutable
/// state, so the handle is cheap to use from anywhere.
pub struct EndpointsResolver {
    handle: Option<JoinHandle<()>>,
    terminate_tx: Option<oneshot::Sender<()>>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    result_rx: watch::Receiver<Resolution>,
}

impl EndpointsResolver {
    /// Creates a resolver for `uri` (`k8s://namespace/service:port`).
    ///
    /// The target is parsed exactly once, here. A malformed target
    /// latches a permanent parse failure: the orchestrator is never
    /// contacted, and every subsequent observation sees that same
    /// failure.
    pub fn new(client: SharedEndpointsClient, uri: &str, config: ResolverConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (terminate_tx, terminate_rx) = oneshot::channel();

        match Target::parse(uri) {
            Ok(target) => {
                event!(Level::DEBUG, %target, "Resolver constructed");
                let (result_tx, result_rx) = watch::channel(None);
                let backoff = Backoff::new(config.backoff.clone());
                let worker = ResolverWorker {
                    client,
                    target,
                    config,
                    endpoints: EndpointSet::new(),
                    backoff,
                    result_tx,
                    state: State::Initializing,
                };
                let handle = tokio::task::spawn(worker.run(cmd_rx, terminate_rx));
                Self {
                    handle: Some(handle),
                    terminate_tx: Some(terminate_tx),
                    cmd_tx,
                    result_rx,
                }
            }
            Err(err) => {
                event!(Level::WARN, uri, err = %err, state = ?State::ParseFailed, "Failed to parse resolver target");
                let failure = ResolutionResult::Failure(ResolveError::Parse(err));
                let (result_tx, result_rx) = watch::channel(Some(failure));
                let handle =
                    tokio::task::spawn(replay_parse_failure(result_tx, cmd_rx, terminate_rx));
                Self {
                    handle: Some(handle),
                    terminate_tx: Some(terminate_tx),
                    cmd_tx,
                    result_rx,
                }
            }
        }
    }
}

impl Drop for EndpointsResolver {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        handle.abort();
    }
}

#[async_trait::async_trait]
impl Resolver for EndpointsResolver {
    fn monitor(&mut self) -> watch::Receiver<Resolution> {
        self.result_rx.clone()
    }

    fn refresh(&self) {
        // After terminate there is no worker to serve the request and
        // refresh is a no-op, as documented.
        let _ = self.cmd_tx.send(Command::Refresh);
    }

    async fn terminate(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let Some(terminate_tx) = self.terminate_tx.take() else {
            return;
        };

        let _send_result = terminate_tx.send(());
        propagate_panics(handle.await);
    }
}

fn propagate_panics(result: Result<(), tokio::task::JoinError>) {
    match result {
        // Success or cancellation: quietly return.
        Ok(()) => (),
        Err(err) if err.is_cancelled() => (),
        Err(err) if err.is_panic() => {
            std::panic::panic_any(err.into_panic());
        }
        Err(err) => {
            panic!("Unexpected join error (other than panic or cancellation): {err}");
        }
    }
}
