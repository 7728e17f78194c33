//! The interface for the resolver, which turns a logical service name
//! into concrete addresses.

use crate::endpoint::HostPort;
use crate::target::ParseError;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

/// Why a resolution attempt produced no usable address list.
///
/// Consumers only ever see these kinds; raw transport errors are
/// normalized away at the watch session boundary.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ResolveError {
    /// The target string was malformed. Permanent: never retried,
    /// cached for the life of the instance and replayed on request.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The watch subscription failed. Transient: retried with backoff,
    /// but surfaced immediately when it occurs.
    #[error("endpoints watch for {target} failed: {detail}")]
    Watch { target: String, detail: String },

    /// The watched resource currently has no endpoints at all.
    #[error("no endpoints available for {target}")]
    NoEndpoints { target: String },
}

/// The outcome a resolver pushes to its consumer.
///
/// A `Success` never carries an empty address list; a load balancer
/// must never be told "healthy with zero backends".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolutionResult {
    Success(Vec<HostPort>),
    Failure(ResolveError),
}

/// The most recent result pushed by a resolver; `None` until the first
/// resolution completes.
pub type Resolution = Option<ResolutionResult>;

/// Translates a service name into an address list for an RPC client.
///
/// The resolver is responsible for knowing which single named resource
/// it is resolving, and for keeping the published list current; it does
/// not track backend health.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Start observing resolution results.
    ///
    /// The receiver always holds the latest [Resolution]; new
    /// subscribers immediately see the latched value.
    fn monitor(&mut self) -> watch::Receiver<Resolution>;

    /// Forces an immediate recheck. If the latched result is a
    /// failure it is re-delivered, asynchronously, never inline with
    /// this call. Default: no-op.
    fn refresh(&self) {}

    /// Cleanly terminates the resolver.
    ///
    /// Idempotent. This ensures that background tasks, if they exist,
    /// have stopped, and that no new result is pushed afterwards.
    async fn terminate(&mut self) {}
}

/// Helper type for anything that implements the Resolver interface.
pub type BoxedResolver = Box<dyn Resolver>;
