//! The interface for talking to the cluster orchestrator.
//!
//! Listing, pagination, authentication, and TLS all live behind
//! [EndpointsClient]; this crate only consumes the normalized change
//! feed. A single client handle is read-mostly and may be shared by
//! any number of independent resolver instances.

use crate::endpoint::Endpoint;
use crate::target::Target;

use async_trait::async_trait;
use futures::Stream;
use std::collections::BTreeSet;
use std::pin::Pin;
use std::sync::Arc;

/// One incremental change reported by the orchestrator's watch feed.
///
/// `Added` and `Removed` are only meaningful relative to the full
/// baseline established when the feed was opened; delivery across
/// reconnects is not gap-free, which is why every fresh subscription
/// starts from a [EndpointsClient::list] snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointsChange {
    Added(Endpoint),
    Removed(Endpoint),
    Replaced(BTreeSet<Endpoint>),
}

/// The change feed for one named resource.
pub type EndpointsStream = Pin<Box<dyn Stream<Item = Result<EndpointsChange, anyhow::Error>> + Send>>;

/// Queries and watches the endpoint records for exactly one named
/// resource within one namespace (a server-side exact-name filter).
#[async_trait]
pub trait EndpointsClient: Send + Sync {
    /// Fetches the full set of addresses currently backing the target.
    async fn list(&self, target: &Target) -> Result<BTreeSet<Endpoint>, anyhow::Error>;

    /// Opens a change-notification subscription for the target.
    ///
    /// The stream ends after yielding an `Err`; reconnecting is the
    /// caller's job.
    async fn watch(&self, target: &Target) -> Result<EndpointsStream, anyhow::Error>;
}

/// Helper type for a client handle shared across resolver instances.
pub type SharedEndpointsClient = Arc<dyn EndpointsClient>;
