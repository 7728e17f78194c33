//! k8s-resolver is a name-resolution crate for RPC clients.
//!
//! Given a logical service identifier like `k8s://prod/billing:8080`,
//! it watches the cluster orchestrator's endpoint records for that one
//! named resource and continuously publishes an up-to-date address
//! list for a client-side connection or load-balancing layer.
//!
//! It uses the following terminology:
//! * Targets name the single resource a resolver instance resolves:
//!   a namespace, a service name, and the port to attach to every
//!   resolved address.
//! * Endpoints are the network-reachable instances currently backing
//!   that resource.
//!
//! # Usage
//!
//! * The main interface for this crate is
//!   [resolvers::endpoints::EndpointsResolver], driven through the
//!   [resolver::Resolver] trait.
//! * To construct one, you must supply a [client::EndpointsClient]:
//!   the interface specifying "how to list and watch endpoint records"
//!   (the orchestrator transport, with its pagination, authentication,
//!   and TLS, lives behind it). A single client handle may be shared
//!   by any number of resolver instances.
//! * Results arrive through a `tokio::sync::watch` channel holding the
//!   latest [resolver::Resolution]: either an ordered `host:port` list
//!   or a normalized failure. A success never carries an empty list.
//!
//! The resolver reconciles the orchestrator's asynchronous change feed
//! into a consistent address set, restarts failed watch subscriptions
//! with jittered exponential backoff, and bounds staleness with a
//! periodic full resynchronization.

// Public API
pub mod backoff;
pub mod client;
pub mod endpoint;
pub mod policy;
pub mod resolver;
pub mod target;
pub mod watch;

// Default implementations of generic interfaces
pub mod resolvers;

#[cfg(test)]
mod test_utils;
