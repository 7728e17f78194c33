//! Implementation of [Resolver] that always returns a fixed address list.

use tokio::sync::watch;

use crate::endpoint::HostPort;
use crate::resolver::{Resolution, ResolutionResult, Resolver};

/// A [`Resolver`] that always reports the same address list.
///
/// Handy for tests and for deployments where the backend set is known
/// up front and never changes.
#[derive(Clone, Debug)]
pub struct FixedResolver {
    tx: watch::Sender<Resolution>,
}

impl FixedResolver {
    pub fn new(addrs: impl IntoIterator<Item = HostPort>) -> FixedResolver {
        let result = ResolutionResult::Success(addrs.into_iter().collect());
        let (tx, _rx) = watch::channel(Some(result));
        FixedResolver { tx }
    }
}

#[async_trait::async_trait]
impl Resolver for FixedResolver {
    fn monitor(&mut self) -> watch::Receiver<Resolution> {
        self.tx.subscribe()
    }
}
