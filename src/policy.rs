//! Configuration options which can alter the behavior of a resolver.

use crate::backoff::BackoffConfig;

use tokio::time::Duration;

/// Default interval between full re-fetches of the endpoint list.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Policy which is applicable to a resolver instance.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// How often a full list fetch is forced to correct drift from a
    /// watch stream that may have gone silently stale.
    pub resync_interval: Duration,

    /// Delay schedule applied between watch restart attempts.
    pub backoff: BackoffConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            backoff: BackoffConfig::default(),
        }
    }
}
