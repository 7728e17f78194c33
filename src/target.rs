//! Parsing of `k8s://` resolution targets.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

/// The URI scheme handled by this crate.
pub const K8S_SCHEME: &str = "k8s";

/// The namespace assumed when the target's authority segment is empty.
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("target {uri:?} does not use the '{K8S_SCHEME}://' scheme")]
    WrongScheme { uri: String },

    #[error("target {uri:?} has an empty service name")]
    EmptyServiceName { uri: String },

    #[error("target {uri:?} is missing a port")]
    MissingPort { uri: String },

    #[error("target {uri:?} has an unparsable port {port:?}")]
    InvalidPort { uri: String, port: String },
}

/// The single named resource a resolver instance is pointed at.
///
/// Parsed from `k8s://namespace/service:port`; the namespace may be
/// omitted (`k8s:///service:port`) and defaults to
/// [DEFAULT_NAMESPACE]. A [Target] is immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target {
    namespace: Arc<str>,
    service: Arc<str>,
    port: u16,
}

impl Target {
    /// Parses a resolution target string.
    ///
    /// Failure here is a caller configuration bug, not a transient
    /// condition; callers cache it rather than retrying.
    pub fn parse(uri: &str) -> Result<Self, ParseError> {
        let Some(rest) = uri.strip_prefix(K8S_SCHEME).and_then(|rest| rest.strip_prefix("://"))
        else {
            return Err(ParseError::WrongScheme { uri: uri.to_string() });
        };

        // The authority runs up to the first '/'; an absent or empty
        // authority selects the default namespace.
        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => ("", rest),
        };
        let namespace = if authority.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            authority
        };

        let Some((service, port)) = path.rsplit_once(':') else {
            return Err(ParseError::MissingPort { uri: uri.to_string() });
        };
        if service.is_empty() {
            return Err(ParseError::EmptyServiceName { uri: uri.to_string() });
        }
        let port = port.parse().map_err(|_| ParseError::InvalidPort {
            uri: uri.to_string(),
            port: port.to_string(),
        })?;

        Ok(Self {
            namespace: Arc::from(namespace),
            service: Arc::from(service),
            port,
        })
    }

    /// The namespace holding the watched resource.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The exact resource name the watch is filtered to.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The port attached to every resolved address.
    pub fn port(&self) -> u16 {
        self.port
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Target {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl FromStr for Target {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{K8S_SCHEME}://{}/{}:{}",
            self.namespace, self.service, self.port
        )
    }
}
