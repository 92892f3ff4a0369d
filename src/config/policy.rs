// ABOUTME: Known-hosts verification policy.
// ABOUTME: Parses user-facing policy names, defaulting to strict verification.

use serde::{Deserialize, Deserializer};
use std::fmt;

/// How host keys presented by the server are checked against the known-hosts store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KnownHostsPolicy {
    /// Reject unknown and mismatched keys.
    #[default]
    Strict,
    /// Record unknown keys, reject mismatched ones.
    AcceptNew,
    /// Skip verification entirely (insecure).
    Ignore,
}

impl KnownHostsPolicy {
    /// Parse a policy name. Anything unrecognized is `Strict`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "ignore" | "insecure" => KnownHostsPolicy::Ignore,
            "accept-new" | "add-unknown" => KnownHostsPolicy::AcceptNew,
            "strict" | "" => KnownHostsPolicy::Strict,
            other => {
                tracing::warn!("unknown known-hosts policy {other:?}, using strict");
                KnownHostsPolicy::Strict
            }
        }
    }
}

impl fmt::Display for KnownHostsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnownHostsPolicy::Strict => write!(f, "strict"),
            KnownHostsPolicy::AcceptNew => write!(f, "accept-new"),
            KnownHostsPolicy::Ignore => write!(f, "ignore"),
        }
    }
}

impl<'de> Deserialize<'de> for KnownHostsPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(KnownHostsPolicy::parse(&raw))
    }
}
