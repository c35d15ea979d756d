//! Origin acceptance policy for inbound upgrade requests.
//!
//! The policy is a value, not a subclass hierarchy: the handler asks it a
//! single question ("is this Origin acceptable?") and callers can swap in
//! anything from "always accept" to an arbitrary predicate.

use std::fmt;
use std::sync::Arc;

use crate::config::OriginConfig;

/// Decides whether an upgrade request's Origin header is acceptable.
#[derive(Clone)]
pub enum OriginPolicy {
    /// Accept every request regardless of Origin.
    AllowAny,
    /// Accept origins matching any of the glob patterns (`*` wildcard).
    /// Requests without an Origin header and localhost origins are always
    /// accepted; non-browser clients typically send no Origin at all.
    Allowlist(Vec<String>),
    /// Caller-supplied predicate over the raw Origin header value.
    Custom(Arc<dyn Fn(Option<&str>) -> bool + Send + Sync>),
}

impl fmt::Debug for OriginPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginPolicy::AllowAny => write!(f, "OriginPolicy::AllowAny"),
            OriginPolicy::Allowlist(patterns) => {
                write!(f, "OriginPolicy::Allowlist({patterns:?})")
            }
            OriginPolicy::Custom(_) => write!(f, "OriginPolicy::Custom(..)"),
        }
    }
}

impl OriginPolicy {
    /// Build a policy from file configuration.
    pub fn from_config(config: &OriginConfig) -> Self {
        if config.allow_any {
            OriginPolicy::AllowAny
        } else {
            OriginPolicy::Allowlist(config.allowlist.clone())
        }
    }

    /// Returns `true` if a request carrying this Origin header may upgrade.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match self {
            OriginPolicy::AllowAny => true,
            OriginPolicy::Custom(predicate) => predicate(origin),
            OriginPolicy::Allowlist(patterns) => match origin {
                None => true,
                Some("") => false,
                Some(origin) => {
                    is_localhost(origin) || patterns.iter().any(|p| glob_match(p, origin))
                }
            },
        }
    }
}

impl Default for OriginPolicy {
    fn default() -> Self {
        OriginPolicy::AllowAny
    }
}

/// Returns `true` if the origin points at the local machine.
fn is_localhost(origin: &str) -> bool {
    let host = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        .unwrap_or(origin);

    // Bracketed IPv6 loopback, with or without a port.
    if let Some(rest) = host.strip_prefix('[') {
        return matches!(rest.split(']').next(), Some("::1"));
    }
    if host == "::1" {
        return true;
    }

    // Strip a trailing :port if present.
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };

    matches!(host, "localhost" | "127.0.0.1")
}

/// Glob matching where `*` matches any sequence of characters. No other
/// wildcards are supported.
fn glob_match(pattern: &str, value: &str) -> bool {
    let mut segments = pattern.split('*');

    // Text before the first `*` must be a prefix (the whole string when the
    // pattern has no wildcard at all).
    let first = segments.next().unwrap_or("");
    if !pattern.contains('*') {
        return pattern == value;
    }
    let Some(mut remaining) = value.strip_prefix(first) else {
        return false;
    };

    let rest: Vec<&str> = segments.collect();
    for (i, segment) in rest.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == rest.len() - 1 {
            // Text after the last `*` must be a suffix.
            return remaining.ends_with(segment);
        }
        match remaining.find(segment) {
            Some(pos) => remaining = &remaining[pos + segment.len()..],
            None => return false,
        }
    }

    true
}
