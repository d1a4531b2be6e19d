use serde::{Deserialize, Serialize};

/// Failure category driving the retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Transient,
    Auth,
    Network,
    Permanent,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Auth => "auth",
            Self::Network => "network",
            Self::Permanent => "permanent",
        }
    }

    /// Only transient and network failures are re-dispatched automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Network)
    }
}

const TRANSIENT_MARKERS: &[&str] = &[
    "rate limit",
    "429",
    "timeout",
    "etimedout",
    "socket hang up",
    "econnreset",
    "process exited with code 1",
];

const AUTH_MARKERS: &[&str] = &[
    "unauthorized",
    "401",
    "invalid api key",
    "forbidden",
    "403",
    "authentication",
];

const NETWORK_MARKERS: &[&str] = &["network", "enotfound", "dns", "getaddrinfo", "econnrefused"];

/// Map an error message onto its category.
///
/// Case-insensitive substring match, first matching bucket wins; anything
/// unrecognized is permanent. Total over arbitrary input.
pub fn classify_error(message: &str) -> ErrorCategory {
    let lowered = message.to_lowercase();
    if TRANSIENT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        return ErrorCategory::Transient;
    }
    if AUTH_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return ErrorCategory::Auth;
    }
    if NETWORK_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        return ErrorCategory::Network;
    }
    ErrorCategory::Permanent
}
