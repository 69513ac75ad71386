//! Resource lease requests and their answers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Request for `amount` units of a well-known resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRequest {
    /// Well-known resource name.
    pub resource_name: String,
    /// Caller-chosen token correlating later release or renewal.
    pub cookie: String,
    /// Units requested.
    pub amount: u32,
    /// How long the lease lasts once granted.
    pub lease_seconds: u32,
}

/// Authority's answer to a [`LeaseRequest`].
///
/// A `result` of zero means granted; anything else is a denial, usually
/// with an explanation in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseResponse {
    /// Cookie of the answered request.
    pub cookie: String,
    /// Units granted or refused.
    pub amount: u32,
    /// Result code.
    pub result: u32,
    /// Reason for a denial.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LeaseResponse {
    /// Result code of a granted lease.
    pub const GRANTED: u32 = 0;
    /// Result code of a denied lease.
    pub const DENIED: u32 = 1;

    /// Builds a grant for `request`.
    #[must_use]
    pub fn granted(request: &LeaseRequest) -> Self {
        Self {
            cookie: request.cookie.clone(),
            amount: request.amount,
            result: Self::GRANTED,
            error: None,
        }
    }

    /// Builds a denial for `request`.
    #[must_use]
    pub fn denied(request: &LeaseRequest, reason: impl Into<String>) -> Self {
        Self {
            cookie: request.cookie.clone(),
            amount: request.amount,
            result: Self::DENIED,
            error: Some(reason.into()),
        }
    }

    /// Returns `true` when the lease was granted.
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        self.result == Self::GRANTED
    }

    /// Interprets the response from the requester's side.
    #[must_use]
    pub fn outcome(&self) -> LeaseOutcome {
        if self.is_granted() {
            return LeaseOutcome::Granted;
        }
        LeaseOutcome::Denied(
            self.error
                .clone()
                .unwrap_or_else(|| format!("denied with result {}", self.result)),
        )
    }
}

/// What a requester learned about its lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOutcome {
    /// The lease is held.
    Granted,
    /// The authority refused, with its reason.
    Denied(String),
}

/// Opaque identity of one requester connection at the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequesterId(u64);

impl RequesterId {
    /// Wraps a connection number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "requester-{}", self.0)
    }
}
