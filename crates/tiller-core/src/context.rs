//! Per-request context.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated caller, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Stable identity id.
    pub id: String,
    /// Email address the identity authenticated with.
    pub email: String,
    /// Whether the email address has been verified.
    pub email_verified: bool,
    /// Token issuer.
    pub issuer: String,
}

impl Identity {
    /// The domain part of the identity's email, if well-formed.
    pub fn email_domain(&self) -> Option<&str> {
        self.email.rsplit_once('@').map(|(_, domain)| domain)
    }
}

/// Ambient request state the engine reads but never owns.
///
/// Cancellation and deadlines ride on the caller's async context; this
/// type only carries the data expressions can reference (`ctx.*`).
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The authenticated caller; `None` for anonymous requests.
    pub identity: Option<Identity>,
    /// Request arrival time, used for `ctx.now`.
    pub now: DateTime<Utc>,
    /// Selected request headers exposed to expressions.
    pub headers: BTreeMap<String, String>,
}

impl RequestContext {
    /// An anonymous context at the given instant.
    pub fn anonymous(now: DateTime<Utc>) -> Self {
        Self {
            identity: None,
            now,
            headers: BTreeMap::new(),
        }
    }

    /// A context authenticated as the given identity.
    pub fn authenticated(identity: Identity, now: DateTime<Utc>) -> Self {
        Self {
            identity: Some(identity),
            now,
            headers: BTreeMap::new(),
        }
    }

    /// Whether a caller identity is present.
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}
