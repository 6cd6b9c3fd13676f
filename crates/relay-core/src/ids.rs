//! Connection identifiers.
//!
//! A [`ConnectionId`] is assigned when a session is registered and is never
//! reused within the lifetime of the process. IDs are UUID v7 (time-ordered)
//! generated via [`uuid::Uuid::now_v7`], so sorting them approximates
//! registration order.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix on every generated connection ID.
const PREFIX: &str = "conn_";

/// Opaque, process-unique identifier of a registered session.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("{PREFIX}{}", Uuid::now_v7().simple()))
    }

    /// Wrap an existing string, e.g. a routing target from a request path.
    ///
    /// No validation is done: an unknown value simply never matches a
    /// registered session.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
