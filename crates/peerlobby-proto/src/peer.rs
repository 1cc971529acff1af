//! Participant identity and roster records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque transport-level connection identifier.
///
/// Assigned by the transport when a participant comes online. Two roster
/// entries never share a `PeerId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap a transport identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the underlying string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Connection identifier, the participant's identity.
    pub id: PeerId,
    /// Display name chosen at join time.
    pub name: String,
    /// Whether the participant has signalled readiness.
    pub ready: bool,
}

impl Participant {
    /// New participant that has not yet signalled readiness.
    pub fn new(id: PeerId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), ready: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_serializes_as_bare_string() {
        let json = serde_json::to_string(&PeerId::new("user-ABCDE")).unwrap();
        assert_eq!(json, "\"user-ABCDE\"");
    }

    #[test]
    fn participant_starts_not_ready() {
        let alice = Participant::new(PeerId::new("user-ABCDE"), "Alice");
        assert!(!alice.ready);
        assert_eq!(alice.name, "Alice");
    }
}
