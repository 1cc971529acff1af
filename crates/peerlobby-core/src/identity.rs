//! Room codes and the peer identifier namespace.
//!
//! A room code is a short string a person can read out loud. Dialing "the
//! room" means dialing the host's transport identifier, which is the code
//! behind a fixed namespace prefix. The mapping is deterministic and
//! reversible: `RoomCode::from_peer_id(&code.peer_id()) == Ok(code)`.

use std::{fmt, str::FromStr};

use peerlobby_proto::PeerId;

use crate::{env::Environment, error::IdentityError};

/// Namespace prefix for every participant's transport identifier.
pub const PEER_ID_PREFIX: &str = "user-";

/// Number of characters in a room code.
pub const ROOM_CODE_LEN: usize = 5;

/// Code alphabet: base-36 digits, upper case.
const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Five-character shareable room code.
///
/// Always upper case. Collisions between independently generated codes are
/// not detected here; the transport rejects an identifier that is already
/// taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomCode(String);

impl RoomCode {
    /// Draw a fresh code from the environment's RNG.
    pub fn generate<E: Environment>(env: &E) -> Self {
        let len = ALPHABET.len() as u64;
        let code = (0..ROOM_CODE_LEN)
            .map(|_| char::from(ALPHABET[(env.random_u64() % len) as usize]))
            .collect();
        Self(code)
    }

    /// Parse user input, normalizing to upper case.
    ///
    /// # Errors
    ///
    /// - `IdentityError::InvalidLength` if the input is not exactly
    ///   [`ROOM_CODE_LEN`] characters
    /// - `IdentityError::InvalidCharacter` if a character is not ASCII
    ///   alphanumeric
    pub fn parse(input: &str) -> Result<Self, IdentityError> {
        let actual = input.chars().count();
        if actual != ROOM_CODE_LEN {
            return Err(IdentityError::InvalidLength { expected: ROOM_CODE_LEN, actual });
        }

        if let Some(bad) = input.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(IdentityError::InvalidCharacter(bad));
        }

        Ok(Self(input.to_ascii_uppercase()))
    }

    /// Recover the code from a namespaced transport identifier.
    ///
    /// # Errors
    ///
    /// - `IdentityError::MissingPrefix` if `id` lacks [`PEER_ID_PREFIX`]
    /// - Any error from [`RoomCode::parse`] on the suffix
    pub fn from_peer_id(id: &PeerId) -> Result<Self, IdentityError> {
        let suffix = id
            .as_str()
            .strip_prefix(PEER_ID_PREFIX)
            .ok_or_else(|| IdentityError::MissingPrefix(id.clone()))?;
        Self::parse(suffix)
    }

    /// Transport identifier a joiner dials to reach this room's host.
    pub fn peer_id(&self) -> PeerId {
        PeerId::new(format!("{PEER_ID_PREFIX}{}", self.0))
    }

    /// Code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
