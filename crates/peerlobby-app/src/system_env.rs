//! Production Environment implementation using the OS RNG.
//!
//! Room codes drawn from `SystemEnv` are not reproducible. Use a seeded
//! environment for tests.

use peerlobby_core::Environment;

/// Production environment backed by getrandom.
///
/// # Panics
///
/// Panics if the OS RNG fails. Without randomness every participant would
/// claim the same room code.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
