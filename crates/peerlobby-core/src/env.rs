//! Environment abstraction for deterministic testing.
//!
//! Decouples code allocation from system randomness. Enables deterministic
//! simulation (seeded RNG) and production use with the OS RNG.

/// Source of randomness for allocating room codes and peer identifiers.
///
/// # Invariants
///
/// - Given the same seed, a simulation environment produces the same sequence
///   of bytes
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
