//! Common types for the ChaosForge environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tracked entity.
///
/// Uses UUID v4 for global uniqueness without coordination. Identifiers are
/// never reused, so a stale id can only ever miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Creates a new random EntityId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an EntityId from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Creates a v4-shaped EntityId from caller-supplied random bytes.
    ///
    /// Used by seeded contexts so identifiers are reproducible.
    pub fn from_random_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    /// Parses the hyphenated textual form. Returns `None` on malformed input.
    pub fn parse(text: &str) -> Option<Self> {
        Uuid::parse_str(text).ok().map(Self)
    }

    /// Folds the id into a 64-bit value for RNG stream derivation.
    pub fn stream(&self) -> u64 {
        let (hi, lo) = self.0.as_u64_pair();
        hi ^ lo.rotate_left(17)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrips_display() {
        let id = EntityId::new();
        assert_eq!(EntityId::parse(&id.to_string()), Some(id));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(EntityId::parse("not-an-id"), None);
        assert_eq!(EntityId::parse(""), None);
    }

    #[test]
    fn test_from_random_bytes_is_deterministic() {
        let a = EntityId::from_random_bytes([7u8; 16]);
        let b = EntityId::from_random_bytes([7u8; 16]);
        assert_eq!(a, b);
        assert_eq!(a.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_stream_differs_between_ids() {
        let a = EntityId::from_random_bytes([1u8; 16]);
        let b = EntityId::from_random_bytes([2u8; 16]);
        assert_ne!(a.stream(), b.stream());
    }
}
