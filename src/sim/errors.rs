use thiserror::Error;

/// Errors raised by the persistence and scheduling layers. Player mistakes
/// are not errors; they travel as [`crate::sim::Rejection`] values.
#[derive(Debug, Error)]
pub enum PetError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, lock files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Storage is temporarily out of reach; the operation may be retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored record violates an invariant and must be inspected by hand.
    #[error("corrupt record for {player}: {reason}")]
    Corrupt { player: String, reason: String },

    /// The player was flagged earlier and is not processed until released.
    #[error("player {0} is quarantined")]
    Quarantined(String),

    /// Internal error (task join errors, unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}

/// How callers should react to a [`PetError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry later; nothing was saved.
    Transient,
    /// Stop processing the player and flag it for inspection.
    Fatal,
}

impl PetError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PetError::Unavailable(_) | PetError::Io(_) => ErrorClass::Transient,
            PetError::Sled(sled::Error::Io(_)) => ErrorClass::Transient,
            PetError::Sled(_)
            | PetError::Bincode(_)
            | PetError::SchemaMismatch { .. }
            | PetError::Corrupt { .. }
            | PetError::Quarantined(_)
            | PetError::NotFound(_)
            | PetError::Internal(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}
