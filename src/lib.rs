//! Agent Logstore is a password-gated, encrypted-at-rest event log.
//!
//! Every activity record the local agent produces (email summaries, tailored
//! resumes, ...) is kept in a single file sealed with AES-256-GCM under a key
//! derived from the user's password with Argon2id. Plaintext only ever exists
//! in memory while a [`engine::Session`] is unlocked, and every mutation is
//! written back with an atomic write-then-rename.
//!
//! ## Core Components
//! - [`engine`]: Key derivation, sealing, the record model and the session gate.
//! - [`sdk`]: Embedded and remote (TCP) access to the log.
//! - [`server`]: TCP daemon exposing the log to a UI or web backend.
//! - [`wire`]: JSON bodies shared by the daemon and the remote client.
//!
//! ## Concurrency
//! A single writer per store file is assumed. Operations within one process are
//! serialized by the session, but two processes that unlock the same file each
//! keep their own copy and the last one to persist wins. There are no file locks.

pub mod engine;
pub mod sdk;
pub mod server;
pub mod wire;

use async_trait::async_trait;
use thiserror::Error;

pub use engine::filter::QueryFilter;
pub use engine::records::{EventType, LogRecord, Meta};

/// Errors returned by the log store.
#[derive(Error, Debug)]
pub enum Error {
    /// The store could not be decrypted: wrong password or a corrupted file.
    /// The two causes are indistinguishable under authenticated encryption.
    #[error("unable to unlock: incorrect password or corrupted log file")]
    Unlock,
    /// A list or mutation was attempted without an unlocked session.
    #[error("log store is locked")]
    NotUnlocked,
    /// Reading or writing the store file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Key derivation or encryption could not be performed.
    #[error("crypto error: {0}")]
    Crypto(String),
    /// The caller supplied a malformed argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable short code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unlock => "unlock_failed",
            Error::NotUnlocked => "not_unlocked",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Crypto(_) => "crypto",
            Error::InvalidInput(_) => "invalid_input",
            Error::Internal(_) => "internal",
        }
    }

    /// Rebuilds an error from its wire code and message.
    ///
    /// Kinds that wrap a foreign error type are rebuilt around the message;
    /// unknown codes come back as [`Error::Internal`].
    pub fn from_code(code: &str, message: &str) -> Self {
        match code {
            "unlock_failed" => Error::Unlock,
            "not_unlocked" => Error::NotUnlocked,
            "io" => Error::Io(std::io::Error::new(std::io::ErrorKind::Other, message.to_string())),
            "serialization" => Error::Serialization(serde::de::Error::custom(message)),
            "crypto" => Error::Crypto(message.to_string()),
            "invalid_input" => Error::InvalidInput(message.to_string()),
            _ => Error::Internal(message.to_string()),
        }
    }

    /// Only disk failures are worth retrying with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

/// A specialized Result type for log store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Opens and closes access to the plaintext log.
#[async_trait]
pub trait Unlocker: Send + Sync {
    /// Derives the key from `password`, decrypts the store (creating it on first
    /// use) and returns every record.
    async fn unlock(&self, password: &str) -> Result<Vec<LogRecord>>;
    /// Zeroes the key and drops the plaintext records.
    async fn lock(&self) -> Result<()>;
}

/// Read access to an unlocked log.
#[async_trait]
pub trait LogReader: Send + Sync {
    /// Returns the records matching `filter`, oldest first.
    async fn list(&self, filter: &QueryFilter) -> Result<Vec<LogRecord>>;
}

/// Mutations of an unlocked log. Each call persists before returning.
#[async_trait]
pub trait LogWriter: Send + Sync {
    /// Appends a record and returns the full updated list.
    async fn append(&self, event_type: EventType, meta: Meta, preview: &str) -> Result<Vec<LogRecord>>;
    /// Removes the record with `id` if present and returns the full list.
    /// An unknown id is a no-op.
    async fn delete(&self, id: u64) -> Result<Vec<LogRecord>>;
}

/// The complete surface external collaborators drive.
pub trait EventLog: Unlocker + LogReader + LogWriter {}

impl<T: Unlocker + LogReader + LogWriter> EventLog for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        let kinds = [
            Error::Unlock,
            Error::NotUnlocked,
            Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")),
            Error::Serialization(serde::de::Error::custom("bad json")),
            Error::Crypto("x".to_string()),
            Error::InvalidInput("x".to_string()),
            Error::Internal("x".to_string()),
        ];
        for e in kinds {
            let back = Error::from_code(e.code(), &e.to_string());
            assert_eq!(back.code(), e.code());
        }
        assert!(matches!(Error::from_code("serialization", "bad json"), Error::Serialization(_)));
        assert!(matches!(Error::from_code("whatever", "x"), Error::Internal(_)));
    }
}
