pub mod filter;
pub mod kdf;
pub mod local;
pub mod persistence;
pub mod records;
pub mod session;
pub mod vault;

pub use filter::QueryFilter;
pub use kdf::{DerivedKey, KdfParams};
pub use local::LocalLog;
pub use persistence::{EncryptedStore, StoreKey, DEFAULT_FILE_NAME};
pub use records::{truncate_preview, EventType, LogRecord, Meta, RecordSet, DEFAULT_PREVIEW_CHARS};
pub use session::Session;
