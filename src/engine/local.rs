use std::sync::Arc;
use async_trait::async_trait;
use crate::{Result, Error, Unlocker, LogReader, LogWriter, EventType, LogRecord, Meta, QueryFilter};
use crate::engine::{EncryptedStore, Session};

/// Embedded access to a log file.
///
/// Every call runs the blocking [`Session`] operation on tokio's blocking pool,
/// keeping key derivation and file writes off the async workers.
#[derive(Clone)]
pub struct LocalLog {
    session: Arc<Session>,
}

impl LocalLog {
    pub fn new(store: EncryptedStore) -> Self {
        Self::from_session(Arc::new(Session::new(store)))
    }

    pub fn from_session(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> Result<T> + Send + 'static,
    {
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || f(session.as_ref()))
            .await
            .map_err(|e| Error::Internal(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl Unlocker for LocalLog {
    async fn unlock(&self, password: &str) -> Result<Vec<LogRecord>> {
        let password = zeroize::Zeroizing::new(password.to_string());
        self.run(move |s| s.unlock(&password)).await
    }

    async fn lock(&self) -> Result<()> {
        self.run(|s| s.lock()).await
    }
}

#[async_trait]
impl LogReader for LocalLog {
    async fn list(&self, filter: &QueryFilter) -> Result<Vec<LogRecord>> {
        let filter = filter.clone();
        self.run(move |s| s.list(&filter)).await
    }
}

#[async_trait]
impl LogWriter for LocalLog {
    async fn append(&self, event_type: EventType, meta: Meta, preview: &str) -> Result<Vec<LogRecord>> {
        let preview = preview.to_string();
        self.run(move |s| s.append(event_type, meta, &preview)).await
    }

    async fn delete(&self, id: u64) -> Result<Vec<LogRecord>> {
        self.run(move |s| s.delete(id)).await
    }
}
