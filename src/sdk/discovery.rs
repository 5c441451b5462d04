use std::env;
use std::path::Path;
use std::sync::Arc;
use crate::{EventLog, Result};
use crate::engine::{EncryptedStore, LocalLog};
use crate::sdk::Client;

/// Environment variable naming a running daemon to connect to.
pub const ADDR_ENV: &str = "AGENTLOG_ADDR";

/// Opens an [`EventLog`] based on the environment.
///
/// 1. If `AGENTLOG_ADDR` is set, it connects to that daemon in **Remote Mode**.
/// 2. Otherwise, or if the daemon is unreachable, it opens the file at `path`
///    in **Embedded Mode**.
///
/// Either way the returned log starts locked until [`unlock`](crate::Unlocker::unlock)
/// is called, unless the daemon already holds an unlocked session.
///
/// # Examples
///
/// ```no_run
/// use agent_logstore::{sdk, Unlocker};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let log = sdk::new("./agent_history.alog").await?;
///     let records = log.unlock("hunter2").await?;
///     println!("{} records", records.len());
///     Ok(())
/// }
/// ```
pub async fn new<P: AsRef<Path>>(path: P) -> Result<Arc<dyn EventLog>> {
    if let Ok(addr) = env::var(ADDR_ENV) {
        if !addr.is_empty() {
            match Client::connect(&addr).await {
                Ok(client) => return Ok(Arc::new(client)),
                Err(e) => log::warn!("Could not reach daemon at {}: {}. Falling back to embedded mode.", addr, e),
            }
        }
    }

    Ok(Arc::new(LocalLog::new(EncryptedStore::new(path))))
}
