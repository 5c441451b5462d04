/// Software Development Kit (SDK) for the agent log.
///
/// This module provides a high-level API for reaching the log, including
/// automatic mode discovery and a remote TCP client.
pub mod client;
/// Automatic mode discovery and log initialization.
pub mod discovery;

pub use client::Client;
pub use discovery::new;
