/// TCP server implementation for the agent log daemon.
///
/// This module provides the [`Router`] which handles incoming TCP connections
/// and dispatches unlock, list, append and delete requests to the log.
pub mod router;

pub use router::Router;
