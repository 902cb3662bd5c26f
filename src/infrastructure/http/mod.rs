//! HTTP transport adapters.

pub mod reqwest_transport;

pub use reqwest_transport::{DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, ReqwestTransport};
