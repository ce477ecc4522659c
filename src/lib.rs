//! upprobe library
//!
//! Uploads a generated payload through two transports, an event-driven one and
//! an awaitable adapter over the same primitive, and tracks upload progress in
//! an observable session per transport.

pub mod client;
pub mod config;
pub mod error;
pub mod event_transport;
pub mod payload;
pub mod progress;
pub mod promise_transport;
pub mod report;
pub mod request;
pub mod server;
pub mod session;
