//! Subdomain-routed HTTP-to-SSH tunnel broker.
//!
//! An SSH server accepts `tcpip-forward` requests that register a label; an
//! HTTP server routes requests by that label (derived from the Host header)
//! onto a fresh channel on the owning SSH session.

pub mod authorized_keys;
pub mod config;
pub mod error;
pub mod key;
pub mod proxy;
pub mod registry;
pub mod ssh;
pub mod transport;

pub use error::TunnelError;
pub use ssh::{SshHandler, TunnelServer};
