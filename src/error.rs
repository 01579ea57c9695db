//! Error types for the tunnel broker.

/// Domain-specific errors for tunnel registration, routing, and startup.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    /// The configured host key file is missing or does not parse as an OpenSSH private key.
    #[error("failed to load host key from '{path}': {reason}")]
    HostKey { path: String, reason: String },

    /// Tunnel not found for the requested label; surfaced to the HTTP front end as a 404.
    #[error("tunnel not found for label '{0}'")]
    TunnelNotFound(String),

    /// Opening a `forwarded-tcpip` channel on the owning session failed.
    #[error("failed to open channel for label '{0}': {1}")]
    ChannelOpenFailed(String, String),

    /// Underlying SSH protocol error.
    #[error("SSH protocol error: {0}")]
    Ssh(#[from] russh::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
