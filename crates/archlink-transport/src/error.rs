/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel could not be opened (DNS, TCP, TLS or upgrade failure).
    #[error("failed to open {url}: {source}")]
    OpenFailed {
        /// The URL that was attempted.
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}

/// Errors produced while parsing a server address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// Nothing but whitespace was given.
    #[error("address is empty")]
    Empty,

    /// The address names a scheme other than `ws` or `wss`.
    #[error("unsupported scheme `{0}`")]
    UnsupportedScheme(String),

    /// The host part is missing or malformed.
    #[error("invalid host in `{0}`")]
    InvalidHost(String),

    /// The port is not a number in `1..=65535`.
    #[error("invalid port `{0}`")]
    InvalidPort(String),
}
