//! Client configuration.

use std::time::Duration;

use archlink_protocol::{ItemsHandling, NetworkVersion};
use archlink_transport::ProtocolPreference;
use serde::{Deserialize, Serialize};

/// Protocol version announced in `Connect` unless overridden.
pub const DEFAULT_VERSION: NetworkVersion = NetworkVersion::new(0, 6, 0);

/// Configuration for a [`Client`](crate::Client).
///
/// Every field has a sensible default, so configs can be built with
/// `ClientOptions::default()` plus the `with_*` methods, or deserialized
/// from a partial document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Secure, insecure, or secure-then-insecure.
    pub protocol: ProtocolPreference,

    /// Room password, if the room has one.
    pub password: Option<String>,

    /// Stable client identifier. A random one is generated per
    /// connection when absent.
    pub uuid: Option<String>,

    /// Capability tags announced in `Connect`.
    pub tags: Vec<String>,

    /// Minimum protocol version the client requires.
    pub version: NetworkVersion,

    /// Which item events the server should send.
    pub items_handling: ItemsHandling,

    /// Ask for the slot's game-specific data in `Connected`.
    pub slot_data: bool,

    /// How long one connection attempt may take to open.
    ///
    /// Default: 10 seconds.
    pub connect_timeout: Duration,

    /// How long to wait for any correlated reply.
    ///
    /// Default: 10 seconds.
    pub reply_timeout: Duration,

    /// Fetch the data package of every room game before authenticating.
    pub fetch_data_package: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            protocol: ProtocolPreference::Auto,
            password: None,
            uuid: None,
            tags: Vec::new(),
            version: DEFAULT_VERSION,
            items_handling: ItemsHandling::ALL,
            slot_data: true,
            connect_timeout: Duration::from_secs(10),
            reply_timeout: Duration::from_secs(10),
            fetch_data_package: false,
        }
    }
}

impl ClientOptions {
    #[must_use]
    pub fn with_protocol(mut self, protocol: ProtocolPreference) -> Self {
        self.protocol = protocol;
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: NetworkVersion) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_items_handling(mut self, items_handling: ItemsHandling) -> Self {
        self.items_handling = items_handling;
        self
    }

    #[must_use]
    pub fn with_slot_data(mut self, slot_data: bool) -> Self {
        self.slot_data = slot_data;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_data_package(mut self, fetch: bool) -> Self {
        self.fetch_data_package = fetch;
        self
    }
}
