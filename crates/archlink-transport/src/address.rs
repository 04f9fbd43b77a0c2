//! Server addresses and secure/insecure protocol selection.
//!
//! Users type addresses the way they see them in a lobby: `example.net`,
//! `example.net:40000`, `wss://example.net:40000` or `[::1]:38281`. This
//! module turns that into a [`ServerAddress`] and, together with a
//! [`ProtocolPreference`], into the ordered list of URLs the connection
//! manager should try.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::AddressError;

/// Port used when the address does not name one.
pub const DEFAULT_PORT: u16 = 38281;

/// The two variants of the same framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// TLS-wrapped WebSocket (`wss://`).
    Secure,
    /// Plain WebSocket (`ws://`).
    Insecure,
}

impl Scheme {
    /// The URL prefix for this scheme, without `://`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Secure => "wss",
            Self::Insecure => "ws",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which scheme(s) the connection manager may use.
///
/// Only [`ProtocolPreference::Auto`] enables fallback: the secure variant
/// is tried first and, if it fails to *open*, the insecure variant is tried
/// once. An explicit preference is tried alone.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolPreference {
    /// Secure first, then insecure if the secure channel cannot be opened.
    /// A scheme written into the address itself is honoured instead.
    #[default]
    Auto,
    /// `wss://` only.
    Secure,
    /// `ws://` only.
    Insecure,
}

/// A parsed `[scheme://]host[:port]` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    /// Scheme written in the address, if any.
    pub scheme: Option<Scheme>,
    /// Host name or IP literal (IPv6 without brackets).
    pub host: String,
    /// Port, [`DEFAULT_PORT`] when omitted.
    pub port: u16,
}

impl ServerAddress {
    /// Builds the full URL for the given scheme.
    pub fn url(&self, scheme: Scheme) -> String {
        if self.host.contains(':') {
            format!("{scheme}://[{}]:{}", self.host, self.port)
        } else {
            format!("{scheme}://{}:{}", self.host, self.port)
        }
    }

    /// Returns the schemes to attempt, in order.
    pub fn schemes(&self, preference: ProtocolPreference) -> Vec<Scheme> {
        match (preference, self.scheme) {
            (ProtocolPreference::Secure, _) => vec![Scheme::Secure],
            (ProtocolPreference::Insecure, _) => vec![Scheme::Insecure],
            (ProtocolPreference::Auto, Some(scheme)) => vec![scheme],
            (ProtocolPreference::Auto, None) => {
                vec![Scheme::Secure, Scheme::Insecure]
            }
        }
    }

    /// Returns the URLs to attempt, in order.
    pub fn candidates(&self, preference: ProtocolPreference) -> Vec<String> {
        self.schemes(preference)
            .into_iter()
            .map(|scheme| self.url(scheme))
            .collect()
    }
}

/// Non-special scheme the authority is parsed under, so an explicit `:80`
/// or `:443` is not elided as a `ws`/`wss` default port.
const AUTHORITY_SCHEME: &str = "archlink";

impl FromStr for ServerAddress {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        let (scheme, rest) = match trimmed.split_once("://") {
            Some((prefix, rest)) => {
                let scheme = match prefix.to_ascii_lowercase().as_str() {
                    "wss" => Scheme::Secure,
                    "ws" => Scheme::Insecure,
                    _ => {
                        return Err(AddressError::UnsupportedScheme(
                            prefix.to_string(),
                        ));
                    }
                };
                (Some(scheme), rest)
            }
            None => (None, trimmed),
        };

        let invalid_host = || AddressError::InvalidHost(input.to_string());
        let parsed = Url::parse(&format!("{AUTHORITY_SCHEME}://{rest}"))
            .map_err(|e| match e {
                url::ParseError::InvalidPort => {
                    AddressError::InvalidPort(port_text(rest))
                }
                _ => invalid_host(),
            })?;

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(invalid_host());
        }

        // Anything after the authority (a path, a trailing slash) is dropped.
        let host = match parsed.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => {
                domain.to_string()
            }
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(invalid_host()),
        };

        let port = match parsed.port() {
            None => DEFAULT_PORT,
            Some(0) => return Err(AddressError::InvalidPort(port_text(rest))),
            Some(port) => port,
        };

        Ok(Self { scheme, host, port })
    }
}

/// The text after the last `:` of the authority, for error messages.
fn port_text(rest: &str) -> String {
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    match authority.rsplit_once(':') {
        Some((_, port)) => port.to_string(),
        None => authority.to_string(),
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Some(scheme) => f.write_str(&self.url(scheme)),
            None if self.host.contains(':') => {
                write!(f, "[{}]:{}", self.host, self.port)
            }
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> ServerAddress {
        s.parse().expect("address should parse")
    }

    #[test]
    fn test_parse_bare_host_uses_default_port() {
        let addr = parse("archipelago.example");
        assert_eq!(addr.host, "archipelago.example");
        assert_eq!(addr.port, DEFAULT_PORT);
        assert_eq!(addr.scheme, None);
    }

    #[test]
    fn test_parse_host_and_port() {
        let addr = parse("localhost:40123");
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, 40123);
    }

    #[test]
    fn test_parse_scheme_is_recorded() {
        assert_eq!(parse("wss://a.example").scheme, Some(Scheme::Secure));
        assert_eq!(parse("WS://a.example:1").scheme, Some(Scheme::Insecure));
    }

    #[test]
    fn test_parse_ipv6_literal() {
        let addr = parse("[::1]:5000");
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.port, 5000);
        assert_eq!(addr.url(Scheme::Insecure), "ws://[::1]:5000");
    }

    #[test]
    fn test_parse_trailing_path_is_ignored() {
        assert_eq!(parse("ws://host:1234/").port, 1234);
    }

    #[test]
    fn test_parse_keeps_explicit_web_ports() {
        assert_eq!(parse("ws://host:80").port, 80);
        assert_eq!(parse("wss://host:443").port, 443);
        assert_eq!(parse("host:443").port, 443);
    }

    #[test]
    fn test_parse_ipv4_literal_and_query() {
        let addr = parse("127.0.0.1:9?room=1");
        assert_eq!(addr.host, "127.0.0.1");
        assert_eq!(addr.port, 9);
    }

    #[test]
    fn test_parse_rejects_credentials_and_bad_ports() {
        assert!(matches!(
            "user:pw@host".parse::<ServerAddress>(),
            Err(AddressError::InvalidHost(_))
        ));
        assert_eq!(
            "host:70000".parse::<ServerAddress>(),
            Err(AddressError::InvalidPort("70000".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!("".parse::<ServerAddress>(), Err(AddressError::Empty));
        assert!(matches!(
            "http://host".parse::<ServerAddress>(),
            Err(AddressError::UnsupportedScheme(s)) if s == "http"
        ));
        assert!(matches!(
            "host:notaport".parse::<ServerAddress>(),
            Err(AddressError::InvalidPort(_))
        ));
        assert!(matches!(
            "host:0".parse::<ServerAddress>(),
            Err(AddressError::InvalidPort(_))
        ));
        assert!(matches!(
            ":38281".parse::<ServerAddress>(),
            Err(AddressError::InvalidHost(_))
        ));
    }

    #[test]
    fn test_candidates_auto_tries_secure_then_insecure() {
        let addr = parse("host");
        assert_eq!(
            addr.candidates(ProtocolPreference::Auto),
            vec!["wss://host:38281", "ws://host:38281"]
        );
    }

    #[test]
    fn test_candidates_explicit_preference_disables_fallback() {
        let addr = parse("host");
        assert_eq!(
            addr.candidates(ProtocolPreference::Secure),
            vec!["wss://host:38281"]
        );
        assert_eq!(
            addr.candidates(ProtocolPreference::Insecure),
            vec!["ws://host:38281"]
        );
    }

    #[test]
    fn test_candidates_auto_honours_scheme_in_address() {
        let addr = parse("ws://host:1");
        assert_eq!(addr.candidates(ProtocolPreference::Auto), vec!["ws://host:1"]);
    }

    #[test]
    fn test_display_round_trips_user_form() {
        assert_eq!(parse("host").to_string(), "host:38281");
        assert_eq!(parse("wss://host:9").to_string(), "wss://host:9");
    }
}
