//! Endpoint resolution.
//!
//! The update feed lives at `{ws|wss}://{host}:{port}{path}`; the
//! credential travels as the `token` query parameter.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;

use crate::traits::TransportError;

/// Default server port.
pub const DEFAULT_PORT: u16 = 8888;

/// Default feed path.
pub const DEFAULT_PATH: &str = "/api/v1/dashboard/ws";

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

/// Where the update feed is served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Server host name or address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Use `wss` instead of `ws`.
    #[serde(default)]
    pub secure: bool,
    /// Request path.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure: false,
            path: default_path(),
        }
    }
}

impl Endpoint {
    /// Create an endpoint on `host` with the default port and path.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Set the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use `wss`.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the request path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// URL scheme.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// Check that the parts form a usable URL.
    ///
    /// IPv6 literals are accepted bare (`::1`) or bracketed (`[::1]`).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidEndpoint`] for an empty host, a host
    /// containing URL delimiters or a stray `:`, or a path that does not
    /// start with `/` or carries its own query, fragment or userinfo.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.host.is_empty() {
            return Err(TransportError::InvalidEndpoint("empty host".into()));
        }
        let delimited = self.host.contains(['/', '?', '#', '@', ' ']);
        if delimited || (self.host.contains(':') && self.ipv6_host().is_none()) {
            return Err(TransportError::InvalidEndpoint(format!(
                "invalid host {:?}",
                self.host
            )));
        }
        if !self.path.starts_with('/') {
            return Err(TransportError::InvalidEndpoint(format!(
                "path {:?} must start with '/'",
                self.path
            )));
        }
        if self.path.contains(['?', '#', '@', ' ']) {
            return Err(TransportError::InvalidEndpoint(format!(
                "path {:?} must not contain a query, fragment or userinfo",
                self.path
            )));
        }
        Ok(())
    }

    fn ipv6_host(&self) -> Option<Ipv6Addr> {
        let bare = self
            .host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host);
        bare.parse().ok()
    }

    /// URL of the feed with the credential attached.
    ///
    /// The result contains the credential and must not be logged; use the
    /// `Display` form for that.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is invalid.
    pub fn authorized_url(&self, credential: &SecretString) -> Result<String, TransportError> {
        self.validate()?;
        Ok(format!(
            "{self}?token={}",
            urlencoding::encode(credential.expose_secret())
        ))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ipv6_host() {
            Some(ip) => write!(f, "{}://[{ip}]:{}{}", self.scheme(), self.port, self.path),
            None => write!(
                f,
                "{}://{}:{}{}",
                self.scheme(),
                self.host,
                self.port,
                self.path
            ),
        }
    }
}
