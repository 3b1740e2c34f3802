//! Typed request URL carrying the dispatch parameters.
//!
//! Adaptive dispatch and activate filtering both read extension names from
//! the parameters of a [`RequestUrl`]. The type is deliberately small: a
//! scheme, an authority, a path and an ordered parameter map.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExtensionError, Result};

/// A request URL in the form `scheme://host:port/path?key=value&...`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUrl {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
    params: BTreeMap<String, String>,
}

impl RequestUrl {
    /// Create a URL with just a scheme.
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            ..Self::default()
        }
    }

    /// Set the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the path (without the leading slash).
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Add a query parameter, replacing any previous value for the key.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Scheme component.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host component.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port component, if present.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Path component.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Look up a query parameter.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// All query parameters in key order.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Insert a query parameter on an existing URL.
    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }
}

impl FromStr for RequestUrl {
    type Err = ExtensionError;

    fn from_str(input: &str) -> Result<Self> {
        let invalid = |reason: &str| ExtensionError::InvalidUrl {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| invalid("missing `://` separator"))?;
        if scheme.is_empty() {
            return Err(invalid("empty scheme"));
        }

        let (rest, query) = match rest.split_once('?') {
            Some((r, q)) => (r, Some(q)),
            None => (rest, None),
        };

        let (authority, path) = match rest.split_once('/') {
            Some((a, p)) => (a, p),
            None => (rest, ""),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => {
                let port: u16 = p.parse().map_err(|_| invalid("port is not a number"))?;
                (h.to_string(), Some(port))
            }
            None => (authority.to_string(), None),
        };

        let mut params = BTreeMap::new();
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                match pair.split_once('=') {
                    Some((k, v)) => params.insert(k.to_string(), v.to_string()),
                    None => params.insert(pair.to_string(), String::new()),
                };
            }
        }

        Ok(Self {
            scheme: scheme.to_string(),
            host,
            port,
            path: path.to_string(),
            params,
        })
    }
}

impl fmt::Display for RequestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "/{}", self.path)?;
        let mut sep = '?';
        for (k, v) in &self.params {
            write!(f, "{}{}={}", sep, k, v)?;
            sep = '&';
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_url() {
        let url: RequestUrl = "relay://10.0.0.7:20880/demo.Echo?codec=json&serialization="
            .parse()
            .unwrap();
        assert_eq!(url.scheme(), "relay");
        assert_eq!(url.host(), "10.0.0.7");
        assert_eq!(url.port(), Some(20880));
        assert_eq!(url.path(), "demo.Echo");
        assert_eq!(url.parameter("codec"), Some("json"));
        assert_eq!(url.parameter("serialization"), Some(""));
        assert_eq!(url.parameter("absent"), None);
    }

    #[test]
    fn test_parse_bare_flag_parameter() {
        let url: RequestUrl = "relay://localhost/svc?cache".parse().unwrap();
        assert_eq!(url.parameter("cache"), Some(""));
    }

    #[test]
    fn test_parse_rejects_missing_scheme() {
        assert!("localhost:20880/svc".parse::<RequestUrl>().is_err());
        assert!("relay://host:notaport/svc".parse::<RequestUrl>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let url = RequestUrl::new("relay")
            .with_host("localhost")
            .with_port(7070)
            .with_path("svc")
            .with_param("transport", "tcp");
        let reparsed: RequestUrl = url.to_string().parse().unwrap();
        assert_eq!(url, reparsed);
    }
}
