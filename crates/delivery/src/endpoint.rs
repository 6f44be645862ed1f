//! Collector endpoint resolution

use crate::error::{DeliveryError, Result};
use url::Url;

/// A collector URL broken into the parts needed to connect and build a request
///
/// `port` is only `None` for schemes without a known default port and no
/// explicit port; such endpoints fail at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEndpoint {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: Option<String>,
    pub userinfo: Option<String>,
}

/// Default port for a URL scheme
pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Parse a collector URL
///
/// Missing ports fall back to the scheme default and a missing path becomes
/// `/`. No I/O is performed; reachability is checked at delivery time.
pub fn resolve(raw: &str) -> Result<ParsedEndpoint> {
    let url = Url::parse(raw.trim()).map_err(|e| DeliveryError::MalformedUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => {
            return Err(DeliveryError::MalformedUrl {
                url: raw.to_string(),
                reason: "missing host".to_string(),
            })
        }
    };

    let scheme = url.scheme().to_string();
    let port = url.port().or_else(|| default_port(&scheme));

    let path = match url.path() {
        "" => "/".to_string(),
        path => path.to_string(),
    };

    let userinfo = match (url.username(), url.password()) {
        ("", None) => None,
        (user, Some(password)) => Some(format!("{}:{}", user, password)),
        (user, None) => Some(user.to_string()),
    };

    Ok(ParsedEndpoint {
        scheme,
        host,
        port,
        path,
        query: url.query().map(str::to_string),
        userinfo,
    })
}

impl ParsedEndpoint {
    /// Whether the connection must be wrapped in TLS
    pub fn is_tls(&self) -> bool {
        self.scheme == "https"
    }

    /// Request target for the request line: `path[?query]`
    pub fn request_target(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// Value of the `Host` header (port only when it is not the scheme default)
    pub fn host_header(&self) -> String {
        match self.port {
            Some(port) if Some(port) != default_port(&self.scheme) => {
                format!("{}:{}", self.host, port)
            }
            _ => self.host.clone(),
        }
    }

    /// Host to dial and to present as TLS server name (IPv6 brackets removed)
    pub fn connect_host(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
    }

    /// `host:port` label used in log lines
    pub fn target(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => format!("{}:?", self.host),
        }
    }
}
