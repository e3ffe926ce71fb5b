//! Proxy configuration value object.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Validated HTTP/HTTPS proxy pair for capture children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub http: Option<String>,
    pub https: Option<String>,
}

impl ProxyConfig {
    /// Build from raw setting strings, rejecting URLs that do not start
    /// with `http://` or `https://`.
    pub fn from_settings(http: &str, https: &str) -> Result<Self> {
        Ok(Self {
            http: Self::validate(http, "http")?,
            https: Self::validate(https, "https")?,
        })
    }

    fn validate(raw: &str, which: &str) -> Result<Option<String>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        if !raw.starts_with("http://") && !raw.starts_with("https://") {
            return Err(Error::config(format!(
                "{which} proxy URL must start with 'http://' or 'https://': {raw}"
            )));
        }
        Url::parse(raw)
            .map_err(|e| Error::config(format!("invalid {which} proxy URL {raw}: {e}")))?;
        Ok(Some(raw.to_string()))
    }

    /// Whether any proxy is configured.
    pub fn is_configured(&self) -> bool {
        self.http.is_some() || self.https.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_unconfigured() {
        let proxy = ProxyConfig::from_settings("", "  ").unwrap();
        assert!(!proxy.is_configured());
    }

    #[test]
    fn test_valid_urls() {
        let proxy =
            ProxyConfig::from_settings("http://proxy:8080", "https://proxy:8443").unwrap();
        assert_eq!(proxy.http.as_deref(), Some("http://proxy:8080"));
        assert_eq!(proxy.https.as_deref(), Some("https://proxy:8443"));
    }

    #[test]
    fn test_missing_scheme_rejected() {
        assert!(ProxyConfig::from_settings("proxy:8080", "").is_err());
        assert!(ProxyConfig::from_settings("", "socks5://proxy").is_err());
    }
}
