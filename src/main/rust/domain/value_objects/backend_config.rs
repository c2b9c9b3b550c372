use crate::domain::errors::{DomainError, Result};

/// Location of the backend REST/WebSocket surface
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    base_url: String,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self::validate_base_url(&base_url)?;
        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute HTTP URL for an API path such as `/webrtc/offer`
    pub fn http_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Absolute WebSocket URL for an API path, using ws/wss to match the base scheme
    pub fn ws_url(&self, path: &str) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}{}", ws_base, path)
    }

    /// Resolve a URL returned by the backend. Absolute URLs pass through;
    /// root-relative ones are joined to the base URL's origin.
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        let origin = self
            .base_url
            .split_once("://")
            .map(|(scheme, rest)| {
                let host = rest.split('/').next().unwrap_or(rest);
                format!("{}://{}", scheme, host)
            })
            .unwrap_or_else(|| self.base_url.clone());
        if url.starts_with('/') {
            format!("{}{}", origin, url)
        } else {
            format!("{}/{}", origin, url)
        }
    }

    fn validate_base_url(url: &str) -> Result<()> {
        let has_scheme = url.starts_with("http://") || url.starts_with("https://");
        let has_host = url
            .split_once("://")
            .map(|(_, rest)| !rest.is_empty())
            .unwrap_or(false);

        if !has_scheme || !has_host {
            return Err(DomainError::InvalidBackendUrl(url.to_string()));
        }
        Ok(())
    }
}
