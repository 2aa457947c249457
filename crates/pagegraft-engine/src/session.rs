//! Session-wide metadata kept next to the page cache.

/// Metadata about the running session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMeta {
    /// URL of the current history entry.
    pub current_url: Option<String>,
    /// Base URL prefixed by transports to relative requests.
    pub base_url: Option<String>,
    /// Latest CSRF token received with a full page.
    pub csrf_token: Option<String>,
    /// Asset fingerprints the running document was rendered against.
    pub assets: Option<Vec<String>>,
}

impl SessionMeta {
    /// Whether a page rendered against `next_assets` needs a full reload.
    ///
    /// True when the session knows its assets and the page references one
    /// the session has not loaded.
    pub fn needs_refresh(&self, next_assets: &[String]) -> bool {
        match &self.assets {
            Some(prev) => next_assets.iter().any(|asset| !prev.contains(asset)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(assets: &[&str]) -> SessionMeta {
        SessionMeta {
            assets: Some(assets.iter().map(|a| a.to_string()).collect()),
            ..SessionMeta::default()
        }
    }

    #[test]
    fn test_needs_refresh_new_asset() {
        let session = session_with(&["application-123.js"]);
        assert!(session.needs_refresh(&["application-456.js".to_string()]));
    }

    #[test]
    fn test_needs_refresh_same_assets() {
        let session = session_with(&["application-123.js", "site-1.css"]);
        assert!(!session.needs_refresh(&["site-1.css".to_string()]));
        assert!(!session.needs_refresh(&[]));
    }

    #[test]
    fn test_needs_refresh_unknown_session_assets() {
        assert!(!SessionMeta::default().needs_refresh(&["application-456.js".to_string()]));
    }
}
