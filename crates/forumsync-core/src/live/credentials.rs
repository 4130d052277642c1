//! Session credentials and endpoint construction

use std::fmt;
use std::sync::Arc;

use url::Url;

use super::message::UserId;
use crate::error::{SyncError, SyncResult};

type TokenSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Identity of the local user plus a source for the auth token
///
/// The token source is asked for a fresh token on every connect attempt,
/// including automatic reconnects.
#[derive(Clone)]
pub struct Credentials {
    pub user_id: UserId,
    pub username: String,
    token: TokenSource,
}

impl Credentials {
    /// Credentials with a fixed token
    pub fn new(
        user_id: impl Into<UserId>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let token = token.into();
        Self::with_token_source(user_id, username, move || Some(token.clone()))
    }

    /// Credentials that fetch their token lazily (e.g. from a session store)
    pub fn with_token_source<F>(
        user_id: impl Into<UserId>,
        username: impl Into<String>,
        source: F,
    ) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            token: Arc::new(source),
        }
    }

    /// Ask the source for a token; empty tokens count as none
    pub fn fresh_token(&self) -> Option<String> {
        (self.token)().filter(|t| !t.is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Build the authenticated socket URL
///
/// The token replaces any `token` query parameter already on `base`; other
/// parameters are kept.
pub fn build_endpoint(base: &str, token: &str) -> SyncResult<Url> {
    let mut url = Url::parse(base)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(SyncError::UnsupportedScheme(other.to_string())),
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "token")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("token", token);

    Ok(url)
}

/// URL with the token value masked, for logging
pub fn redacted(url: &Url) -> String {
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "token" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    if !pairs.is_empty() {
        masked.query_pairs_mut().clear().extend_pairs(pairs);
    }
    masked.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_endpoint_appends_token() {
        let url = build_endpoint("ws://localhost:8080/ws", "abc").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8080/ws?token=abc");
    }

    #[test]
    fn test_endpoint_replaces_existing_token() {
        let url = build_endpoint("wss://forum.example/ws?room=1&token=old", "new").unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("room".to_string(), "1".to_string()),
                ("token".to_string(), "new".to_string())
            ]
        );
    }

    #[test]
    fn test_endpoint_encodes_token() {
        let url = build_endpoint("ws://localhost/ws", "a b&c").unwrap();
        assert_eq!(url.query(), Some("token=a+b%26c"));
    }

    #[test]
    fn test_endpoint_rejects_http() {
        let err = build_endpoint("http://localhost/ws", "t").unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedScheme(s) if s == "http"));

        let err = build_endpoint("not a url", "t").unwrap_err();
        assert!(matches!(err, SyncError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_token_source_called_per_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let creds = Credentials::with_token_source("1", "ana", move || {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            Some(format!("token-{}", n))
        });

        assert_eq!(creds.fresh_token().as_deref(), Some("token-1"));
        assert_eq!(creds.fresh_token().as_deref(), Some("token-2"));
    }

    #[test]
    fn test_empty_token_is_none() {
        let creds = Credentials::new("1", "ana", "");
        assert_eq!(creds.fresh_token(), None);
    }

    #[test]
    fn test_redacted_hides_token() {
        let url = build_endpoint("ws://localhost/ws?room=2", "secret").unwrap();
        let shown = redacted(&url);
        assert!(!shown.contains("secret"));
        assert!(shown.contains("room=2"));
        assert!(format!("{:?}", Credentials::new("1", "ana", "secret")).contains("ana"));
    }
}
