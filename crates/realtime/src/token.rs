//! Bearer token lookup for the socket URL.

use std::path::PathBuf;

use tracing::debug;

/// Supplies the access token, read fresh on every connection attempt.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        let token = self.0.trim();
        (!token.is_empty()).then(|| token.to_string())
    }
}

/// A token kept in a file, re-read on every call so a new login is picked up.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenProvider for TokenFile {
    fn access_token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(error) => {
                debug!(path = %self.path.display(), %error, "token file unavailable");
                None
            }
        }
    }
}

/// Signed out.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToken;

impl TokenProvider for NoToken {
    fn access_token(&self) -> Option<String> {
        None
    }
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn access_token(&self) -> Option<String> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn static_token_ignores_blank_values() {
        assert_eq!(StaticToken::new(" abc ").access_token().as_deref(), Some("abc"));
        assert!(StaticToken::new("   ").access_token().is_none());
    }

    #[test]
    fn token_file_is_reread_on_each_call() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token");
        let provider = TokenFile::new(&path);

        assert!(provider.access_token().is_none());

        std::fs::write(&path, "first\n").unwrap();
        assert_eq!(provider.access_token().as_deref(), Some("first"));

        std::fs::write(&path, "second").unwrap();
        assert_eq!(provider.access_token().as_deref(), Some("second"));
    }

    #[test]
    fn closures_are_providers() {
        let provider = || Some("from-closure".to_string());
        assert_eq!(provider.access_token().as_deref(), Some("from-closure"));
        assert!(NoToken.access_token().is_none());
    }
}
