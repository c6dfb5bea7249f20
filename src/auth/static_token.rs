//! Static shared-secret authorization for test and dev setups

use crate::auth::{Authorizer, Verb};
use async_trait::async_trait;
use log::debug;

/// Accepts exactly one token on exactly one prefix
pub struct StaticAuthorizer {
    token: String,
    allowed_prefix: String,
}

impl StaticAuthorizer {
    pub fn new(token: &str, allowed_prefix: &str) -> Self {
        Self {
            token: token.to_string(),
            allowed_prefix: allowed_prefix.to_string(),
        }
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn authorize(&self, credential: Option<&str>, prefix: &str, path: &str, verb: Verb) -> bool {
        let granted = credential == Some(self.token.as_str()) && prefix == self.allowed_prefix;
        debug!("Static auth {} {}/{}: {}", verb, prefix, path, granted);
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_authorizer() {
        let auth = StaticAuthorizer::new("Token MAGICFARYDUST", "test");
        assert!(auth.authorize(Some("Token MAGICFARYDUST"), "test", "doc1", Verb::Get).await);
        assert!(!auth.authorize(Some("Token MAGICFARYDUST"), "other", "doc1", Verb::Get).await);
        assert!(!auth.authorize(Some("Token WRONG"), "test", "doc1", Verb::Post).await);
        assert!(!auth.authorize(None, "test", "doc1", Verb::Delete).await);
        assert!(!auth.authorize(Some(""), "test", "doc1", Verb::Delete).await);
    }
}
