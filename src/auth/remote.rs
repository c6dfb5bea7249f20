//! Authorization against the accounting server
//!
//! `<verb> {accounting_server}/api/v0/auth/{prefix}/{path}` with the
//! caller's `Authorization` header forwarded. Only a 204 grants access.

use crate::auth::{AuthError, Authorizer, Verb};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, StatusCode, Url};
use std::time::Duration;

pub const API_SECRET_HEADER: &str = "APISECRET";

pub struct RemoteAuthorizer {
    client: Client,
    base_url: String,
    api_secret: Option<String>,
}

impl RemoteAuthorizer {
    /// `timeout` bounds the whole call, connect included
    pub fn new(base_url: &str, api_secret: Option<String>, timeout: Duration) -> Result<Self, AuthError> {
        Url::parse(base_url).map_err(|_| AuthError::InvalidUrl(base_url.to_string()))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_secret,
        })
    }

    pub fn auth_url(&self, prefix: &str, path: &str) -> String {
        format!("{}/api/v0/auth/{}/{}", self.base_url, prefix, path)
    }

    async fn check(&self, credential: Option<&str>, prefix: &str, path: &str, verb: Verb) -> Result<StatusCode, AuthError> {
        let method = match verb {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Delete => Method::DELETE,
        };
        let mut request = self
            .client
            .request(method, self.auth_url(prefix, path))
            .header(AUTHORIZATION, credential.unwrap_or_default());
        if let Some(secret) = &self.api_secret {
            request = request.header(API_SECRET_HEADER, secret.as_str());
        }
        if verb == Verb::Post {
            request = request.body(Vec::<u8>::new());
        }
        let response = request.send().await?;
        Ok(response.status())
    }
}

#[async_trait]
impl Authorizer for RemoteAuthorizer {
    async fn authorize(&self, credential: Option<&str>, prefix: &str, path: &str, verb: Verb) -> bool {
        match self.check(credential, prefix, path, verb).await {
            Ok(StatusCode::NO_CONTENT) => true,
            Ok(status) => {
                debug!("Accounting server denied {} {}/{} with {}", verb, prefix, path, status);
                false
            }
            Err(e) => {
                warn!("Authorization call for {}/{} failed, denying: {}", prefix, path, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn authorizer(server: &MockServer, timeout: Duration) -> RemoteAuthorizer {
        RemoteAuthorizer::new(&server.uri(), Some("secret".to_string()), timeout).unwrap()
    }

    #[tokio::test]
    async fn test_remote_authorizer_grants_on_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/auth/test/doc1"))
            .and(header("Authorization", "Token MAGICFARYDUST"))
            .and(header("APISECRET", "secret"))
            .and(body_bytes(Vec::<u8>::new()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let auth = authorizer(&server, Duration::from_secs(2));
        assert!(auth.authorize(Some("Token MAGICFARYDUST"), "test", "doc1", Verb::Post).await);
    }

    #[tokio::test]
    async fn test_remote_authorizer_uses_request_verb() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v0/auth/test/doc1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v0/auth/test/doc1"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let auth = authorizer(&server, Duration::from_secs(2));
        assert!(auth.authorize(Some("Token abc"), "test", "doc1", Verb::Get).await);
        assert!(!auth.authorize(Some("Token abc"), "test", "doc1", Verb::Delete).await);
    }

    #[tokio::test]
    async fn test_remote_authorizer_only_accepts_204() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let auth = authorizer(&server, Duration::from_secs(2));
        assert!(!auth.authorize(Some("Token abc"), "test", "doc1", Verb::Get).await);
    }

    #[tokio::test]
    async fn test_remote_authorizer_denies_on_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let auth = authorizer(&server, Duration::from_millis(50));
        assert!(!auth.authorize(Some("Token abc"), "test", "doc1", Verb::Get).await);
    }

    #[tokio::test]
    async fn test_remote_authorizer_denies_when_unreachable() {
        let auth = RemoteAuthorizer::new("http://127.0.0.1:1", None, Duration::from_millis(200)).unwrap();
        assert!(!auth.authorize(Some("Token abc"), "test", "doc1", Verb::Get).await);
    }

    #[test]
    fn test_auth_url_trims_trailing_slash() {
        let auth = RemoteAuthorizer::new("http://localhost:8000/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(auth.auth_url("test", "doc1"), "http://localhost:8000/api/v0/auth/test/doc1");
    }
}
