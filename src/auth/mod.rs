//! Authorization gate
//!
//! Every request is checked against an [`Authorizer`] before any body byte
//! is persisted or any backend call is made. Authorizers answer with a plain
//! boolean: errors, timeouts and unexpected answers are denials.

pub mod remote;
pub mod static_token;

use crate::config::{AuthConfig, AuthMode};
use actix_web::http::Method;
use async_trait::async_trait;
use log::{info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use remote::RemoteAuthorizer;
pub use static_token::StaticAuthorizer;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid accounting server url {0}")]
    InvalidUrl(String),
    #[error("accounting server request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// HTTP verbs the gateway serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Delete,
}

impl Verb {
    pub fn from_method(method: &Method) -> Option<Self> {
        if *method == Method::GET {
            Some(Verb::Get)
        } else if *method == Method::POST {
            Some(Verb::Post)
        } else if *method == Method::DELETE {
            Some(Verb::Delete)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Delete => "DELETE",
        }
    }

    /// Verbs that carry a body to stage
    pub fn is_write(&self) -> bool {
        matches!(self, Verb::Post)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// `credential` is the raw `Authorization` header, `None` when absent.
    async fn authorize(&self, credential: Option<&str>, prefix: &str, path: &str, verb: Verb) -> bool;
}

/// Build the configured authorizer. `None` means authorization is disabled.
pub fn authorizer_from_config(config: &AuthConfig) -> Result<Option<Arc<dyn Authorizer>>, AuthError> {
    match config.mode {
        AuthMode::Remote => {
            info!("Authorizing against accounting server {}", config.accounting_server);
            let authorizer = RemoteAuthorizer::new(
                &config.accounting_server,
                config.api_secret.clone(),
                Duration::from_millis(config.timeout_ms),
            )?;
            Ok(Some(Arc::new(authorizer)))
        }
        AuthMode::Static => {
            warn!("Using static token authorization, not for production use");
            Ok(Some(Arc::new(StaticAuthorizer::new(
                &config.magic_token,
                &config.allowed_prefix,
            ))))
        }
        AuthMode::Disabled => {
            warn!("Authorization is disabled");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_from_method() {
        assert_eq!(Verb::from_method(&Method::GET), Some(Verb::Get));
        assert_eq!(Verb::from_method(&Method::POST), Some(Verb::Post));
        assert_eq!(Verb::from_method(&Method::DELETE), Some(Verb::Delete));
        assert_eq!(Verb::from_method(&Method::PUT), None);
        assert!(Verb::Post.is_write());
        assert!(!Verb::Get.is_write() && !Verb::Delete.is_write());
        assert_eq!(Verb::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_authorizer_from_config() {
        let mut config = AuthConfig::default();
        assert!(authorizer_from_config(&config).unwrap().is_some());

        config.mode = AuthMode::Static;
        assert!(authorizer_from_config(&config).unwrap().is_some());

        config.mode = AuthMode::Disabled;
        assert!(authorizer_from_config(&config).unwrap().is_none());

        config.mode = AuthMode::Remote;
        config.accounting_server = "not a url".to_string();
        assert!(matches!(authorizer_from_config(&config), Err(AuthError::InvalidUrl(_))));
    }
}
