//! `/api/v0/files/{prefix}/{path}` routing
//!
//! The whole tail is captured and validated here rather than by the router
//! pattern, so that malformed keys get a 403 instead of falling through.

use crate::error::GatewayError;
use actix_web::HttpRequest;

pub const FILES_ROOT: &str = "/api/v0/files";
pub const FILES_ROUTE: &str = "/api/v0/files/{tail:.*}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRoute {
    pub prefix: String,
    pub path: String,
}

/// `[A-Za-z0-9_-]+`
pub fn is_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

impl FileRoute {
    /// Parse `{prefix}/{path}`; anything else is a routing error
    pub fn parse(tail: &str) -> Result<Self, GatewayError> {
        let mut segments = tail.split('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(prefix), Some(path), None) if is_identifier(prefix) && is_identifier(path) => {
                Ok(Self {
                    prefix: prefix.to_string(),
                    path: path.to_string(),
                })
            }
            _ => Err(GatewayError::Routing(tail.to_string())),
        }
    }

    pub fn from_request(req: &HttpRequest) -> Result<Self, GatewayError> {
        let tail = req.match_info().get("tail").unwrap_or_default();
        Self::parse(tail)
    }
}
