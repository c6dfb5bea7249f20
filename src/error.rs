//! Errors surfaced at the request boundary
//!
//! Clients only ever see a status code and a generic reason; the detail
//! stays in the logs.

use crate::gateway::context::LifecycleState;
use crate::transfer::TransferError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::{error, warn};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid file route {0:?}")]
    Routing(String),
    #[error("not authorized")]
    AuthorizationDenied,
    #[error("object not found")]
    NotFound,
    #[error("body chunk received on a request that is not authorized")]
    ChunkRejected,
    #[error("request body failed: {0}")]
    Payload(String),
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: u64 },
    #[error("staging failed: {0}")]
    Staging(#[source] io::Error),
    #[error("backend failure: {0}")]
    Backend(#[from] TransferError),
    #[error("{event} is not valid in state {from:?}")]
    Lifecycle {
        from: LifecycleState,
        event: &'static str,
    },
}

impl GatewayError {
    /// The only text a client gets to see
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayError::Routing(_) => "Forbidden",
            GatewayError::AuthorizationDenied => "Not authorized for this prefix",
            GatewayError::NotFound => "Not Found",
            GatewayError::Payload(_) => "Bad Request",
            GatewayError::PayloadTooLarge { .. } => "Payload Too Large",
            GatewayError::ChunkRejected
            | GatewayError::Staging(_)
            | GatewayError::Backend(_)
            | GatewayError::Lifecycle { .. } => "Internal Server Error",
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Routing(_) | GatewayError::AuthorizationDenied => StatusCode::FORBIDDEN,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Payload(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::ChunkRejected
            | GatewayError::Staging(_)
            | GatewayError::Backend(_)
            | GatewayError::Lifecycle { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        HttpResponse::build(status)
            .content_type("text/plain; charset=utf-8")
            .body(self.reason())
    }
}
