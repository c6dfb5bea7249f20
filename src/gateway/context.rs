//! Per-request lifecycle
//!
//! ```text
//! AwaitingAuth -> Authorized -> [Streaming -> BodyComplete] -> BackendCall -> Responding -> Done
//!       \                           \
//!        `-> Rejected                `-> Rejected
//! ```
//!
//! One [`RequestContext`] exists per in-flight request. It owns the upload
//! sink, so rejecting or dropping the context discards any staged bytes.

use crate::auth::Verb;
use crate::error::GatewayError;
use crate::gateway::route::FileRoute;
use crate::gateway::sink::{StagedUpload, UploadSink};
use log::debug;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    AwaitingAuth,
    Authorized,
    Streaming,
    BodyComplete,
    BackendCall,
    Responding,
    Done,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Pending,
    Granted,
    Denied,
}

pub struct RequestContext {
    route: FileRoute,
    verb: Verb,
    auth_token: Option<String>,
    authorized: AuthState,
    state: LifecycleState,
    upload: Option<UploadSink>,
}

impl RequestContext {
    pub fn new(route: FileRoute, verb: Verb, auth_token: Option<String>) -> Self {
        Self {
            route,
            verb,
            auth_token,
            authorized: AuthState::Pending,
            state: LifecycleState::AwaitingAuth,
            upload: None,
        }
    }

    pub fn route(&self) -> &FileRoute {
        &self.route
    }

    pub fn prefix(&self) -> &str {
        &self.route.prefix
    }

    pub fn path(&self) -> &str {
        &self.route.path
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn authorized(&self) -> AuthState {
        self.authorized
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Bytes staged so far
    pub fn staged_bytes(&self) -> u64 {
        self.upload.as_ref().map(UploadSink::written).unwrap_or(0)
    }

    fn transition(&mut self, expected: &[LifecycleState], next: LifecycleState, event: &'static str) -> Result<(), GatewayError> {
        if !expected.contains(&self.state) {
            return Err(GatewayError::Lifecycle { from: self.state, event });
        }
        debug!("{} {}/{}: {:?} -> {:?}", self.verb, self.route.prefix, self.route.path, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Record the authorizer's answer. Write verbs get their transient file
    /// here, before the first chunk is read.
    pub fn resolve_auth(&mut self, granted: bool, upload_dir: &Path) -> Result<(), GatewayError> {
        if !granted {
            self.transition(&[LifecycleState::AwaitingAuth], LifecycleState::Rejected, "auth denied")?;
            self.authorized = AuthState::Denied;
            return Err(GatewayError::AuthorizationDenied);
        }
        self.transition(&[LifecycleState::AwaitingAuth], LifecycleState::Authorized, "auth granted")?;
        self.authorized = AuthState::Granted;
        if self.verb.is_write() {
            let sink = UploadSink::create(upload_dir).map_err(|e| {
                self.state = LifecycleState::Rejected;
                GatewayError::Staging(e)
            })?;
            self.upload = Some(sink);
        }
        Ok(())
    }

    /// Append one body chunk to the transient file.
    pub async fn accept_chunk(&mut self, chunk: &[u8]) -> Result<(), GatewayError> {
        if self.authorized != AuthState::Granted {
            self.reject();
            return Err(GatewayError::ChunkRejected);
        }
        self.transition(
            &[LifecycleState::Authorized, LifecycleState::Streaming],
            LifecycleState::Streaming,
            "body chunk",
        )?;
        let Some(sink) = self.upload.as_mut() else {
            return Err(GatewayError::Lifecycle { from: self.state, event: "body chunk without sink" });
        };
        let appended = sink.append(chunk).await;
        if let Err(e) = appended {
            self.reject();
            return Err(GatewayError::Staging(e));
        }
        Ok(())
    }

    /// End of body: close the transient file and take it out of the context.
    pub async fn complete_body(&mut self) -> Result<StagedUpload, GatewayError> {
        self.transition(
            &[LifecycleState::Authorized, LifecycleState::Streaming],
            LifecycleState::BodyComplete,
            "body complete",
        )?;
        let Some(sink) = self.upload.take() else {
            return Err(GatewayError::Lifecycle { from: self.state, event: "body complete without sink" });
        };
        sink.finish().await.map_err(|e| {
            self.state = LifecycleState::Rejected;
            GatewayError::Staging(e)
        })
    }

    /// Writes must have completed their body; reads and deletes go straight here.
    pub fn begin_backend_call(&mut self) -> Result<(), GatewayError> {
        let from: &[LifecycleState] = if self.verb.is_write() {
            &[LifecycleState::BodyComplete]
        } else {
            &[LifecycleState::Authorized]
        };
        self.transition(from, LifecycleState::BackendCall, "backend call")
    }

    pub fn begin_response(&mut self) -> Result<(), GatewayError> {
        self.transition(&[LifecycleState::BackendCall], LifecycleState::Responding, "response")
    }

    pub fn finish(&mut self) -> Result<(), GatewayError> {
        self.transition(&[LifecycleState::Responding], LifecycleState::Done, "finish")
    }

    /// Terminal rejection; any staged bytes are discarded.
    pub fn reject(&mut self) {
        if self.upload.take().is_some() {
            debug!("Discarded upload for {}/{}", self.route.prefix, self.route.path);
        }
        self.state = LifecycleState::Rejected;
    }
}
