//! Usage reporting
//!
//! Every completed operation produces a [`UsageEvent`] for accounting.
//! Reporting never affects the response: remote delivery happens on a
//! spawned task and failures are only logged.

use crate::config::{AppConfig, UsageMode};
use crate::auth::remote::API_SECRET_HEADER;
use crate::transfer::{to_signed, Receipt};
use chrono::{DateTime, Utc};
use log::{info, warn};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Quota actions. Stores and deletes both change the stored volume, so a
/// delete is reported as a `store` with a negative size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageAction {
    Store,
    Get,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageEvent {
    pub prefix: String,
    pub file_path: String,
    pub action: UsageAction,
    /// Change in stored bytes for `store`, bytes served for `get`
    pub size: i64,
    #[serde(skip)]
    pub at: DateTime<Utc>,
}

impl UsageEvent {
    pub fn new(prefix: &str, file_path: &str, action: UsageAction, size: i64) -> Self {
        Self {
            prefix: prefix.to_string(),
            file_path: file_path.to_string(),
            action,
            size,
            at: Utc::now(),
        }
    }

    /// A store that replaced `receipt.previous_size` bytes
    pub fn stored(prefix: &str, file_path: &str, receipt: &Receipt) -> Self {
        Self::new(prefix, file_path, UsageAction::Store, receipt.size_delta())
    }

    pub fn served(prefix: &str, file_path: &str, size: u64) -> Self {
        Self::new(prefix, file_path, UsageAction::Get, to_signed(size))
    }

    /// A delete that freed `freed` bytes
    pub fn deleted(prefix: &str, file_path: &str, freed: u64) -> Self {
        Self::new(prefix, file_path, UsageAction::Store, -to_signed(freed))
    }
}

pub trait UsageReporter: Send + Sync {
    fn report(&self, credential: Option<&str>, event: UsageEvent);
}

/// Writes events to the log
pub struct LogReporter;

impl UsageReporter for LogReporter {
    fn report(&self, _credential: Option<&str>, event: UsageEvent) {
        info!(
            "usage {:?} {}/{} size={} at={}",
            event.action,
            event.prefix,
            event.file_path,
            event.size,
            event.at.to_rfc3339()
        );
    }
}

/// Posts events to `{accounting_server}/api/v0/quota`
pub struct RemoteReporter {
    client: Client,
    quota_url: String,
    api_secret: Option<String>,
}

impl RemoteReporter {
    pub fn new(accounting_server: &str, api_secret: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            quota_url: format!("{}/api/v0/quota", accounting_server.trim_end_matches('/')),
            api_secret,
        })
    }
}

impl UsageReporter for RemoteReporter {
    fn report(&self, credential: Option<&str>, event: UsageEvent) {
        let mut request = self
            .client
            .post(&self.quota_url)
            .header(AUTHORIZATION, credential.unwrap_or_default())
            .json(&event);
        if let Some(secret) = &self.api_secret {
            request = request.header(API_SECRET_HEADER, secret.as_str());
        }
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!(
                    "Accounting server rejected usage for {}/{}: {}",
                    event.prefix, event.file_path, response.status()
                ),
                Err(e) => warn!("Failed to report usage for {}/{}: {}", event.prefix, event.file_path, e),
            }
        });
    }
}

/// Keeps events in memory, for tests
#[derive(Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<(Option<String>, UsageEvent)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UsageEvent> {
        self.entries().into_iter().map(|(_, event)| event).collect()
    }

    /// Events paired with the credential they were reported with
    pub fn entries(&self) -> Vec<(Option<String>, UsageEvent)> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl UsageReporter for MemoryReporter {
    fn report(&self, credential: Option<&str>, event: UsageEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((credential.map(str::to_string), event));
    }
}

pub fn reporter_from_config(config: &AppConfig) -> Result<Arc<dyn UsageReporter>, reqwest::Error> {
    match config.usage.mode {
        UsageMode::Log => Ok(Arc::new(LogReporter)),
        UsageMode::Remote => {
            info!("Reporting usage to {}", config.auth.accounting_server);
            Ok(Arc::new(RemoteReporter::new(
                &config.auth.accounting_server,
                config.auth.api_secret.clone(),
                Duration::from_millis(config.auth.timeout_ms),
            )?))
        }
    }
}
