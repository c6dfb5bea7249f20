//! Application State Management
//!
//! Everything a handler needs, built once at start-up and shared across
//! actix workers through `web::Data`.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use thiserror::Error;

use crate::auth::{authorizer_from_config, AuthError, Authorizer};
use crate::config::AppConfig;
use crate::offload::Offloader;
use crate::transfer::config::create_transfer;
use crate::transfer::mock_store::MockTransfer;
use crate::transfer::{Transfer, TransferError};
use crate::usage::{reporter_from_config, LogReporter, UsageReporter};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("transfer backend: {0}")]
    Transfer(#[from] TransferError),
    #[error("authorizer: {0}")]
    Auth(#[from] AuthError),
    #[error("usage reporter: {0}")]
    Usage(#[from] reqwest::Error),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub transfer: Arc<dyn Transfer>,
    /// `None` when authorization is disabled
    pub authorizer: Option<Arc<dyn Authorizer>>,
    pub usage: Arc<dyn UsageReporter>,
    pub offloader: Offloader,
    pub config: AppConfig,
}

impl AppState {
    /// Create application state from configuration
    pub fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        info!("Initializing application state with configuration");
        std::fs::create_dir_all(&config.transfer.temp_path)?;

        let transfer = create_transfer(&config.transfer)?;
        let authorizer = authorizer_from_config(&config.auth)?;
        let usage = reporter_from_config(&config)?;
        let offloader = Offloader::new(config.transfer.pool_size);
        info!(
            "Transfer pool size {}, max payload {} bytes",
            offloader.pool_size(),
            config.server.max_payload_size
        );

        Ok(Self {
            transfer,
            authorizer,
            usage,
            offloader,
            config,
        })
    }

    /// Assemble state from ready-made parts; the config still supplies
    /// paths, limits and the pool size.
    pub fn with_parts(
        config: AppConfig,
        transfer: Arc<dyn Transfer>,
        authorizer: Option<Arc<dyn Authorizer>>,
        usage: Arc<dyn UsageReporter>,
    ) -> Self {
        let offloader = Offloader::new(config.transfer.pool_size);
        Self {
            transfer,
            authorizer,
            usage,
            offloader,
            config,
        }
    }

    /// Mock backend, no authorization, uploads staged under the system temp dir
    pub fn new_for_testing() -> Self {
        let mut config = AppConfig::default();
        config.transfer.temp_path = std::env::temp_dir().to_string_lossy().into_owned();
        Self::with_parts(config, Arc::new(MockTransfer::new()), None, Arc::new(LogReporter))
    }

    /// Where request bodies are staged before the backend call
    pub fn upload_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.transfer.temp_path)
    }
}
