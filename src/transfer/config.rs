//! Backend selection for the storage transfer layer

use crate::config::TransferConfig;
use crate::transfer::{Transfer, TransferError, local_store::LocalTransfer, mock_store::MockTransfer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use log::info;

/// Available storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransferBackend {
    /// Files under `base_path`
    #[default]
    Local,
    /// In-memory, for tests and the "dummy" flag
    Mock,
}

impl std::str::FromStr for TransferBackend {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "localfs" | "fs" => Ok(TransferBackend::Local),
            "mock" | "dummy" => Ok(TransferBackend::Mock),
            _ => Err(format!("Unknown transfer backend: {}", s))
        }
    }
}

/// Create the configured backend
pub fn create_transfer(config: &TransferConfig) -> Result<Arc<dyn Transfer>, TransferError> {
    match config.backend {
        TransferBackend::Local => {
            info!("Using local transfer backend with base_path: {}, temp_path: {}",
                  config.base_path, config.temp_path);
            Ok(Arc::new(LocalTransfer::new(config)?))
        }
        TransferBackend::Mock => {
            info!("Using mock transfer backend");
            Ok(Arc::new(MockTransfer::with_snapshot_dir(&config.temp_path)))
        }
    }
}
