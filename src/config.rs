//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{ClassroomError, Result};
use crate::storage::StorageConfig;

const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_path: PathBuf,
    pub bind: SocketAddr,
    /// Base of every attachment URL handed out
    pub public_url: String,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let data_path = std::env::var("CLASSROOM_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("classroom-stream"));

        let bind_raw = std::env::var("CLASSROOM_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw
            .parse()
            .map_err(|e| ClassroomError::Internal(format!("CLASSROOM_BIND '{}': {}", bind_raw, e)))?;

        let public_url = std::env::var("CLASSROOM_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}/files", bind));

        let storage = StorageConfig::from_env(data_path.join("objects"));

        Ok(Self {
            data_path,
            bind,
            public_url,
            storage,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_path.join("classroom.db")
    }
}
