use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::errors::AppError;
use crate::models::ExpiryBucket;

#[derive(Debug, Error)]
pub enum OptionChainSourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),
}

impl From<OptionChainSourceError> for AppError {
    fn from(value: OptionChainSourceError) -> Self {
        AppError::External(value.to_string())
    }
}

/// Where option-chain pages come from. The live site in production, scripted
/// pages in tests.
#[async_trait]
pub trait OptionChainSource: Send + Sync {
    async fn fetch_html(&self, bucket: ExpiryBucket) -> Result<String, OptionChainSourceError>;
}

/// Reads a saved option-chain page from disk.
pub async fn load_html_from_file(file_path: &Path) -> Result<String, AppError> {
    debug!("loading option chain html from file: {}", file_path.display());

    tokio::fs::read_to_string(file_path).await.map_err(|e| {
        AppError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read {}: {}", file_path.display(), e),
        ))
    })
}
