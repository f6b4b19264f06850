//! Call detail record writing

use async_trait::async_trait;
use radius_model::Packet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CdrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for accounting records
///
/// Writes are fire-and-forget from the dispatcher's point of view: errors
/// are logged and never fail the accounting request.
#[async_trait]
pub trait CdrWriter: Send + Sync {
    async fn write(&self, packet: &Packet) -> Result<(), CdrError>;
}
