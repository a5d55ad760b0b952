use async_trait::async_trait;

use super::{ByteStream, Location, SourceHandler};
use crate::core::error::{FileOperation, Result, SyncError};

/// Serves `file://` locations, for packs being developed locally
#[derive(Debug, Default, Clone, Copy)]
pub struct FileHandler;

#[async_trait]
impl SourceHandler for FileHandler {
    fn name(&self) -> &'static str {
        "file"
    }

    fn matches(&self, location: &Location) -> bool {
        location.scheme() == "file"
    }

    async fn open(&self, location: &Location) -> Result<ByteStream> {
        let path = location
            .as_url()
            .to_file_path()
            .map_err(|()| SyncError::Protocol {
                location: location.to_string(),
                reason: "not a local file path".to_string(),
            })?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| SyncError::file_system(&path, FileOperation::Read, e))?;
        Ok(Box::new(file))
    }
}
