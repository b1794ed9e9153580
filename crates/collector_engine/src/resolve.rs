use std::path::PathBuf;

use collector_logging::collector_debug;

use crate::filename::content_filename;
use crate::persist::AtomicFileWriter;
use crate::{Address, Content, ResolveError};

/// Derives the next address to crawl from fetched [`Content`].
///
/// `Ok(None)` marks the content as terminal. Called concurrently from many
/// resolve units.
#[async_trait::async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, content: &Content) -> Result<Option<Address>, ResolveError>;
}

/// Saves every resource under an output directory and never follows up.
#[derive(Debug, Clone)]
pub struct PersistingResolver {
    writer: AtomicFileWriter,
}

impl PersistingResolver {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            writer: AtomicFileWriter::new(output_dir),
        }
    }
}

#[async_trait::async_trait]
impl Resolver for PersistingResolver {
    async fn resolve(&self, content: &Content) -> Result<Option<Address>, ResolveError> {
        let filename = content_filename(&content.name, &content.kind, &content.payload);
        let writer = self.writer.clone();
        let payload = content.payload.clone();
        let target = tokio::task::spawn_blocking(move || writer.write(&filename, &payload))
            .await
            .map_err(|err| ResolveError::Unprocessable {
                kind: content.kind.clone(),
                message: err.to_string(),
            })??;
        collector_debug!(
            "Persisted {} bytes of {} content to {:?}",
            content.payload.len(),
            content.kind,
            target
        );
        Ok(None)
    }
}
