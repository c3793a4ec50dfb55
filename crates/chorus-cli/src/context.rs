use async_trait::async_trait;
use chorus_coordination::ContextProvider;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Supplies the contents of a text file as context for every message.
///
/// The file is re-read per message so edits take effect without a restart.
/// An unreadable file yields empty context.
#[derive(Debug, Clone)]
pub struct FileContext {
    path: PathBuf,
}

impl FileContext {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContextProvider for FileContext {
    async fn get_context(&self, _message: &str) -> String {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                debug!(path = %self.path.display(), bytes = text.len(), "context loaded");
                text
            }
            Err(e) => {
                warn!(path = %self.path.display(), "Failed to read context file: {e}");
                String::new()
            }
        }
    }
}
