use async_trait::async_trait;

use crate::error::Result;

/// The single playback resource.
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    /// Point the player at `uri`; resolves once the source is ready to play.
    async fn load(&self, uri: &str) -> Result<()>;

    /// Pause and clear the current source.
    async fn teardown(&self);
}
