use crate::core::Result;
use async_trait::async_trait;
use tracing::debug;

/// Handle on the external resource store owned by one transaction.
#[async_trait]
pub trait ResourceSession: Send + Sync {
    /// Persist the session's pending changes.
    async fn save(&mut self) -> Result<()>;

    /// Reload the session state; `discard_changes` drops pending changes.
    async fn refresh(&mut self, discard_changes: bool) -> Result<()>;

    async fn logout(&mut self);
}

/// Versioning collaborator that creates checkpoints of touched resources.
#[async_trait]
pub trait VersionService: Send + Sync {
    async fn queue_checkpoint(&self, path: &str) -> Result<()>;
}

/// Session for callers whose resource store needs no save/revert step.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedSession;

#[async_trait]
impl ResourceSession for DetachedSession {
    async fn save(&mut self) -> Result<()> {
        Ok(())
    }

    async fn refresh(&mut self, _discard_changes: bool) -> Result<()> {
        Ok(())
    }

    async fn logout(&mut self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoVersioning;

#[async_trait]
impl VersionService for NoVersioning {
    async fn queue_checkpoint(&self, path: &str) -> Result<()> {
        debug!(path, "Versioning disabled, checkpoint dropped");
        Ok(())
    }
}
