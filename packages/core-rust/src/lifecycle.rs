//! Optional hooks a target instance can implement around its operations.

use async_trait::async_trait;

use crate::descriptor::OperationKind;
use crate::error::OperationError;

/// Hooks run on the target instance by the process that executes the
/// operation.
///
/// `on_complete` and `on_cancelled` are mutually exclusive for one call, and
/// neither runs when `on_start` rejects the operation.
#[async_trait]
pub trait Lifecycle: Send {
    /// Runs before the operation body. An error stops the operation before
    /// any work is done.
    ///
    /// # Errors
    ///
    /// Implementations return [`OperationError::Validation`] to reject the
    /// operation.
    async fn on_start(&mut self, _kind: OperationKind) -> Result<(), OperationError> {
        Ok(())
    }

    /// Runs after the body succeeded.
    async fn on_complete(&mut self, _kind: OperationKind) {}

    /// Runs when cancellation was observed instead of completion.
    async fn on_cancelled(&mut self, _kind: OperationKind) {}
}
