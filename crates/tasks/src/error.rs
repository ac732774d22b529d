use drydock_common::EntityId;
use drydock_kernel::KernelError;

/// Why a task invocation stopped early.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// A weak handle no longer resolves.
    #[error("entity {0} no longer resolves")]
    HandleExpired(EntityId),
    /// A collaborator the stage needs is absent.
    #[error("missing capability: {0}")]
    MissingCapability(&'static str),
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

impl TaskError {
    /// Expected aborts: the world moved on. These end an invocation quietly.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            TaskError::HandleExpired(_)
                | TaskError::MissingCapability(_)
                | TaskError::Kernel(KernelError::HandleExpired(_))
        )
    }
}
