use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use diveops_domain::{Excursion, ExcursionStatus, OperationsRepository, StoreError};

/// Drives excursion status transitions. The only edges are
/// scheduled -> in_progress -> completed; cancellation of an excursion is
/// handled by the collaborator layer, not here.
pub struct ExcursionLifecycleService {
    store: Arc<dyn OperationsRepository>,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("excursion not found: {0}")]
    ExcursionNotFound(Uuid),

    #[error("excursion is {actual}, cannot transition to {attempted}")]
    InvalidTransition {
        actual: ExcursionStatus,
        attempted: ExcursionStatus,
    },

    #[error("lock wait timed out, retry the operation")]
    LockTimeout,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout => LifecycleError::LockTimeout,
            other => LifecycleError::Store(other),
        }
    }
}

impl ExcursionLifecycleService {
    pub fn new(store: Arc<dyn OperationsRepository>) -> Self {
        Self { store }
    }

    /// scheduled -> in_progress.
    pub async fn start(&self, excursion_id: Uuid, actor: Uuid) -> Result<Excursion, LifecycleError> {
        self.transition(
            excursion_id,
            actor,
            ExcursionStatus::Scheduled,
            ExcursionStatus::InProgress,
        )
        .await
    }

    /// in_progress -> completed.
    pub async fn complete(
        &self,
        excursion_id: Uuid,
        actor: Uuid,
    ) -> Result<Excursion, LifecycleError> {
        self.transition(
            excursion_id,
            actor,
            ExcursionStatus::InProgress,
            ExcursionStatus::Completed,
        )
        .await
    }

    async fn transition(
        &self,
        excursion_id: Uuid,
        actor: Uuid,
        expected: ExcursionStatus,
        next: ExcursionStatus,
    ) -> Result<Excursion, LifecycleError> {
        let excursion = self
            .store
            .transition_excursion(excursion_id, expected, next)
            .await
            .map_err(|err| match err {
                StoreError::ExcursionNotFound(id) => LifecycleError::ExcursionNotFound(id),
                StoreError::ExcursionStatusConflict { actual, .. } => {
                    LifecycleError::InvalidTransition {
                        actual,
                        attempted: next,
                    }
                }
                other => other.into(),
            })?;

        info!(
            excursion_id = %excursion_id,
            actor = %actor,
            status = %excursion.status,
            "excursion status advanced"
        );
        Ok(excursion)
    }
}
