//! Bounded, retry-once execution of store and collaborator calls.

use crate::error::{CollaboratorError, StoreError};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub(crate) struct CallPolicy {
    pub budget: Duration,
    pub backoff: Duration,
}

impl CallPolicy {
    pub(crate) fn new(budget: Duration, backoff: Duration) -> Self {
        Self { budget, backoff }
    }

    /// Runs a collaborator call under the timeout budget, retrying a transient
    /// failure exactly once.
    pub(crate) async fn collaborator<T, F, Fut>(
        &self,
        service: &'static str,
        op: F,
    ) -> Result<T, CollaboratorError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        match self.attempt_collaborator(service, &op).await {
            Err(err) if err.is_transient() => {
                warn!(service, error = %err, "transient collaborator failure, retrying once");
                sleep(self.backoff).await;
                self.attempt_collaborator(service, &op).await
            }
            result => result,
        }
    }

    async fn attempt_collaborator<T, F, Fut>(
        &self,
        service: &'static str,
        op: &F,
    ) -> Result<T, CollaboratorError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        timeout(self.budget, op())
            .await
            .unwrap_or(Err(CollaboratorError::Timeout {
                service,
                budget: self.budget,
            }))
    }

    /// Same contract as [`CallPolicy::collaborator`] for store operations.
    pub(crate) async fn store<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match self.attempt_store(&op).await {
            Err(err) if err.is_transient() => {
                warn!(error = %err, "transient store failure, retrying once");
                sleep(self.backoff).await;
                self.attempt_store(&op).await
            }
            result => result,
        }
    }

    async fn attempt_store<T, F, Fut>(&self, op: &F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        timeout(self.budget, op())
            .await
            .unwrap_or(Err(StoreError::Timeout(self.budget)))
    }
}
