use std::time::Duration;

/// Timeout and retry budget of the order engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a call waits for another transition on the same order.
    pub lock_timeout: Duration,
    /// Budget for each inventory/billing/notification call.
    pub collaborator_timeout: Duration,
    /// Budget for each store read or commit.
    pub store_timeout: Duration,
    /// Pause before the single retry of a transient failure.
    pub retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            collaborator_timeout: Duration::from_secs(3),
            store_timeout: Duration::from_secs(3),
            retry_backoff: Duration::from_millis(50),
        }
    }
}

impl EngineConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}
