//! Shared concurrency gate and per-call policy.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Timeout and retry policy applied to every collaborator call.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    /// Deadline for a single attempt
    pub timeout: Duration,
    /// Extra attempts after the first one fails
    pub retries: u32,
    /// Pause before retry `n` is `backoff * n`
    pub backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            retries: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

impl CallPolicy {
    /// Create a default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the retry backoff step.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Why a gated call produced no value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    /// The final attempt exceeded the per-call timeout
    #[error("{label} timed out after {after:?} ({attempts} attempt(s))")]
    Timeout {
        /// Call label
        label: String,
        /// Per-attempt deadline
        after: Duration,
        /// Attempts made
        attempts: u32,
    },

    /// The final attempt returned an error
    #[error("{label} failed after {attempts} attempt(s): {message}")]
    Failed {
        /// Call label
        label: String,
        /// Attempts made
        attempts: u32,
        /// Collaborator error, rendered
        message: String,
    },

    /// The gate was closed while waiting for a permit
    #[error("call gate closed")]
    GateClosed,
}

/// Counting gate shared by every collaborator call.
///
/// A permit is held for one attempt of one call and released before any
/// retry backoff. Cloning the gate shares the same permits.
#[derive(Debug, Clone)]
pub struct CallGate {
    permits: Arc<Semaphore>,
    capacity: usize,
    policy: CallPolicy,
}

impl CallGate {
    /// Create a gate admitting `max_concurrent` calls at once.
    pub fn new(max_concurrent: NonZeroUsize, policy: CallPolicy) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.get())),
            capacity: max_concurrent.get(),
            policy,
        }
    }

    /// Maximum concurrent calls.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Policy applied to calls.
    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    /// Run `op` under the gate with timeout and retries.
    ///
    /// `op` is invoked once per attempt and must be safe to repeat.
    pub async fn call<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let max_attempts = self.policy.retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            let outcome = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| CallError::GateClosed)?;
                tokio::time::timeout(self.policy.timeout, op()).await
            };

            let error = match outcome {
                Ok(Ok(value)) => {
                    debug!("{} succeeded on attempt {}", label, attempt);
                    return Ok(value);
                }
                Ok(Err(e)) => CallError::Failed {
                    label: label.to_string(),
                    attempts: attempt,
                    message: format!("{:#}", e),
                },
                Err(_) => CallError::Timeout {
                    label: label.to_string(),
                    after: self.policy.timeout,
                    attempts: attempt,
                },
            };

            if attempt >= max_attempts {
                warn!("{}", error);
                return Err(error);
            }

            debug!("{} attempt {} failed, retrying: {}", label, attempt, error);
            if !self.policy.backoff.is_zero() {
                tokio::time::sleep(self.policy.backoff * attempt).await;
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn gate(capacity: usize, policy: CallPolicy) -> CallGate {
        CallGate::new(NonZeroUsize::new(capacity).unwrap(), policy)
    }

    #[tokio::test]
    async fn test_call_returns_value() {
        let gate = gate(2, CallPolicy::new());
        let value = gate.call("echo", || async { Ok::<_, anyhow::Error>(7) }).await;
        assert_eq!(value.unwrap(), 7);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let gate = gate(1, CallPolicy::new().with_retries(1).with_backoff(Duration::ZERO));
        let calls = AtomicUsize::new(0);

        let value = gate
            .call("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(anyhow::anyhow!("transient"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(value.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_failure() {
        let gate = gate(1, CallPolicy::new().with_retries(2).with_backoff(Duration::ZERO));
        let calls = AtomicUsize::new(0);

        let result: Result<(), CallError> = gate
            .call("broken", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow::anyhow!("down")) }
            })
            .await;

        assert!(matches!(result, Err(CallError::Failed { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_failure() {
        let policy = CallPolicy::new()
            .with_timeout(Duration::from_secs(5))
            .with_retries(0);
        let gate = gate(1, policy);

        let result: Result<(), CallError> = gate
            .call("slow", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(CallError::Timeout { attempts: 1, .. })));
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_caps_concurrency() {
        let gate = gate(2, CallPolicy::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let calls = (0..6).map(|_| {
            let gate = gate.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                gate.call("work", || {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, anyhow::Error>(())
                    }
                })
                .await
            }
        });

        let handles: Vec<_> = calls.map(tokio::spawn).collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }
}
