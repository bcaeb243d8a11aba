use std::future::Future;
use std::time::Duration;

use log::warn;

use super::{Result, TransportError};

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(3))
    }
}

/// Attempt bookkeeping for one retried operation.
///
/// For loops that cannot be written as a closure, such as ones that need
/// `&mut self` between attempts.
#[derive(Debug)]
pub struct Attempts<'a> {
    policy: RetryPolicy,
    operation: &'a str,
    attempt: u32,
}

impl<'a> Attempts<'a> {
    pub fn new(policy: RetryPolicy, operation: &'a str) -> Self {
        Self {
            policy,
            operation,
            attempt: 1,
        }
    }

    /// Number of the attempt in progress, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Waits out the delay when `e` allows another attempt, else hands the
    /// error back.
    ///
    /// Errors that are not [`TransportError::is_retryable`] come back
    /// unchanged. A retryable error on the last attempt comes back wrapped
    /// in [`TransportError::RetriesExhausted`].
    pub async fn retry_after(&mut self, e: TransportError) -> Result<()> {
        if !e.is_retryable() {
            return Err(e);
        }
        if self.attempt >= self.policy.max_attempts {
            return Err(TransportError::RetriesExhausted {
                operation: self.operation.to_string(),
                attempts: self.attempt,
                last: Box::new(e),
            });
        }

        warn!(
            "{} failed (attempt {}/{}): {}; retrying in {:?}",
            self.operation, self.attempt, self.policy.max_attempts, e, self.policy.delay
        );
        tokio::time::sleep(self.policy.delay).await;
        self.attempt += 1;
        Ok(())
    }
}

/// Runs `op` until it succeeds, fails permanently, or the policy runs out.
///
/// Only [`TransportError::is_retryable`] errors are retried. When the last
/// attempt fails transiently the error is wrapped in
/// [`TransportError::RetriesExhausted`].
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = Attempts::new(*policy, operation);
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => attempts.retry_after(e).await?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let result = with_retry(&fast(3), "connect", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TransportError::Transient("reset".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(5), "login", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::AuthenticationFailed("bad password".to_string()))
        })
        .await;

        assert!(matches!(result, Err(TransportError::AuthenticationFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(5), "select", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::FolderNotFound("Nope".to_string()))
        })
        .await;

        assert!(matches!(result, Err(TransportError::FolderNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_wraps_last_error() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(3), "connect", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Transient("timeout".to_string()))
        })
        .await;

        match result {
            Err(TransportError::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, TransportError::Transient(_)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_allow_manual_loops() {
        let mut attempts = Attempts::new(fast(2), "IMAP SEARCH");
        assert_eq!(attempts.attempt(), 1);

        attempts
            .retry_after(TransportError::Transient("connection lost".to_string()))
            .await
            .unwrap();
        assert_eq!(attempts.attempt(), 2);

        match attempts
            .retry_after(TransportError::Transient("connection lost".to_string()))
            .await
        {
            Err(TransportError::RetriesExhausted {
                operation,
                attempts: made,
                ..
            }) => {
                assert_eq!(operation, "IMAP SEARCH");
                assert_eq!(made, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_attempts_pass_permanent_errors_through() {
        let mut attempts = Attempts::new(fast(5), "IMAP FETCH");
        let result = attempts
            .retry_after(TransportError::Permanent("BAD".to_string()))
            .await;
        assert!(matches!(result, Err(TransportError::Permanent(_))));
        assert_eq!(attempts.attempt(), 1);
    }

    #[test]
    fn test_policy_has_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
