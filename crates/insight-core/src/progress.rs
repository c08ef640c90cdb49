//! Cooperative cancellation and progress reporting.
//!
//! A [`ProgressToken`] is shared by every visitor of one pass invocation and by the thread that
//! may cancel it. Cancellation is cooperative: workers poll [`ProgressToken::check_canceled`] at
//! every element.

use crate::error::AnalysisError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Shared "interrupts forbidden" counter.
///
/// While any [`InterruptGuard`] is alive, canceling a token created with this policy is a
/// programming error and panics.
#[derive(Debug, Clone, Default)]
pub struct InterruptPolicy {
    forbidden: Arc<AtomicUsize>,
}

impl InterruptPolicy {
    /// Create a policy allowing interrupts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forbid interrupts until the returned guard is dropped.
    pub fn forbid(&self) -> InterruptGuard {
        self.forbidden.fetch_add(1, Ordering::SeqCst);
        InterruptGuard {
            forbidden: Arc::clone(&self.forbidden),
        }
    }

    /// Returns `true` while a guard is alive.
    pub fn is_forbidden(&self) -> bool {
        self.forbidden.load(Ordering::SeqCst) > 0
    }
}

/// Re-allows interrupts on drop.
#[derive(Debug)]
pub struct InterruptGuard {
    forbidden: Arc<AtomicUsize>,
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.forbidden.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct Inner {
    canceled: AtomicBool,
    limit: AtomicUsize,
    done: AtomicUsize,
}

/// Cancellation flag plus progress counter of one pass invocation.
#[derive(Debug, Clone, Default)]
pub struct ProgressToken {
    inner: Arc<Inner>,
    policy: InterruptPolicy,
}

impl ProgressToken {
    /// Create a token with its own interrupt policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token governed by `policy`.
    pub fn with_policy(policy: &InterruptPolicy) -> Self {
        Self {
            inner: Arc::default(),
            policy: policy.clone(),
        }
    }

    /// Request cancellation.
    ///
    /// # Panics
    ///
    /// Panics while interrupts are forbidden by the token's policy.
    pub fn cancel(&self) {
        assert!(
            !self.policy.is_forbidden(),
            "cancel requested while interrupts are forbidden"
        );
        self.inner.canceled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once canceled.
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    /// `Err(Canceled)` once canceled.
    pub fn check_canceled(&self) -> Result<(), AnalysisError> {
        if self.is_canceled() {
            Err(AnalysisError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Set the total number of work units and reset progress.
    pub fn set_limit(&self, limit: usize) {
        self.inner.limit.store(limit, Ordering::SeqCst);
        self.inner.done.store(0, Ordering::SeqCst);
    }

    /// Total number of work units.
    pub fn limit(&self) -> usize {
        self.inner.limit.load(Ordering::SeqCst)
    }

    /// Record `units` of completed work.
    pub fn advance(&self, units: usize) {
        self.inner.done.fetch_add(units, Ordering::SeqCst);
    }

    /// Completed work units.
    pub fn done(&self) -> usize {
        self.inner.done.load(Ordering::SeqCst)
    }

    /// Completion in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        let limit = self.limit();
        if limit == 0 {
            return 0.0;
        }
        (self.done() as f64 / limit as f64).min(1.0)
    }

    /// Returns `true` if both handles refer to the same token.
    pub fn ptr_eq(&self, other: &ProgressToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Batches progress updates into chunks of a fixed percentage of the limit.
#[derive(Debug)]
pub struct ChunkedProgress<'a> {
    token: &'a ProgressToken,
    chunk: usize,
    pending: usize,
}

impl<'a> ChunkedProgress<'a> {
    /// Report to `token` in chunks of `percent` % of `total` units (at least one unit).
    pub fn new(token: &'a ProgressToken, total: usize, percent: u8) -> Self {
        let chunk = (total * usize::from(percent) / 100).max(1);
        Self {
            token,
            chunk,
            pending: 0,
        }
    }

    /// Chunk size in units.
    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// Count one unit of work; fails when the token was canceled.
    pub fn tick(&mut self) -> Result<(), AnalysisError> {
        self.token.check_canceled()?;
        self.pending += 1;
        if self.pending >= self.chunk {
            self.token.advance(self.pending);
            self.pending = 0;
        }
        Ok(())
    }

    /// Flush pending units.
    pub fn flush(&mut self) {
        if self.pending > 0 {
            self.token.advance(self.pending);
            self.pending = 0;
        }
    }
}

impl Drop for ChunkedProgress<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = ProgressToken::new();
        let clone = token.clone();
        assert!(clone.check_canceled().is_ok());
        token.cancel();
        assert_eq!(clone.check_canceled(), Err(AnalysisError::Canceled));
    }

    #[test]
    fn test_chunked_progress() {
        let token = ProgressToken::new();
        token.set_limit(250);
        {
            let mut progress = ChunkedProgress::new(&token, 250, 1);
            assert_eq!(progress.chunk(), 2);
            progress.tick().unwrap();
            assert_eq!(token.done(), 0);
            progress.tick().unwrap();
            assert_eq!(token.done(), 2);
            progress.tick().unwrap();
        }
        assert_eq!(token.done(), 3);
    }

    #[test]
    fn test_tick_observes_cancellation() {
        let token = ProgressToken::new();
        let mut progress = ChunkedProgress::new(&token, 1000, 1);
        progress.tick().unwrap();
        token.cancel();
        assert_eq!(progress.tick(), Err(AnalysisError::Canceled));
    }

    #[test]
    #[should_panic(expected = "interrupts are forbidden")]
    fn test_cancel_while_forbidden_panics() {
        let policy = InterruptPolicy::new();
        let token = ProgressToken::with_policy(&policy);
        let _guard = policy.forbid();
        token.cancel();
    }

    #[test]
    fn test_guard_reallows_interrupts() {
        let policy = InterruptPolicy::new();
        {
            let _guard = policy.forbid();
            assert!(policy.is_forbidden());
        }
        assert!(!policy.is_forbidden());
        ProgressToken::with_policy(&policy).cancel();
    }
}
