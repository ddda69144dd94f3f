use crate::error::HttpError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Which budget a deadline came from; decides the error it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeadlineKind {
    /// Client or per-request timeout, yields [`HttpError::Timeout`]
    Timeout,
    /// Caller-supplied deadline, yields [`HttpError::DeadlineExceeded`]
    Deadline,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
    kind: DeadlineKind,
}

impl Deadline {
    fn error(self) -> HttpError {
        match self.kind {
            DeadlineKind::Timeout => HttpError::Timeout(self.budget),
            DeadlineKind::Deadline => HttpError::DeadlineExceeded(self.budget),
        }
    }
}

/// Cancellation and deadline scope for a request.
///
/// A context travels with the request through the transport chain (stored in
/// the request extensions). The base transport drops the in-flight network
/// call when the context fires; the retry wrapper stops waiting between
/// attempts; body reads on the response give up as well.
///
/// Cloning is cheap and clones share the same cancellation state.
///
/// # Example
///
/// ```ignore
/// let ctx = RequestContext::new().with_timeout(Duration::from_secs(2));
/// let resp = client.get_with_context(&ctx, "/slow").send().await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Deadline>,
}

impl RequestContext {
    /// Create a context with no deadline that is never cancelled unless
    /// [`cancel`](Self::cancel) is called
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the context to `timeout` from now.
    ///
    /// Firing produces [`HttpError::Timeout`]. An earlier existing deadline
    /// is kept.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        // Unrepresentable instants mean "no deadline in practice".
        let Some(at) = Instant::now().checked_add(timeout) else {
            return self;
        };
        self.bounded(Deadline {
            at,
            budget: timeout,
            kind: DeadlineKind::Timeout,
        })
    }

    /// Bound the context to an absolute deadline.
    ///
    /// Firing produces [`HttpError::DeadlineExceeded`] carrying the budget that
    /// remained when the deadline was set. An earlier existing deadline is kept.
    #[must_use]
    pub fn with_deadline(self, at: Instant) -> Self {
        let budget = at.saturating_duration_since(Instant::now());
        self.bounded(Deadline {
            at,
            budget,
            kind: DeadlineKind::Deadline,
        })
    }

    fn bounded(mut self, candidate: Deadline) -> Self {
        self.deadline = match self.deadline {
            Some(current) if current.at <= candidate.at => Some(current),
            _ => Some(candidate),
        };
        self
    }

    /// Derive a child context: cancelled together with `self`, cancellable
    /// on its own without affecting `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and every child derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`cancel`](Self::cancel) was called on this context or a parent
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Time left before the deadline, `None` without a deadline
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.at.saturating_duration_since(Instant::now()))
    }

    /// Returns the error the context has already produced, if any
    #[must_use]
    pub fn err(&self) -> Option<HttpError> {
        if self.token.is_cancelled() {
            return Some(HttpError::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d.at => Some(d.error()),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes,
    /// yielding the corresponding error.
    ///
    /// Never resolves for a context with neither a deadline nor a cancellation.
    pub async fn done(&self) -> HttpError {
        match self.deadline {
            Some(d) => {
                tokio::select! {
                    () = self.token.cancelled() => HttpError::Cancelled,
                    () = tokio::time::sleep_until(d.at) => d.error(),
                }
            }
            None => {
                self.token.cancelled().await;
                HttpError::Cancelled
            }
        }
    }

    /// Run `fut` to completion unless the context fires first.
    ///
    /// # Errors
    ///
    /// Returns the context error (`Cancelled`, `Timeout`, `DeadlineExceeded`)
    /// if it fires before `fut` completes, otherwise whatever `fut` returns.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, HttpError>
    where
        F: Future<Output = Result<T, HttpError>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => out,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_resolves_done() {
        let ctx = RequestContext::new();
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move { waiter.done().await });

        ctx.cancel();
        let err = handle.await.unwrap();
        assert!(matches!(err, HttpError::Cancelled));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_timeout_fires_with_budget() {
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(20));
        let err = ctx.done().await;
        assert!(matches!(err, HttpError::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_deadline_yields_deadline_exceeded() {
        let ctx = RequestContext::new().with_deadline(Instant::now() + Duration::from_millis(10));
        let err = ctx.done().await;
        assert!(matches!(err, HttpError::DeadlineExceeded(_)));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_earliest_deadline_wins() {
        let ctx = RequestContext::new()
            .with_timeout(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(60));
        let remaining = ctx.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_child_cancelled_by_parent_only() {
        let parent = RequestContext::new();
        let child = parent.child();

        child.cancel();
        assert!(!parent.is_cancelled());

        let second = parent.child();
        parent.cancel();
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_returns_future_output_when_idle() {
        let ctx = RequestContext::new().with_timeout(Duration::from_secs(5));
        let out = ctx.run(async { Ok::<_, HttpError>(7) }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn test_run_interrupts_pending_future() {
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(10));
        let result: Result<(), HttpError> = ctx.run(std::future::pending()).await;
        assert!(matches!(result, Err(HttpError::Timeout(_))));
    }
}
