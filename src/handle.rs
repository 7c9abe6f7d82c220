use crate::error::Error;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};

/// Outcome of one send. Several sends can fail for the same underlying
/// reason (the queue tears down as a whole), so the cause is shared.
pub type SendResult = Result<(), Arc<Error>>;

#[derive(Debug)]
enum Status {
    Queued,
    Writing,
    Done(SendResult),
}

#[derive(Debug)]
struct Inner {
    status: Mutex<Status>,
    // flips to true exactly once, when the status reaches Done
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

/// Per-send completion handle, shared between the connection (which
/// produces the outcome) and the caller (which observes it). The handle
/// resolves exactly once: success after the last frame of the send is
/// flushed, failure with the underlying cause, or cancelled.
#[derive(Debug, Clone)]
pub struct SendHandle {
    inner: Arc<Inner>,
}

impl SendHandle {
    pub(crate) fn new() -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                status: Mutex::new(Status::Queued),
                done_tx,
                done_rx,
            }),
        }
    }

    /// A handle that is already resolved, for sends rejected up front.
    pub(crate) fn completed(result: SendResult) -> Self {
        let handle = Self::new();
        handle.complete(result);
        handle
    }

    pub(crate) fn failed(error: Error) -> Self {
        Self::completed(Err(Arc::new(error)))
    }

    /// Waits until the send resolves.
    pub async fn await_completion(&self) -> SendResult {
        let mut done = self.inner.done_rx.clone();
        loop {
            if let Status::Done(result) = &*self.lock_status() {
                return result.clone();
            }
            if done.changed().await.is_err() {
                // the sender lives inside our own Arc, so this arm exists
                // only to satisfy the API
                return Err(Arc::new(Error::CommunicationError));
            }
        }
    }

    /// Waits until the send resolves or the deadline passes, whichever
    /// comes first. A deadline miss does not affect the send itself.
    pub async fn await_completion_with_deadline(&self, deadline: Instant) -> SendResult {
        match timeout_at(deadline, self.await_completion()).await {
            Ok(result) => result,
            Err(elapsed) => Err(Arc::new(Error::from(elapsed))),
        }
    }

    /// Cancels the send if none of its frames has begun writing to the
    /// transport. Once the writer has picked the send up, cancellation
    /// would desync the peer's parser, so this returns false and the send
    /// runs to its natural outcome.
    pub fn cancel(&self) -> bool {
        let mut status = self.lock_status();
        match *status {
            Status::Queued => {
                *status = Status::Done(Err(Arc::new(Error::Cancelled)));
                drop(status);
                self.inner.done_tx.send_replace(true);
                true
            }
            _ => false,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(*self.lock_status(), Status::Done(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            &*self.lock_status(),
            Status::Done(Err(cause)) if matches!(**cause, Error::Cancelled)
        )
    }

    /// Claims the send for writing. Returns false when the caller lost the
    /// race against `cancel` and should skip the send entirely.
    pub(crate) fn begin_write(&self) -> bool {
        let mut status = self.lock_status();
        match *status {
            Status::Queued => {
                *status = Status::Writing;
                true
            }
            Status::Writing => true,
            Status::Done(_) => false,
        }
    }

    /// Resolves the handle. A second resolution (e.g. completion racing a
    /// cancel) is ignored; the first outcome wins.
    pub(crate) fn complete(&self, result: SendResult) {
        {
            let mut status = self.lock_status();
            if matches!(*status, Status::Done(_)) {
                return;
            }
            *status = Status::Done(result);
        }
        self.inner.done_tx.send_replace(true);
    }

    fn lock_status(&self) -> MutexGuard<'_, Status> {
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_completion_resolves_waiters() {
        let handle = SendHandle::new();
        assert!(!handle.is_done());

        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.await_completion().await });

        handle.complete(Ok(()));
        assert!(task.await.unwrap().is_ok());
        assert!(handle.is_done());
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_await_after_completion_returns_immediately() {
        let handle = SendHandle::completed(Ok(()));
        assert!(handle.await_completion().await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_before_write_wins() {
        let handle = SendHandle::new();
        assert!(handle.cancel());
        assert!(handle.is_cancelled());
        assert!(handle.is_done());
        // the writer must now skip this send
        assert!(!handle.begin_write());

        let result = handle.await_completion().await;
        assert!(matches!(result, Err(cause) if matches!(*cause, Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_after_write_started_fails() {
        let handle = SendHandle::new();
        assert!(handle.begin_write());
        assert!(!handle.cancel());
        assert!(!handle.is_cancelled());

        handle.complete(Ok(()));
        assert!(handle.await_completion().await.is_ok());
    }

    #[tokio::test]
    async fn test_first_outcome_wins() {
        let handle = SendHandle::new();
        handle.complete(Err(Arc::new(Error::ClosedLocally)));
        handle.complete(Ok(()));
        let result = handle.await_completion().await;
        assert!(matches!(result, Err(cause) if matches!(*cause, Error::ClosedLocally)));
    }

    #[tokio::test]
    async fn test_deadline_elapses_without_resolving_the_send() {
        let handle = SendHandle::new();
        let deadline = Instant::now() + Duration::from_millis(20);
        let result = handle.await_completion_with_deadline(deadline).await;
        assert!(matches!(result, Err(cause) if matches!(*cause, Error::Timeout { .. })));
        // the send is still pending
        assert!(!handle.is_done());
    }
}
