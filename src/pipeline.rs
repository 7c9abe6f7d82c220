use crate::close::CloseInfo;
use crate::error::Error;
use crate::frame::Frame;
use crate::handle::SendHandle;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Notify};

/// Scheduling class of a queued send. Control frames jump ahead of data,
/// the CLOSE rides at the tail of the data queue so already-queued messages
/// drain before the handshake starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendClass {
    Control,
    Data,
    Close,
}

/// One queued send: every frame of one message (or a single control frame)
/// plus the handle observing its fate. Fragments leave the queue one at a
/// time so control frames can slot in between them.
pub(crate) struct Outbound {
    pub frames: VecDeque<Frame>,
    pub handle: SendHandle,
    pub class: SendClass,
    pub bytes: usize,
}

struct QueueInner {
    control: VecDeque<Outbound>,
    data: VecDeque<Outbound>,
    queued_bytes: usize,
    close_handle: Option<SendHandle>,
    shutdown: bool,
    cause: Option<Arc<Error>>,
}

/// The connection's outbound side: a two-class FIFO drained by a single
/// writer task. All mutation happens behind the inner lock; the lock is
/// never held across an await point.
pub(crate) struct OutboundQueue {
    max_bytes: Option<usize>,
    inner: Mutex<QueueInner>,
    // wakes the writer task; single consumer, so notify_one never loses
    notify: Notify,
    // observed by the reader task to arm the close timer
    close_tx: watch::Sender<bool>,
    // observed by the reader task to learn about writer-side teardown
    shut_tx: watch::Sender<bool>,
}

impl OutboundQueue {
    pub fn new(max_bytes: Option<usize>) -> Arc<Self> {
        let (close_tx, _) = watch::channel(false);
        let (shut_tx, _) = watch::channel(false);
        Arc::new(Self {
            max_bytes,
            inner: Mutex::new(QueueInner {
                control: VecDeque::new(),
                data: VecDeque::new(),
                queued_bytes: 0,
                close_handle: None,
                shutdown: false,
                cause: None,
            }),
            notify: Notify::new(),
            close_tx,
            shut_tx,
        })
    }

    pub fn subscribe_close(&self) -> watch::Receiver<bool> {
        self.close_tx.subscribe()
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shut_tx.subscribe()
    }

    /// Queues a whole message worth of frames behind one handle. Rejected
    /// sends come back as an already-failed handle, so callers observe
    /// every outcome the same way.
    pub fn enqueue_data(&self, frames: Vec<Frame>) -> SendHandle {
        let bytes: usize = frames.iter().map(Frame::len).sum();
        let mut inner = self.lock();
        if inner.shutdown {
            return SendHandle::completed(Err(inner.closed_cause()));
        }
        if inner.close_handle.is_some() {
            return SendHandle::failed(Error::ClosedLocally);
        }
        if let Some(max) = self.max_bytes {
            if inner.queued_bytes + bytes > max {
                return SendHandle::failed(Error::Backpressure);
            }
        }

        let handle = SendHandle::new();
        inner.queued_bytes += bytes;
        inner.data.push_back(Outbound {
            frames: frames.into(),
            handle: handle.clone(),
            class: SendClass::Data,
            bytes,
        });
        drop(inner);
        self.notify.notify_one();
        handle
    }

    /// Queues a PING or PONG. Control frames stay allowed during the close
    /// handshake, right up until the transport goes down.
    pub fn enqueue_control(&self, frame: Frame) -> SendHandle {
        let mut inner = self.lock();
        if inner.shutdown {
            return SendHandle::completed(Err(inner.closed_cause()));
        }

        let bytes = frame.len();
        let handle = SendHandle::new();
        inner.queued_bytes += bytes;
        inner.control.push_back(Outbound {
            frames: VecDeque::from([frame]),
            handle: handle.clone(),
            class: SendClass::Control,
            bytes,
        });
        drop(inner);
        self.notify.notify_one();
        handle
    }

    /// Queues the one CLOSE frame of the connection. Subsequent calls get
    /// the handle of the close already in flight.
    pub fn enqueue_close(&self, info: CloseInfo) -> SendHandle {
        let mut inner = self.lock();
        if let Some(handle) = &inner.close_handle {
            return handle.clone();
        }
        if inner.shutdown {
            return SendHandle::completed(Err(inner.closed_cause()));
        }

        let frame = Frame::close(Some(&info));
        let bytes = frame.len();
        let handle = SendHandle::new();
        inner.close_handle = Some(handle.clone());
        inner.queued_bytes += bytes;
        inner.data.push_back(Outbound {
            frames: VecDeque::from([frame]),
            handle: handle.clone(),
            class: SendClass::Close,
            bytes,
        });
        drop(inner);
        self.notify.notify_one();
        self.close_tx.send_replace(true);
        handle
    }

    /// The handle of the CLOSE already enqueued, if any.
    pub fn close_handle(&self) -> Option<SendHandle> {
        self.lock().close_handle.clone()
    }

    /// Next control send ready for the wire, skipping any that were
    /// cancelled while queued.
    pub fn pop_control(&self) -> Option<Outbound> {
        let mut inner = self.lock();
        while let Some(entry) = inner.control.pop_front() {
            inner.queued_bytes = inner.queued_bytes.saturating_sub(entry.bytes);
            if entry.handle.begin_write() {
                return Some(entry);
            }
        }
        None
    }

    /// Next data (or close) send ready for the wire.
    pub fn pop_data(&self) -> Option<Outbound> {
        let mut inner = self.lock();
        while let Some(entry) = inner.data.pop_front() {
            inner.queued_bytes = inner.queued_bytes.saturating_sub(entry.bytes);
            if entry.handle.begin_write() {
                return Some(entry);
            }
        }
        None
    }

    /// Parks the writer until new work or shutdown arrives.
    pub async fn wait_for_work(&self) {
        self.notify.notified().await;
    }

    /// Fails every data send still waiting in the queue, leaving control
    /// frames and the CLOSE untouched. Used when a protocol error aborts
    /// the session: the CLOSE must still go out, queued messages must not.
    pub fn fail_pending_data(&self, cause: Arc<Error>) {
        let failed = {
            let mut inner = self.lock();
            let mut failed = Vec::new();
            let mut kept = VecDeque::new();
            while let Some(entry) = inner.data.pop_front() {
                if entry.class == SendClass::Data {
                    inner.queued_bytes = inner.queued_bytes.saturating_sub(entry.bytes);
                    failed.push(entry);
                } else {
                    kept.push_back(entry);
                }
            }
            inner.data = kept;
            failed
        };
        for entry in failed {
            entry.handle.complete(Err(cause.clone()));
        }
    }

    /// Terminal teardown: nothing is accepted or written anymore and every
    /// queued send fails with `cause`. Idempotent; the first cause sticks.
    pub fn shutdown(&self, cause: Arc<Error>) {
        let drained = {
            let mut inner = self.lock();
            if inner.shutdown {
                return;
            }
            inner.shutdown = true;
            inner.cause = Some(cause.clone());
            inner.queued_bytes = 0;
            let mut drained: Vec<Outbound> = inner.control.drain(..).collect();
            drained.extend(inner.data.drain(..));
            drained
        };
        for entry in drained {
            entry.handle.complete(Err(cause.clone()));
        }
        self.notify.notify_one();
        self.shut_tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    /// The cause recorded at shutdown.
    pub fn cause(&self) -> Arc<Error> {
        self.lock().closed_cause()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueueInner {
    fn closed_cause(&self) -> Arc<Error> {
        self.cause
            .clone()
            .unwrap_or_else(|| Arc::new(Error::ClosedLocally))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::close::CloseCode;
    use crate::frame::OpCode;

    #[test]
    fn test_control_outranks_data() {
        let queue = OutboundQueue::new(None);
        queue.enqueue_data(vec![Frame::text(b"data".to_vec())]);
        queue.enqueue_control(Frame::ping(Vec::new()));

        let first = queue.pop_control().unwrap();
        assert_eq!(first.class, SendClass::Control);
        assert!(queue.pop_control().is_none());
        let second = queue.pop_data().unwrap();
        assert_eq!(second.class, SendClass::Data);
    }

    #[test]
    fn test_backpressure_budget() {
        let queue = OutboundQueue::new(Some(8));
        let ok = queue.enqueue_data(vec![Frame::binary(vec![0; 6])]);
        assert!(!ok.is_done());

        let rejected = queue.enqueue_data(vec![Frame::binary(vec![0; 6])]);
        assert!(rejected.is_done());
        assert!(matches!(
            futures::executor::block_on(rejected.await_completion()),
            Err(cause) if matches!(*cause, Error::Backpressure)
        ));

        // popping releases the budget
        queue.pop_data().unwrap();
        let ok = queue.enqueue_data(vec![Frame::binary(vec![0; 6])]);
        assert!(!ok.is_done());
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_data() {
        let queue = OutboundQueue::new(None);
        let first = queue.enqueue_close(CloseInfo::new(CloseCode::Normal, ""));
        let second = queue.enqueue_close(CloseInfo::new(CloseCode::GoingAway, ""));

        let rejected = queue.enqueue_data(vec![Frame::text(Vec::new())]);
        assert!(matches!(
            futures::executor::block_on(rejected.await_completion()),
            Err(cause) if matches!(*cause, Error::ClosedLocally)
        ));

        // pings still pass
        let ping = queue.enqueue_control(Frame::ping(Vec::new()));
        assert!(!ping.is_done());

        // exactly one close frame sits in the queue, carrying the first code
        let entry = queue.pop_data().unwrap();
        assert_eq!(entry.class, SendClass::Close);
        assert_eq!(entry.frames[0].opcode, OpCode::Close);
        assert_eq!(&entry.frames[0].payload[..2], &1000u16.to_be_bytes());
        assert!(queue.pop_data().is_none());

        // both callers observe the same in-flight close
        entry.handle.complete(Ok(()));
        assert!(first.is_done() && second.is_done());
    }

    #[test]
    fn test_cancelled_entries_are_skipped() {
        let queue = OutboundQueue::new(None);
        let cancelled = queue.enqueue_data(vec![Frame::text(b"a".to_vec())]);
        let live = queue.enqueue_data(vec![Frame::text(b"b".to_vec())]);
        assert!(cancelled.cancel());

        let entry = queue.pop_data().unwrap();
        assert_eq!(entry.frames[0].payload, b"b");
        assert!(!live.is_done());
    }

    #[test]
    fn test_shutdown_fails_everything_queued() {
        let queue = OutboundQueue::new(None);
        let data = queue.enqueue_data(vec![Frame::text(Vec::new())]);
        let ping = queue.enqueue_control(Frame::ping(Vec::new()));

        queue.shutdown(Arc::new(Error::ClosedByPeer));

        for handle in [data, ping] {
            assert!(matches!(
                futures::executor::block_on(handle.await_completion()),
                Err(cause) if matches!(*cause, Error::ClosedByPeer)
            ));
        }

        let late = queue.enqueue_data(vec![Frame::text(Vec::new())]);
        assert!(matches!(
            futures::executor::block_on(late.await_completion()),
            Err(cause) if matches!(*cause, Error::ClosedByPeer)
        ));
        assert!(queue.is_shutdown());
    }

    #[test]
    fn test_fail_pending_data_spares_the_close() {
        let queue = OutboundQueue::new(None);
        let data = queue.enqueue_data(vec![Frame::text(Vec::new())]);
        let close = queue.enqueue_close(CloseInfo::new(CloseCode::Protocol, ""));

        queue.fail_pending_data(Arc::new(Error::RsvNotZero));

        assert!(data.is_done());
        assert!(!close.is_done());
        let entry = queue.pop_data().unwrap();
        assert_eq!(entry.class, SendClass::Close);
    }
}
