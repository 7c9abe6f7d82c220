use crate::config::Role;
use crate::error::Error;
use crate::frame::Frame;
use crate::generator::encode_frame;
use crate::mask::Masker;
use crate::pipeline::{Outbound, OutboundQueue, SendClass};
use crate::state::StateMachine;
use bytes::BytesMut;
use log::{debug, trace};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};

/// The single outbound writer of one connection. Drains the queue in
/// priority order, one frame at a time so control frames can slip between
/// the fragments of a message, and applies client-role masking on the way
/// out. Completion of a send fires only after its last frame is flushed.
pub(crate) struct Writer<S> {
    write_half: WriteHalf<S>,
    queue: Arc<OutboundQueue>,
    state: Arc<Mutex<StateMachine>>,
    role: Role,
    masker: Box<dyn Masker + Send>,
    buf: BytesMut,
}

impl<S: AsyncRead + AsyncWrite + Send> Writer<S> {
    pub fn new(
        write_half: WriteHalf<S>,
        queue: Arc<OutboundQueue>,
        state: Arc<Mutex<StateMachine>>,
        role: Role,
        masker: Box<dyn Masker + Send>,
    ) -> Self {
        Self {
            write_half,
            queue,
            state,
            role,
            masker,
            buf: BytesMut::new(),
        }
    }

    pub async fn run(mut self) {
        // the data entry whose fragments are currently going out
        let mut current: Option<Outbound> = None;

        loop {
            if self.queue.is_shutdown() {
                if let Some(entry) = current.take() {
                    entry.handle.complete(Err(self.queue.cause()));
                }
                break;
            }

            // control frames jump the line, including between fragments of
            // the message in flight
            if let Some(entry) = self.queue.pop_control() {
                if self.write_single(entry).await.is_err() {
                    break;
                }
                continue;
            }

            if current.is_none() {
                current = self.queue.pop_data();
            }

            let Some(mut entry) = current.take() else {
                self.queue.wait_for_work().await;
                continue;
            };

            let Some(frame) = entry.frames.pop_front() else {
                entry.handle.complete(Ok(()));
                continue;
            };

            let last = entry.frames.is_empty();
            match self.write_frame(frame, last).await {
                Ok(()) if last => {
                    let is_close = entry.class == SendClass::Close;
                    entry.handle.complete(Ok(()));
                    if is_close && self.finish_close().await {
                        break;
                    }
                }
                Ok(()) => current = Some(entry),
                Err(cause) => {
                    entry.handle.complete(Err(cause));
                    break;
                }
            }
        }

        let _ = self.write_half.shutdown().await;
        trace!("writer task finished");
    }

    /// Writes a one-frame entry (control class) and resolves its handle.
    async fn write_single(&mut self, mut entry: Outbound) -> Result<(), Arc<Error>> {
        let Some(frame) = entry.frames.pop_front() else {
            entry.handle.complete(Ok(()));
            return Ok(());
        };
        match self.write_frame(frame, true).await {
            Ok(()) => {
                entry.handle.complete(Ok(()));
                Ok(())
            }
            Err(cause) => {
                entry.handle.complete(Err(cause.clone()));
                Err(cause)
            }
        }
    }

    /// Encodes and writes one frame, flushing when it ends an entry. A
    /// transport failure tears the whole outbound side down.
    async fn write_frame(&mut self, mut frame: Frame, flush: bool) -> Result<(), Arc<Error>> {
        // Clients must mask every frame; frames that already carry a key
        // (e.g. from tests) keep it.
        if self.role.is_client() && frame.mask.is_none() {
            frame.mask = Some(self.masker.next_key());
        }

        self.buf.clear();
        encode_frame(&frame, &mut self.buf);
        trace!(
            "writing frame, opcode {:?}, payload {} bytes",
            frame.opcode,
            frame.payload.len()
        );

        let result = async {
            self.write_half.write_all(&self.buf).await?;
            if flush {
                self.write_half.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(err) => Err(self.teardown(err)),
        }
    }

    /// Our CLOSE frame reached the transport. When the peer closed first,
    /// that flush completes the handshake and the transport goes down.
    async fn finish_close(&mut self) -> bool {
        let finished = self.lock_state().close_flushed();
        if finished {
            debug!("close handshake complete, shutting down transport");
            let _ = self.write_half.shutdown().await;
            self.queue.shutdown(Arc::new(Error::ClosedByPeer));
        }
        finished
    }

    fn teardown(&self, err: std::io::Error) -> Arc<Error> {
        debug!("transport write failed: {err}");
        let cause = Arc::new(Error::from(err));
        self.lock_state().transport_error();
        self.queue.shutdown(cause.clone());
        cause
    }

    fn lock_state(&self) -> MutexGuard<'_, StateMachine> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
