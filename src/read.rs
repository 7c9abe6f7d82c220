use crate::aggregator::{Aggregated, MessageAggregator};
use crate::close::{CloseCode, CloseInfo};
use crate::config::{Role, WebSocketConfig};
use crate::error::Error;
use crate::event::Event;
use crate::frame::{Frame, OpCode};
use crate::parser::FrameParser;
use crate::pipeline::OutboundQueue;
use crate::state::{PeerClose, StateMachine};
use bytes::BytesMut;
use log::{debug, trace, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf};
use tokio::sync::mpsc::Sender;
use tokio::sync::watch;
use tokio::time::{sleep_until, timeout, Instant};

/// The inbound half of one connection: transport bytes go through the
/// parser, data frames through the aggregator, control frames to the state
/// machine, whole messages and lifecycle notifications out as events. Also
/// owns the idle and close timers.
pub(crate) struct ReadDriver<S> {
    read_half: ReadHalf<S>,
    buf: BytesMut,
    parser: FrameParser,
    aggregator: MessageAggregator,
    state: Arc<Mutex<StateMachine>>,
    queue: Arc<OutboundQueue>,
    events: Sender<Event>,
    config: WebSocketConfig,
    close_rx: watch::Receiver<bool>,
    shut_rx: watch::Receiver<bool>,
    close_deadline: Option<Instant>,
    // set when the parser hit a framing error; the byte stream is beyond
    // recovery, so input is discarded until EOF or the close timer
    parser_poisoned: bool,
    error_emitted: bool,
}

impl<S: AsyncRead + AsyncWrite + Send> ReadDriver<S> {
    pub fn new(
        read_half: ReadHalf<S>,
        queue: Arc<OutboundQueue>,
        state: Arc<Mutex<StateMachine>>,
        events: Sender<Event>,
        role: Role,
        config: WebSocketConfig,
    ) -> Self {
        let close_rx = queue.subscribe_close();
        let shut_rx = queue.subscribe_shutdown();
        Self {
            read_half,
            buf: BytesMut::new(),
            parser: FrameParser::new(role, config.max_frame_size),
            aggregator: MessageAggregator::new(config.max_message_size),
            state,
            queue,
            events,
            config,
            close_rx,
            shut_rx,
            close_deadline: None,
            parser_poisoned: false,
            error_emitted: false,
        }
    }

    pub async fn run(mut self) {
        loop {
            if self.lock_state().is_closed() {
                break;
            }

            let deadline = self.close_deadline;
            tokio::select! {
                res = read_some(&mut self.read_half, &mut self.buf, self.config.idle_timeout) => {
                    match res {
                        Ok(0) => {
                            self.on_eof();
                            break;
                        }
                        Ok(_) => {
                            if let Err(err) = self.process_buffer().await {
                                self.fail_session(err).await;
                            }
                        }
                        Err(err @ Error::Timeout { .. }) => {
                            debug!("idle timeout reached, closing");
                            self.fail_session(err).await;
                        }
                        Err(err) => {
                            self.on_transport_error(err).await;
                            break;
                        }
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(far_future)), if deadline.is_some() => {
                    debug!("close handshake timed out, dropping the transport");
                    self.lock_state().close_timed_out();
                    self.queue.shutdown(Arc::new(Error::ClosedLocally));
                    break;
                }
                _ = self.shut_rx.changed() => break,
                _ = self.close_rx.changed(), if deadline.is_none() => {
                    // a CLOSE was enqueued (by the app or by us); bound the
                    // wait for the peer's answer
                    self.close_deadline = Some(Instant::now() + self.config.close_timeout);
                }
            }
        }
        self.finish().await;
    }

    /// Drains every frame already buffered. Parser errors poison the byte
    /// stream; aggregator and close-payload errors leave it aligned, so
    /// parsing continues while the close handshake runs.
    async fn process_buffer(&mut self) -> Result<(), Error> {
        if self.parser_poisoned {
            self.buf.clear();
            return Ok(());
        }
        loop {
            match self.parser.feed(&mut self.buf) {
                Ok(Some(frame)) => self.handle_frame(frame).await?,
                Ok(None) => return Ok(()),
                Err(err) => {
                    self.parser_poisoned = true;
                    return Err(err);
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<(), Error> {
        trace!(
            "frame received, opcode {:?}, fin {}, payload {} bytes",
            frame.opcode,
            frame.fin,
            frame.payload.len()
        );
        match self.aggregator.push(frame)? {
            Some(Aggregated::Message(message)) => self.deliver(Event::Message(message)).await,
            Some(Aggregated::Control(frame)) => self.handle_control(frame).await,
            None => Ok(()),
        }
    }

    async fn handle_control(&mut self, frame: Frame) -> Result<(), Error> {
        match frame.opcode {
            OpCode::Ping => {
                self.deliver(Event::Ping(frame.payload.clone())).await?;
                if self.config.auto_pong {
                    let _ = self.queue.enqueue_control(Frame::pong(frame.payload));
                }
                Ok(())
            }
            OpCode::Pong => self.deliver(Event::Pong(frame.payload)).await,
            OpCode::Close => {
                self.on_peer_close(frame.close_info);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_peer_close(&mut self, info: Option<CloseInfo>) {
        // a CLOSE arriving mid-fragment-chain abandons the partial message
        if self.aggregator.is_aggregating() {
            debug!("close received mid-message, abandoning partial fragments");
            self.aggregator.abandon();
        }

        let action = self.lock_state().peer_close(info);
        match action {
            PeerClose::Echo(reply) => {
                debug!("peer initiated close, echoing {:?}", reply.code);
                let _ = self.queue.enqueue_close(reply);
            }
            PeerClose::Finished => {
                debug!("peer answered our close");
                self.close_deadline = None;
                self.queue.shutdown(Arc::new(Error::ClosedLocally));
            }
            PeerClose::Ignored => {}
        }
    }

    /// A protocol violation, oversized payload, invalid UTF-8 or idle
    /// timeout fails the session: one CLOSE with the mapped code goes out,
    /// pending data sends fail with the error as cause, the app sees the
    /// error once, and the close timer bounds the rest of the handshake.
    async fn fail_session(&mut self, err: Error) {
        let code = err.close_code().unwrap_or(CloseCode::Internal);
        warn!("failing connection: {err} (close code {})", u16::from(code));
        let reason = err.to_string();
        let cause = Arc::new(err);

        let close = self.lock_state().request_close(CloseInfo::new(code, &reason));
        if let Some(info) = close {
            let _ = self.queue.enqueue_close(info);
        }
        self.queue.fail_pending_data(cause.clone());
        self.emit_error(cause).await;
        if self.close_deadline.is_none() {
            self.close_deadline = Some(Instant::now() + self.config.close_timeout);
        }
    }

    fn on_eof(&mut self) {
        debug!("transport EOF");
        self.lock_state().transport_eof();
        self.queue.shutdown(Arc::new(Error::ClosedByPeer));
    }

    async fn on_transport_error(&mut self, err: Error) {
        warn!("transport read failed: {err}");
        let cause = Arc::new(err);
        self.lock_state().transport_error();
        self.queue.shutdown(cause.clone());
        self.emit_error(cause).await;
    }

    async fn emit_error(&mut self, cause: Arc<Error>) {
        if !self.error_emitted {
            self.error_emitted = true;
            let _ = self.events.send(Event::Error(cause)).await;
        }
    }

    async fn deliver(&mut self, event: Event) -> Result<(), Error> {
        self.events
            .send(event)
            .await
            .map_err(|_| Error::CommunicationError)
    }

    /// Terminal: resolve anything still pending and emit the one Closed
    /// event with the effective close status.
    async fn finish(self) {
        self.queue.shutdown(Arc::new(Error::ClosedLocally));
        let info = self.lock_state().effective_close();
        debug!("connection closed, code {}", u16::from(info.code));
        let _ = self
            .events
            .send(Event::Closed {
                code: info.code,
                reason: info.reason,
            })
            .await;
    }

    fn lock_state(&self) -> MutexGuard<'_, StateMachine> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn read_some<S: AsyncRead>(
    read_half: &mut ReadHalf<S>,
    buf: &mut BytesMut,
    idle_timeout: Option<Duration>,
) -> Result<usize, Error> {
    match idle_timeout {
        Some(limit) => Ok(timeout(limit, read_half.read_buf(buf)).await??),
        None => Ok(read_half.read_buf(buf).await?),
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400)
}
