use crate::close::{CloseCode, CloseInfo};
use crate::config::{SendOptions, WebSocketConfig};
use crate::error::Error;
use crate::frame::Frame;
use crate::handle::SendHandle;
use crate::message::Message;
use crate::pipeline::OutboundQueue;
use crate::state::StateMachine;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The application's sending half of a connection. Cheap to clone and safe
/// to use from any task; every operation returns a [`SendHandle`] and all
/// failures, including sends rejected up front, surface through it.
#[derive(Clone)]
pub struct WsSender {
    queue: Arc<OutboundQueue>,
    state: Arc<Mutex<StateMachine>>,
    config: WebSocketConfig,
}

impl WsSender {
    pub(crate) fn new(
        queue: Arc<OutboundQueue>,
        state: Arc<Mutex<StateMachine>>,
        config: WebSocketConfig,
    ) -> Self {
        Self {
            queue,
            state,
            config,
        }
    }

    /// Queues a whole message. With `fragment_size` set and a payload
    /// larger than it, the message goes out as a fragment chain; all
    /// fragments share the returned handle and it resolves after the last
    /// one is flushed.
    pub fn send_message(&self, message: Message, options: SendOptions) -> SendHandle {
        if let Some(max) = self.config.max_message_size {
            if message.len() > max {
                return SendHandle::failed(Error::MaxMessageSize);
            }
        }
        if let Some(fragment_size) = options.fragment_size {
            let max_frame_size = self.config.max_frame_size.unwrap_or(usize::MAX);
            if fragment_size == 0 || fragment_size > max_frame_size {
                return SendHandle::failed(Error::CustomFragmentSizeExceeded(
                    fragment_size,
                    max_frame_size,
                ));
            }
        }
        if !self.lock_state().can_send_data() {
            return SendHandle::failed(Error::ClosedLocally);
        }

        self.queue
            .enqueue_data(message.into_frames(options.fragment_size))
    }

    pub fn send_text(&self, text: impl Into<String>) -> SendHandle {
        self.send_message(Message::Text(text.into()), SendOptions::default())
    }

    pub fn send_binary(&self, data: Vec<u8>) -> SendHandle {
        self.send_message(Message::Binary(data), SendOptions::default())
    }

    /// Queues a PING. Control frames stay allowed while the close
    /// handshake is in flight.
    pub fn send_ping(&self, payload: Vec<u8>) -> SendHandle {
        self.send_control(Frame::ping(payload))
    }

    pub fn send_pong(&self, payload: Vec<u8>) -> SendHandle {
        self.send_control(Frame::pong(payload))
    }

    fn send_control(&self, frame: Frame) -> SendHandle {
        if frame.len() > 125 {
            return SendHandle::failed(Error::ControlFramePayloadSize);
        }
        if self.lock_state().is_closed() {
            return SendHandle::failed(Error::ClosedLocally);
        }
        self.queue.enqueue_control(frame)
    }

    /// Starts the closing handshake. Idempotent: once a close is under
    /// way, later calls (whatever their code) get a handle resolving with
    /// the close already in flight. 1005/1006/1015 are receive-only and
    /// rejected here.
    pub fn send_close(&self, code: CloseCode, reason: &str) -> SendHandle {
        if !code.is_allowed_on_wire() {
            return SendHandle::failed(Error::InvalidCloseCode(code.into()));
        }

        let requested = self.lock_state().request_close(CloseInfo::new(code, reason));
        match requested {
            Some(info) => self.queue.enqueue_close(info),
            // close already initiated (or the connection is past closing)
            None => self
                .queue
                .close_handle()
                .unwrap_or_else(|| SendHandle::failed(Error::ClosedLocally)),
        }
    }

    /// False once the connection stopped accepting data frames.
    pub fn is_open(&self) -> bool {
        self.lock_state().can_send_data()
    }

    fn lock_state(&self) -> MutexGuard<'_, StateMachine> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
