use crate::close::CloseCode;
use crate::error::Error;
use crate::message::Message;
use futures::Stream;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::Receiver;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

pub type ID = Uuid;

// Used for generating a new UUID, every time a new connection is attached
pub fn generate_new_uuid() -> Uuid {
    let mut rng = StdRng::from_os_rng();
    let buf = rng.random::<[u8; 16]>();

    Uuid::new_v8(buf)
}

/// Everything the connection reports inbound: whole messages, control
/// frames, and the lifecycle tail. `Error` arrives at most once, `Closed`
/// exactly once and last, carrying the effective close status (synthetic
/// 1005/1006 included).
#[derive(Debug)]
pub enum Event {
    Message(Message),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Error(Arc<Error>),
    Closed { code: CloseCode, reason: String },
}

/// The inbound side handed to the application, a Stream of events in
/// delivery order.
pub struct EventStream {
    receiver: ReceiverStream<Event>,
}

impl EventStream {
    pub(crate) fn new(receiver: Receiver<Event>) -> Self {
        Self {
            receiver: ReceiverStream::new(receiver),
        }
    }

    /// Next event, or `None` once `Closed` has been consumed and the
    /// connection tasks are gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.next().await
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.receiver).poll_next(cx)
    }
}
