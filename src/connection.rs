use crate::config::{Role, WebSocketConfig};
use crate::event::{generate_new_uuid, EventStream, ID};
use crate::mask::{Masker, RandomMasker};
use crate::pipeline::OutboundQueue;
use crate::read::ReadDriver;
use crate::registry::ConnectionRegistry;
use crate::split::WsSender;
use crate::state::StateMachine;
use crate::write::Writer;
use log::debug;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

const EVENT_CHANNEL_SIZE: usize = 64;

/// A live connection: the sending handle plus the inbound event stream.
/// Usually split right away so reading and writing live in different tasks.
pub struct WsConnection {
    id: ID,
    sender: WsSender,
    events: EventStream,
}

impl WsConnection {
    pub fn id(&self) -> ID {
        self.id
    }

    /// A fresh clone of the sending half.
    pub fn sender(&self) -> WsSender {
        self.sender.clone()
    }

    pub fn split(self) -> (WsSender, EventStream) {
        (self.sender, self.events)
    }
}

/// Drives the WebSocket protocol over an already-upgraded byte duplex. The
/// handshake (and TLS, if any) happened elsewhere; this takes the stream,
/// the negotiated role and the policy, spawns the connection's reader and
/// writer tasks, and hands back the application-facing halves.
pub fn attach<S>(stream: S, role: Role, config: WebSocketConfig) -> WsConnection
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    attach_inner(stream, role, config, None, Box::new(RandomMasker::new()))
}

/// Like [`attach`], additionally reporting the connection's open/close
/// lifecycle to the given registry.
pub fn attach_with_registry<S>(
    stream: S,
    role: Role,
    config: WebSocketConfig,
    registry: ConnectionRegistry,
) -> WsConnection
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    attach_inner(
        stream,
        role,
        config,
        Some(registry),
        Box::new(RandomMasker::new()),
    )
}

/// Like [`attach`] with a custom mask-key source, e.g. a fixed masker to
/// make client output reproducible.
pub fn attach_with_masker<S>(
    stream: S,
    role: Role,
    config: WebSocketConfig,
    masker: Box<dyn Masker + Send>,
) -> WsConnection
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    attach_inner(stream, role, config, None, masker)
}

fn attach_inner<S>(
    stream: S,
    role: Role,
    config: WebSocketConfig,
    registry: Option<ConnectionRegistry>,
    masker: Box<dyn Masker + Send>,
) -> WsConnection
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let id = generate_new_uuid();
    debug!("attaching {:?} connection {id}", role);

    let (read_half, write_half) = tokio::io::split(stream);
    let queue = OutboundQueue::new(config.max_outbound_queue_bytes);
    let state = Arc::new(Mutex::new(StateMachine::new()));
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

    let sender = WsSender::new(queue.clone(), state.clone(), config.clone());
    if let Some(registry) = &registry {
        registry.register(id, sender.clone());
    }

    let writer = Writer::new(write_half, queue.clone(), state.clone(), role, masker);
    tokio::spawn(writer.run());

    let driver = ReadDriver::new(read_half, queue, state, event_tx, role, config);
    tokio::spawn(async move {
        driver.run().await;
        if let Some(registry) = registry {
            registry.deregister(&id);
        }
        debug!("connection {id} finished");
    });

    WsConnection {
        id,
        sender,
        events: EventStream::new(event_rx),
    }
}
