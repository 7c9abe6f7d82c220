use std::time::Duration;

/// Which side of the connection this engine drives. The role decides the
/// masking direction: clients mask every outgoing frame and expect unmasked
/// input, servers expect masked input and never mask output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    pub fn is_client(self) -> bool {
        matches!(self, Role::Client)
    }

    pub fn is_server(self) -> bool {
        !self.is_client()
    }
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Upper bound for a single frame payload. Larger frames are rejected
    /// and the connection is closed with 1009. `None` means unlimited.
    pub max_frame_size: Option<usize>,
    /// Upper bound for a reassembled message across all its fragments.
    /// Exceeding it closes the connection with 1009. `None` means unlimited.
    pub max_message_size: Option<usize>,
    /// Close the connection when no bytes arrive for this long.
    pub idle_timeout: Option<Duration>,
    /// Maximum delay between sending our CLOSE frame and hard-dropping the
    /// transport when the peer never answers.
    pub close_timeout: Duration,
    /// When set, `send_*` fails with a backpressure error instead of
    /// queueing once this many payload bytes are waiting for the writer.
    pub max_outbound_queue_bytes: Option<usize>,
    /// Answer inbound PINGs with a PONG echoing the payload.
    pub auto_pong: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_frame_size: Some(16 << 20),
            max_message_size: Some(64 << 20),
            idle_timeout: None,
            close_timeout: Duration::from_secs(5),
            max_outbound_queue_bytes: None,
            auto_pong: true,
        }
    }
}

/// Per-send options accepted by `send_message`.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Split payloads larger than this into a fragmented message, each
    /// fragment carrying at most this many bytes.
    pub fragment_size: Option<usize>,
}
