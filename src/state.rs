use crate::close::{CloseCode, CloseInfo};

/// Where the connection sits in its lifecycle. `ClosingLocal` means our
/// CLOSE went out first and the peer's answer is pending, `ClosingRemote`
/// means the peer closed first and our echo is on its way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    ClosingLocal,
    ClosingRemote,
    Closed,
}

/// What to do with a CLOSE frame that just arrived.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PeerClose {
    /// Peer closed first: enqueue this echo, the transport closes once it
    /// is flushed.
    Echo(CloseInfo),
    /// Our CLOSE was already sent; the handshake is complete.
    Finished,
    /// Duplicate or post-terminal CLOSE, nothing to do.
    Ignored,
}

/// Tracks the closing handshake: who closed first, which close code the
/// observers should see, and that at most one CLOSE frame is ever sent.
#[derive(Debug)]
pub struct StateMachine {
    phase: Phase,
    close_sent: bool,
    effective: Option<CloseInfo>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            phase: Phase::Open,
            close_sent: false,
            effective: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    /// Data frames are only accepted while fully open; once a CLOSE is
    /// enqueued in either direction, only control frames may follow.
    pub fn can_send_data(&self) -> bool {
        self.phase == Phase::Open && !self.close_sent
    }

    /// A local close was requested, by the application or because a
    /// protocol violation must fail the connection. Returns the CLOSE to
    /// enqueue, or `None` when one is already on its way (close is
    /// idempotent, exactly one CLOSE frame goes out per connection).
    pub(crate) fn request_close(&mut self, info: CloseInfo) -> Option<CloseInfo> {
        if self.phase != Phase::Open || self.close_sent {
            return None;
        }
        self.phase = Phase::ClosingLocal;
        self.close_sent = true;
        self.effective = Some(info.clone());
        Some(info)
    }

    /// The peer's CLOSE frame arrived, carrying a status or not.
    pub(crate) fn peer_close(&mut self, info: Option<CloseInfo>) -> PeerClose {
        match self.phase {
            Phase::Open => {
                self.phase = Phase::ClosingRemote;
                self.close_sent = true;
                // a payload-less CLOSE is reported as 1005 but echoed as a
                // normal closure; neither 1005 nor 1006 goes on the wire
                let echo_code = info.as_ref().map(|i| i.code).unwrap_or(CloseCode::Normal);
                self.effective =
                    Some(info.unwrap_or_else(|| CloseInfo::new(CloseCode::NoStatus, "")));
                PeerClose::Echo(CloseInfo::new(echo_code, ""))
            }
            Phase::ClosingLocal => {
                self.phase = Phase::Closed;
                PeerClose::Finished
            }
            Phase::ClosingRemote | Phase::Closed => PeerClose::Ignored,
        }
    }

    /// Our CLOSE frame reached the transport. Returns true when the
    /// transport should be shut down right away (the peer closed first and
    /// the echo completes the handshake).
    pub(crate) fn close_flushed(&mut self) -> bool {
        if self.phase == Phase::ClosingRemote {
            self.phase = Phase::Closed;
            true
        } else {
            false
        }
    }

    /// The peer never answered our CLOSE within the close timeout.
    pub(crate) fn close_timed_out(&mut self) {
        if self.effective.is_none() {
            self.effective = Some(CloseInfo::new(CloseCode::Abnormal, ""));
        }
        self.phase = Phase::Closed;
    }

    /// The transport reached EOF without a close handshake.
    pub(crate) fn transport_eof(&mut self) {
        if self.effective.is_none() {
            self.effective = Some(CloseInfo::new(CloseCode::Abnormal, ""));
        }
        self.phase = Phase::Closed;
    }

    /// The transport failed outright.
    pub(crate) fn transport_error(&mut self) {
        if self.effective.is_none() {
            self.effective = Some(CloseInfo::new(CloseCode::Abnormal, ""));
        }
        self.phase = Phase::Closed;
    }

    /// The close status observers see once the connection is over. 1006
    /// when the connection died without any handshake.
    pub fn effective_close(&self) -> CloseInfo {
        self.effective
            .clone()
            .unwrap_or_else(|| CloseInfo::new(CloseCode::Abnormal, ""))
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
