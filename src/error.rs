use crate::close::CloseCode;
use std::io;
use std::str::Utf8Error;
use std::string::FromUtf8Error;
use thiserror::Error;
use tokio::time::error::Elapsed;

#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("IO Error happened: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("event channel closed by the receiver")]
    CommunicationError,

    // Framing errors
    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    #[error("RSV bits set without a negotiated extension")]
    RsvNotZero,

    #[error("control frames must not be fragmented")]
    ControlFramesFragmented,

    #[error("control frame with invalid payload size, can't be greater than 125")]
    ControlFramePayloadSize,

    #[error("payload length is not minimally encoded")]
    NonMinimalLength,

    #[error("frame length exceeds 63 bits")]
    InvalidFrameLength,

    #[error("frames sent by a client must be masked")]
    ExpectedMaskedFrame,

    #[error("frames sent by a server must not be masked")]
    UnexpectedMaskedFrame,

    #[error("max frame size reached")]
    MaxFrameSize,

    // Close frame errors
    #[error("close frame with a one-byte payload")]
    InvalidClosePayload,

    #[error("close code {0} must not appear on the wire")]
    InvalidCloseCode(u16),

    // Fragmentation errors
    #[error("invalid frame while there is a fragmented message in progress")]
    InvalidFrameFragmentation,

    #[error("incoming fragmented message but there is one already in progress")]
    FragmentedInProgress,

    #[error("invalid continuation frame: no fragmented message to continue")]
    InvalidContinuationFrame,

    #[error("max message size reached")]
    MaxMessageSize,

    #[error("invalid UTF-8 in text payload")]
    InvalidUtf8,

    // Send pipeline errors
    #[error("fragment_size `{0}` can't be greater than max_frame_size `{1}`")]
    CustomFragmentSizeExceeded(usize, usize),

    #[error("outbound queue is over its byte budget")]
    Backpressure,

    #[error("send cancelled before reaching the transport")]
    Cancelled,

    #[error("connection closed locally")]
    ClosedLocally,

    #[error("connection closed by peer")]
    ClosedByPeer,
}

impl Error {
    /// The close code this error maps to when it makes the engine initiate
    /// the closing handshake. `None` for errors that never produce a CLOSE
    /// frame of their own (transport failures surface as a synthetic 1006
    /// and are not written to the wire).
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Error::InvalidOpcode(_)
            | Error::RsvNotZero
            | Error::ControlFramesFragmented
            | Error::ControlFramePayloadSize
            | Error::NonMinimalLength
            | Error::InvalidFrameLength
            | Error::ExpectedMaskedFrame
            | Error::UnexpectedMaskedFrame
            | Error::InvalidClosePayload
            | Error::InvalidCloseCode(_)
            | Error::InvalidFrameFragmentation
            | Error::FragmentedInProgress
            | Error::InvalidContinuationFrame => Some(CloseCode::Protocol),
            Error::InvalidUtf8 => Some(CloseCode::InvalidPayload),
            Error::MaxFrameSize | Error::MaxMessageSize => Some(CloseCode::TooBig),
            Error::Timeout { .. } | Error::CommunicationError => Some(CloseCode::GoingAway),
            _ => None,
        }
    }
}

impl From<Utf8Error> for Error {
    fn from(_: Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<FromUtf8Error> for Error {
    fn from(_: FromUtf8Error) -> Self {
        Error::InvalidUtf8
    }
}
