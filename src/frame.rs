use crate::close::CloseInfo;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continue,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from(byte: u8) -> Result<Self, Error> {
        match byte {
            0x0 => Ok(OpCode::Continue),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(Error::InvalidOpcode(other)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continue => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// One RFC 6455 frame. The payload is always held in decoded form; when
/// `mask` is set the generator applies it on the way out and the parser has
/// already removed it on the way in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload: Vec<u8>,
    /// Decoded close payload of a CLOSE frame, `None` when the payload
    /// carries no status. Kept alongside the raw payload so the bytes are
    /// parsed and validated exactly once.
    pub close_info: Option<CloseInfo>,
}

impl Frame {
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            payload,
            close_info: None,
        }
    }

    pub fn text(payload: Vec<u8>) -> Self {
        Frame::new(true, OpCode::Text, payload)
    }

    pub fn binary(payload: Vec<u8>) -> Self {
        Frame::new(true, OpCode::Binary, payload)
    }

    pub fn continuation(fin: bool, payload: Vec<u8>) -> Self {
        Frame::new(fin, OpCode::Continue, payload)
    }

    pub fn ping(payload: Vec<u8>) -> Self {
        Frame::new(true, OpCode::Ping, payload)
    }

    pub fn pong(payload: Vec<u8>) -> Self {
        Frame::new(true, OpCode::Pong, payload)
    }

    pub fn close(info: Option<&CloseInfo>) -> Self {
        let payload = info.map(CloseInfo::encode).unwrap_or_default();
        let mut frame = Frame::new(true, OpCode::Close, payload);
        frame.close_info = info.cloned();
        frame
    }

    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
