use crate::error::Error;
use crate::frame::{Frame, OpCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    // Converts a whole (reassembled) frame into a Message variant
    pub fn from_frame(frame: Frame) -> Result<Self, Error> {
        match frame.opcode {
            OpCode::Text => Ok(Message::Text(String::from_utf8(frame.payload)?)),
            OpCode::Binary => Ok(Message::Binary(frame.payload)),
            other => Err(Error::InvalidOpcode(other.as_u8())),
        }
    }

    pub fn opcode(&self) -> OpCode {
        match self {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
        }
    }

    pub fn as_binary(&self) -> &[u8] {
        match self {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(data) => data,
        }
    }

    pub fn as_text(&self) -> Result<&str, Error> {
        match self {
            Message::Text(text) => Ok(text),
            Message::Binary(data) => Ok(std::str::from_utf8(data)?),
        }
    }

    pub fn len(&self) -> usize {
        self.as_binary().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits the message into wire frames. Payloads above `fragment_size`
    /// become a fragmented message: the first frame carries the data opcode
    /// with FIN clear, the rest are continuations, and only the last frame
    /// sets FIN.
    pub(crate) fn into_frames(self, fragment_size: Option<usize>) -> Vec<Frame> {
        let opcode = self.opcode();
        let payload = match self {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(data) => data,
        };

        let fragment_size = match fragment_size {
            Some(size) if size > 0 && payload.len() > size => size,
            _ => return vec![Frame::new(true, opcode, payload)],
        };

        let mut frames = Vec::new();
        for chunk in payload.chunks(fragment_size) {
            frames.push(Frame::new(
                false,
                if frames.is_empty() {
                    opcode
                } else {
                    OpCode::Continue
                },
                chunk.to_vec(),
            ));
        }

        if let Some(last_frame) = frames.last_mut() {
            last_frame.fin = true;
        }

        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_frame() {
        let message = Message::from_frame(Frame::text(b"hi".to_vec())).unwrap();
        assert_eq!(message, Message::Text("hi".into()));

        let message = Message::from_frame(Frame::binary(vec![1, 2])).unwrap();
        assert_eq!(message, Message::Binary(vec![1, 2]));

        assert!(Message::from_frame(Frame::ping(Vec::new())).is_err());
        assert!(matches!(
            Message::from_frame(Frame::text(vec![0xFF])),
            Err(Error::InvalidUtf8)
        ));
    }

    #[test]
    fn test_small_message_stays_single_frame() {
        let frames = Message::Text("Hello".into()).into_frames(Some(10));
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert_eq!(frames[0].opcode, OpCode::Text);
    }

    #[test]
    fn test_fragmentation_layout() {
        let frames = Message::Binary(vec![0xAA; 10]).into_frames(Some(4));
        assert_eq!(frames.len(), 3);

        assert_eq!(frames[0].opcode, OpCode::Binary);
        assert!(!frames[0].fin);
        assert_eq!(frames[0].payload.len(), 4);

        assert_eq!(frames[1].opcode, OpCode::Continue);
        assert!(!frames[1].fin);

        assert_eq!(frames[2].opcode, OpCode::Continue);
        assert!(frames[2].fin);
        assert_eq!(frames[2].payload.len(), 2);
    }

    #[test]
    fn test_empty_message_yields_one_empty_frame() {
        let frames = Message::Binary(Vec::new()).into_frames(Some(4));
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert!(frames[0].payload.is_empty());
    }
}
