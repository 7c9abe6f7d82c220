use crate::error::Error;
use crate::frame::{Frame, OpCode};
use crate::message::Message;

/// What the aggregator produced for one inbound frame: control frames pass
/// through untouched and in wire order, data frames surface only once a
/// whole message has been reassembled.
#[derive(Debug)]
pub enum Aggregated {
    Message(Message),
    Control(Frame),
}

struct FragmentedMessage {
    opcode: OpCode,
    fragments: Vec<u8>,
    // prefix of `fragments` already known to be valid UTF-8
    utf8_valid_to: usize,
}

/// Reassembles fragmented TEXT/BINARY messages from a stream of parsed
/// frames and enforces the fragmentation rules. TEXT payloads are validated
/// incrementally, so invalid UTF-8 fails as soon as the offending fragment
/// arrives instead of after buffering the whole message.
pub struct MessageAggregator {
    max_message_size: Option<usize>,
    fragmented_message: Option<FragmentedMessage>,
}

impl MessageAggregator {
    pub fn new(max_message_size: Option<usize>) -> Self {
        Self {
            max_message_size,
            fragmented_message: None,
        }
    }

    /// True while a fragmented message is waiting for its final frame.
    pub fn is_aggregating(&self) -> bool {
        self.fragmented_message.is_some()
    }

    /// Drops any partially assembled message, e.g. when the close handshake
    /// interrupts a fragment chain.
    pub fn abandon(&mut self) {
        self.fragmented_message = None;
    }

    pub fn push(&mut self, frame: Frame) -> Result<Option<Aggregated>, Error> {
        if frame.is_control() {
            return Ok(Some(Aggregated::Control(frame)));
        }

        let fin = frame.fin;
        match frame.opcode {
            // A fragmented message starts with a Text or Binary opcode; any
            // data frame arriving while one is open must be a continuation.
            OpCode::Text | OpCode::Binary => {
                if self.fragmented_message.is_some() {
                    return Err(if fin {
                        Error::InvalidFrameFragmentation
                    } else {
                        Error::FragmentedInProgress
                    });
                }
                check_budget(self.max_message_size, 0, frame.payload.len())?;
                let mut fragmented_message = FragmentedMessage {
                    opcode: frame.opcode,
                    fragments: frame.payload,
                    utf8_valid_to: 0,
                };
                fragmented_message.advance_utf8()?;
                self.fragmented_message = Some(fragmented_message);
            }
            OpCode::Continue => {
                let max_message_size = self.max_message_size;
                let fragmented_message = self
                    .fragmented_message
                    .as_mut()
                    .ok_or(Error::InvalidContinuationFrame)?;
                check_budget(
                    max_message_size,
                    fragmented_message.fragments.len(),
                    frame.payload.len(),
                )?;
                fragmented_message.fragments.extend_from_slice(&frame.payload);
                fragmented_message.advance_utf8()?;
            }
            _ => {}
        }

        if fin {
            if let Some(fragmented_message) = self.fragmented_message.take() {
                return Ok(Some(Aggregated::Message(fragmented_message.finish()?)));
            }
        }
        Ok(None)
    }
}

fn check_budget(
    max_message_size: Option<usize>,
    accumulated: usize,
    incoming: usize,
) -> Result<(), Error> {
    if let Some(max) = max_message_size {
        if accumulated + incoming > max {
            return Err(Error::MaxMessageSize);
        }
    }
    Ok(())
}

impl FragmentedMessage {
    /// Validates the not-yet-checked suffix of the buffer. A multi-byte
    /// character cut in half at the buffer's end is fine, it completes with
    /// the next fragment; a hard error is final.
    fn advance_utf8(&mut self) -> Result<(), Error> {
        if self.opcode != OpCode::Text {
            return Ok(());
        }
        match std::str::from_utf8(&self.fragments[self.utf8_valid_to..]) {
            Ok(_) => {
                self.utf8_valid_to = self.fragments.len();
                Ok(())
            }
            Err(e) if e.error_len().is_none() => {
                self.utf8_valid_to += e.valid_up_to();
                Ok(())
            }
            Err(_) => Err(Error::InvalidUtf8),
        }
    }

    fn finish(self) -> Result<Message, Error> {
        match self.opcode {
            OpCode::Text => {
                // a character still split open at the end of the message
                if self.utf8_valid_to != self.fragments.len() {
                    return Err(Error::InvalidUtf8);
                }
                Ok(Message::Text(String::from_utf8(self.fragments)?))
            }
            _ => Ok(Message::Binary(self.fragments)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_all(
        aggregator: &mut MessageAggregator,
        frames: Vec<Frame>,
    ) -> Result<Vec<Aggregated>, Error> {
        let mut out = Vec::new();
        for frame in frames {
            if let Some(emitted) = aggregator.push(frame)? {
                out.push(emitted);
            }
        }
        Ok(out)
    }

    #[test]
    fn test_unfragmented_message_passes_straight_through() {
        let mut aggregator = MessageAggregator::new(None);
        let out = push_all(&mut aggregator, vec![Frame::text(b"Hello".to_vec())]).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Aggregated::Message(Message::Text(t)) if t == "Hello"));
    }

    #[test]
    fn test_fragments_reassemble_in_order() {
        let mut aggregator = MessageAggregator::new(None);
        let out = push_all(
            &mut aggregator,
            vec![
                Frame::new(false, OpCode::Text, b"Hel".to_vec()),
                Frame::continuation(true, b"lo".to_vec()),
            ],
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Aggregated::Message(Message::Text(t)) if t == "Hello"));
        assert!(!aggregator.is_aggregating());
    }

    #[test]
    fn test_control_frames_interleave_without_corruption() {
        let mut aggregator = MessageAggregator::new(None);
        let out = push_all(
            &mut aggregator,
            vec![
                Frame::new(false, OpCode::Binary, vec![1, 2]),
                Frame::ping(b"keepalive".to_vec()),
                Frame::continuation(false, vec![3]),
                Frame::pong(Vec::new()),
                Frame::continuation(true, vec![4, 5]),
            ],
        )
        .unwrap();

        assert_eq!(out.len(), 3);
        assert!(matches!(&out[0], Aggregated::Control(f) if f.opcode == OpCode::Ping));
        assert!(matches!(&out[1], Aggregated::Control(f) if f.opcode == OpCode::Pong));
        assert!(
            matches!(&out[2], Aggregated::Message(Message::Binary(data)) if data == &[1, 2, 3, 4, 5])
        );
    }

    #[test]
    fn test_continuation_without_a_start_is_rejected() {
        let mut aggregator = MessageAggregator::new(None);
        let err = aggregator
            .push(Frame::continuation(true, vec![0]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidContinuationFrame));
    }

    #[test]
    fn test_new_message_mid_fragmentation_is_rejected() {
        let mut aggregator = MessageAggregator::new(None);
        aggregator
            .push(Frame::new(false, OpCode::Text, b"a".to_vec()))
            .unwrap();

        let err = aggregator.push(Frame::text(b"b".to_vec())).unwrap_err();
        assert!(matches!(err, Error::InvalidFrameFragmentation));

        let err = aggregator
            .push(Frame::new(false, OpCode::Binary, b"b".to_vec()))
            .unwrap_err();
        assert!(matches!(err, Error::FragmentedInProgress));
    }

    #[test]
    fn test_utf8_valid_across_fragment_boundary() {
        // é = 0xC3 0xA9, split between two fragments
        let mut aggregator = MessageAggregator::new(None);
        let out = push_all(
            &mut aggregator,
            vec![
                Frame::new(false, OpCode::Text, vec![b'h', 0xC3]),
                Frame::continuation(true, vec![0xA9]),
            ],
        )
        .unwrap();
        assert!(matches!(&out[0], Aggregated::Message(Message::Text(t)) if t == "hé"));
    }

    #[test]
    fn test_invalid_utf8_fails_on_the_offending_fragment() {
        let mut aggregator = MessageAggregator::new(None);
        aggregator
            .push(Frame::new(false, OpCode::Text, b"ok".to_vec()))
            .unwrap();
        // 0xFF can never start a UTF-8 sequence; no need to wait for FIN
        let err = aggregator
            .push(Frame::continuation(false, vec![0xFF]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8));
    }

    #[test]
    fn test_truncated_utf8_at_message_end_is_rejected() {
        let mut aggregator = MessageAggregator::new(None);
        let err = push_all(
            &mut aggregator,
            vec![
                Frame::new(false, OpCode::Text, vec![b'h']),
                Frame::continuation(true, vec![0xC3]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8));
    }

    #[test]
    fn test_max_message_size_counts_across_fragments() {
        let mut aggregator = MessageAggregator::new(Some(4));
        aggregator
            .push(Frame::new(false, OpCode::Binary, vec![0; 3]))
            .unwrap();
        let err = aggregator
            .push(Frame::continuation(true, vec![0; 2]))
            .unwrap_err();
        assert!(matches!(err, Error::MaxMessageSize));
    }

    #[test]
    fn test_abandon_clears_partial_state() {
        let mut aggregator = MessageAggregator::new(None);
        aggregator
            .push(Frame::new(false, OpCode::Text, b"partial".to_vec()))
            .unwrap();
        assert!(aggregator.is_aggregating());
        aggregator.abandon();
        assert!(!aggregator.is_aggregating());

        // a fresh message is accepted afterwards
        let out = aggregator.push(Frame::text(b"next".to_vec())).unwrap();
        assert!(matches!(
            out,
            Some(Aggregated::Message(Message::Text(t))) if t == "next"
        ));
    }
}
