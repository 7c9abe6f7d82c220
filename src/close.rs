use crate::error::Error;

/// A close frame payload carries a two-byte status code, so the UTF-8
/// reason is capped at 125 - 2 bytes.
pub const MAX_REASON_SIZE: usize = 123;

/// RFC 6455 section 7.4 status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000, normal closure.
    Normal,
    /// 1001, endpoint is going away.
    GoingAway,
    /// 1002, protocol error.
    Protocol,
    /// 1003, received data it cannot accept.
    Unsupported,
    /// 1005, no status code was present. Never sent on the wire.
    NoStatus,
    /// 1006, connection dropped without a close frame. Never sent on the wire.
    Abnormal,
    /// 1007, payload inconsistent with the message type (e.g. invalid UTF-8).
    InvalidPayload,
    /// 1008, message violates the endpoint policy.
    Policy,
    /// 1009, message too big to process.
    TooBig,
    /// 1010, client expected the server to negotiate an extension.
    MandatoryExtension,
    /// 1011, server hit an unexpected internal condition.
    Internal,
    /// 1015, TLS handshake failure. Never sent on the wire.
    Tls,
    /// Any other status code, including the registered 1012-1014 range and
    /// the private 3000-4999 range.
    Other(u16),
}

impl CloseCode {
    /// 1005, 1006 and 1015 only exist as synthetic values for observers.
    pub fn is_synthetic(self) -> bool {
        matches!(self, CloseCode::NoStatus | CloseCode::Abnormal | CloseCode::Tls)
    }

    /// Whether this code may legally travel inside a close frame payload,
    /// in either direction.
    pub fn is_allowed_on_wire(self) -> bool {
        matches!(u16::from(self), 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::Protocol,
            1003 => CloseCode::Unsupported,
            1005 => CloseCode::NoStatus,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::Policy,
            1009 => CloseCode::TooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::Internal,
            1015 => CloseCode::Tls,
            other => CloseCode::Other(other),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidPayload => 1007,
            CloseCode::Policy => 1008,
            CloseCode::TooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::Internal => 1011,
            CloseCode::Tls => 1015,
            CloseCode::Other(other) => other,
        }
    }
}

/// The decoded payload of a close frame: a status code plus an optional
/// human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseInfo {
    /// Builds a close payload, truncating the reason to the 123 bytes a
    /// close frame has room for. Truncation keeps the reason valid UTF-8.
    pub fn new(code: CloseCode, reason: &str) -> Self {
        let mut end = reason.len().min(MAX_REASON_SIZE);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        CloseInfo {
            code,
            reason: reason[..end].to_owned(),
        }
    }

    /// Decodes a close frame payload. An empty payload is legal and carries
    /// no status, a one-byte payload is a protocol error, and the reason
    /// bytes must be valid UTF-8.
    pub fn parse(payload: &[u8]) -> Result<Option<Self>, Error> {
        match payload.len() {
            0 => return Ok(None),
            1 => return Err(Error::InvalidClosePayload),
            _ => {}
        }
        let code = u16::from_be_bytes([payload[0], payload[1]]);
        let code = CloseCode::from(code);
        if !code.is_allowed_on_wire() {
            return Err(Error::InvalidCloseCode(code.into()));
        }
        let reason = std::str::from_utf8(&payload[2..])?;
        Ok(Some(CloseInfo {
            code,
            reason: reason.to_owned(),
        }))
    }

    /// Encodes the big-endian status code followed by the reason bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(2 + self.reason.len());
        payload.extend_from_slice(&u16::from(self.code).to_be_bytes());
        payload.extend_from_slice(self.reason.as_bytes());
        payload
    }
}
