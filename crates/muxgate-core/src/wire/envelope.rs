//! Binary envelope for the compressed codec strategy.
//!
//! Wire format:
//! ```text
//! [flag:1][id:varint][route][body:N]
//! ```
//! - `flag` bit 0: route-compressed; bits 1..3: message kind; bit 4: gzip.
//! - `id`: unsigned LEB128 varint (0 for pushes).
//! - `route`: `u16` big-endian dictionary id when compressed, else a 1-byte
//!   length prefix followed by UTF-8 route bytes.
//! - `body`: all remaining bytes, opaque at this layer.

use thiserror::Error;

/// Route length prefix is a single byte, so literal routes are capped here.
pub const MAX_ROUTE_LEN: usize = 255;

const FLAG_ROUTE_COMPRESSED: u8 = 0x01;
const FLAG_GZIP: u8 = 0x10;
const KIND_SHIFT: u8 = 1;
const KIND_MASK: u8 = 0x07;

/// Errors that can occur during envelope encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    /// The byte slice ended before the field could be read.
    #[error("truncated envelope: need at least {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// The id varint ran past its maximum width.
    #[error("message id varint overflows u32")]
    VarintOverflow,

    /// A literal route exceeds the 1-byte length prefix.
    #[error("route too long: {0} bytes (max {MAX_ROUTE_LEN})")]
    RouteTooLong(usize),

    /// A literal route is not valid UTF-8.
    #[error("route is not valid UTF-8")]
    InvalidRouteUtf8,

    /// The kind bits in the flag byte are not a recognized value.
    #[error("unknown message kind: {0}")]
    UnknownKind(u8),
}

/// Message kind carried in the envelope flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Client-initiated message expecting a response (carries an id).
    Request = 0,
    /// Server reply correlated to a request id.
    Response = 1,
    /// Server-initiated push (id 0).
    Push = 2,
}

impl TryFrom<u8> for MessageKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::Request),
            1 => Ok(MessageKind::Response),
            2 => Ok(MessageKind::Push),
            _ => Err(()),
        }
    }
}

/// A route as it appears on the wire: literal string or dictionary id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRef {
    Literal(String),
    Compressed(u16),
}

/// One decoded wire envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: MessageKind,
    pub id: u32,
    pub route: RouteRef,
    /// Serialized (possibly gzipped) body bytes.
    pub body: Vec<u8>,
    /// Whether `body` is gzip-compressed.
    pub gzipped: bool,
}

impl Envelope {
    /// Encodes the envelope into wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::RouteTooLong`] when a literal route exceeds
    /// [`MAX_ROUTE_LEN`] bytes.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut flag = (self.kind as u8) << KIND_SHIFT;
        if matches!(self.route, RouteRef::Compressed(_)) {
            flag |= FLAG_ROUTE_COMPRESSED;
        }
        if self.gzipped {
            flag |= FLAG_GZIP;
        }

        let mut buf = Vec::with_capacity(1 + 5 + 3 + self.body.len());
        buf.push(flag);
        write_varint(&mut buf, self.id);

        match &self.route {
            RouteRef::Compressed(id) => buf.extend_from_slice(&id.to_be_bytes()),
            RouteRef::Literal(route) => {
                let bytes = route.as_bytes();
                if bytes.len() > MAX_ROUTE_LEN {
                    return Err(WireError::RouteTooLong(bytes.len()));
                }
                buf.push(bytes.len() as u8);
                buf.extend_from_slice(bytes);
            }
        }

        buf.extend_from_slice(&self.body);
        Ok(buf)
    }

    /// Decodes one envelope from `bytes`, consuming the whole slice.
    ///
    /// # Errors
    ///
    /// Returns [`WireError`] when the bytes are malformed.
    pub fn decode(bytes: &[u8]) -> Result<Envelope, WireError> {
        if bytes.is_empty() {
            return Err(WireError::Truncated {
                needed: 1,
                available: 0,
            });
        }

        let flag = bytes[0];
        let kind_bits = (flag >> KIND_SHIFT) & KIND_MASK;
        let kind =
            MessageKind::try_from(kind_bits).map_err(|_| WireError::UnknownKind(kind_bits))?;
        let route_compressed = flag & FLAG_ROUTE_COMPRESSED != 0;
        let gzipped = flag & FLAG_GZIP != 0;

        let (id, mut off) = read_varint(bytes, 1)?;

        let route = if route_compressed {
            require_len(bytes, off + 2)?;
            let id = u16::from_be_bytes([bytes[off], bytes[off + 1]]);
            off += 2;
            RouteRef::Compressed(id)
        } else {
            require_len(bytes, off + 1)?;
            let len = bytes[off] as usize;
            off += 1;
            require_len(bytes, off + len)?;
            let route = std::str::from_utf8(&bytes[off..off + len])
                .map_err(|_| WireError::InvalidRouteUtf8)?
                .to_string();
            off += len;
            RouteRef::Literal(route)
        };

        Ok(Envelope {
            kind,
            id,
            route,
            body: bytes[off..].to_vec(),
            gzipped,
        })
    }
}

// ── Byte helpers ──────────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize) -> Result<(), WireError> {
    if buf.len() < needed {
        Err(WireError::Truncated {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Writes `value` as an unsigned LEB128 varint.
fn write_varint(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Reads an unsigned LEB128 varint starting at `offset`.
/// Returns the value and the offset of the byte after it.
fn read_varint(buf: &[u8], offset: usize) -> Result<(u32, usize), WireError> {
    let mut value: u32 = 0;
    let mut shift = 0;
    let mut off = offset;
    loop {
        require_len(buf, off + 1)?;
        let byte = buf[off];
        off += 1;
        // u32 fits in at most 5 varint bytes
        if shift >= 35 {
            return Err(WireError::VarintOverflow);
        }
        value |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, off));
        }
        shift += 7;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(env: &Envelope) -> Envelope {
        let bytes = env.encode().expect("encode failed");
        Envelope::decode(&bytes).expect("decode failed")
    }

    #[test]
    fn test_push_literal_route_round_trip() {
        let env = Envelope {
            kind: MessageKind::Push,
            id: 0,
            route: RouteRef::Literal("chat.onMessage".to_string()),
            body: b"{\"text\":\"hi\"}".to_vec(),
            gzipped: false,
        };
        assert_eq!(round_trip(&env), env);
    }

    #[test]
    fn test_response_compressed_route_round_trip() {
        let env = Envelope {
            kind: MessageKind::Response,
            id: 42,
            route: RouteRef::Compressed(7),
            body: vec![1, 2, 3],
            gzipped: true,
        };
        assert_eq!(round_trip(&env), env);
    }

    #[test]
    fn test_request_round_trip() {
        let env = Envelope {
            kind: MessageKind::Request,
            id: 1,
            route: RouteRef::Literal("doHandshake".to_string()),
            body: vec![],
            gzipped: false,
        };
        assert_eq!(round_trip(&env), env);
    }

    #[test]
    fn test_large_id_round_trip() {
        let env = Envelope {
            kind: MessageKind::Response,
            id: u32::MAX,
            route: RouteRef::Literal("r".to_string()),
            body: vec![0xFF],
            gzipped: false,
        };
        assert_eq!(round_trip(&env), env);
    }

    #[test]
    fn test_empty_body_round_trip() {
        let env = Envelope {
            kind: MessageKind::Push,
            id: 0,
            route: RouteRef::Literal("onKick".to_string()),
            body: vec![],
            gzipped: false,
        };
        assert_eq!(round_trip(&env), env);
    }

    #[test]
    fn test_flag_bits_layout() {
        let env = Envelope {
            kind: MessageKind::Push,
            id: 0,
            route: RouteRef::Compressed(3),
            body: vec![],
            gzipped: true,
        };
        let bytes = env.encode().unwrap();
        // push (2) << 1 | route-compressed | gzip
        assert_eq!(bytes[0], (2 << 1) | 0x01 | 0x10);
    }

    #[test]
    fn test_route_too_long_rejected() {
        let env = Envelope {
            kind: MessageKind::Push,
            id: 0,
            route: RouteRef::Literal("x".repeat(256)),
            body: vec![],
            gzipped: false,
        };
        assert_eq!(env.encode(), Err(WireError::RouteTooLong(256)));
    }

    #[test]
    fn test_max_length_route_accepted() {
        let env = Envelope {
            kind: MessageKind::Push,
            id: 0,
            route: RouteRef::Literal("x".repeat(255)),
            body: vec![],
            gzipped: false,
        };
        assert_eq!(round_trip(&env), env);
    }

    #[test]
    fn test_decode_empty_is_truncated() {
        assert_eq!(
            Envelope::decode(&[]),
            Err(WireError::Truncated {
                needed: 1,
                available: 0
            })
        );
    }

    #[test]
    fn test_decode_unknown_kind_rejected() {
        // kind bits = 7
        let bytes = [7u8 << 1, 0, 1, b'r'];
        assert_eq!(Envelope::decode(&bytes), Err(WireError::UnknownKind(7)));
    }

    #[test]
    fn test_decode_truncated_route_rejected() {
        // flag: push, literal route; id 0; route length 10 but only 2 bytes follow
        let bytes = [2u8 << 1, 0, 10, b'a', b'b'];
        assert!(matches!(
            Envelope::decode(&bytes),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_invalid_utf8_route_rejected() {
        let bytes = [2u8 << 1, 0, 2, 0xFF, 0xFE];
        assert_eq!(Envelope::decode(&bytes), Err(WireError::InvalidRouteUtf8));
    }

    #[test]
    fn test_varint_overflow_rejected() {
        // six continuation bytes cannot fit in u32
        let bytes = [2u8 << 1, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert_eq!(Envelope::decode(&bytes), Err(WireError::VarintOverflow));
    }
}
