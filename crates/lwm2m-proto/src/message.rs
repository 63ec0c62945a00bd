//! Datagram framing: `[Ver|Type|TKL][Code][MID]`, token, options, payload.
//!
//! Options are transmitted in ascending numeric order as deltas from the
//! previous option number, each with a 4-bit delta nibble and a 4-bit
//! length nibble, both extended to 1 or 2 bytes for values that do not fit
//! (the RFC 7252 "13/14 means read an extension byte" convention). The
//! payload, if present, is preceded by a `0xFF` marker.

use bytes::{Buf, BufMut, Bytes};

use crate::{
    error::ProtoError,
    option::{CoapOption, OptionValue, decode_uint},
};

const VERSION: u8 = 1;
const PAYLOAD_MARKER: u8 = 0xFF;
const MAX_TOKEN_LEN: usize = 8;

/// The datagram's delivery semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Requires acknowledgement; retransmitted until acked or exhausted.
    Confirmable,
    /// Fire-and-forget; never retransmitted by this layer.
    NonConfirmable,
    /// Acknowledges a confirmable message (may carry a piggybacked response).
    Acknowledgement,
    /// Rejects a message the receiver could not process.
    Reset,
}

impl MessageType {
    const fn code(self) -> u8 {
        match self {
            Self::Confirmable => 0,
            Self::NonConfirmable => 1,
            Self::Acknowledgement => 2,
            Self::Reset => 3,
        }
    }

    const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }
}

/// A request or response code, packed as `(class << 5) | detail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code(pub u8);

impl Code {
    /// `0.01 GET`
    pub const GET: Self = Self(0x01);
    /// `0.02 POST`
    pub const POST: Self = Self(0x02);
    /// `0.03 PUT`
    pub const PUT: Self = Self(0x03);
    /// `0.04 DELETE`
    pub const DELETE: Self = Self(0x04);

    /// `2.01 Created`
    pub const CREATED: Self = Self(0x41);
    /// `2.02 Deleted`
    pub const DELETED: Self = Self(0x42);
    /// `2.04 Changed`
    pub const CHANGED: Self = Self(0x44);
    /// `2.05 Content`
    pub const CONTENT: Self = Self(0x45);
    /// `2.31 Continue` (block-wise)
    pub const CONTINUE: Self = Self(0x5F);

    /// `4.00 Bad Request`
    pub const BAD_REQUEST: Self = Self(0x80);
    /// `4.01 Unauthorized`
    pub const UNAUTHORIZED: Self = Self(0x81);
    /// `4.03 Forbidden`
    pub const FORBIDDEN: Self = Self(0x83);
    /// `4.04 Not Found`
    pub const NOT_FOUND: Self = Self(0x84);
    /// `4.05 Method Not Allowed`
    pub const METHOD_NOT_ALLOWED: Self = Self(0x85);
    /// `4.13 Request Entity Too Large`
    pub const REQUEST_ENTITY_TOO_LARGE: Self = Self(0x8D);
    /// `4.15 Unsupported Content-Format`
    pub const UNSUPPORTED_CONTENT_FORMAT: Self = Self(0x8F);

    /// `5.00 Internal Server Error`
    pub const INTERNAL_SERVER_ERROR: Self = Self(0xA0);
    /// `5.01 Not Implemented`
    pub const NOT_IMPLEMENTED: Self = Self(0xA1);

    /// The class digit (e.g. `2` in `2.04`).
    pub const fn class(self) -> u8 {
        self.0 >> 5
    }

    /// The detail digits (e.g. `4` in `2.04`).
    pub const fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    /// True for `2.xx` response codes.
    pub const fn is_success(self) -> bool {
        self.class() == 2
    }

    /// True for `4.xx`/`5.xx` response codes.
    pub const fn is_error(self) -> bool {
        self.class() >= 4
    }
}

/// A fully decoded (or to-be-encoded) datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Confirmable/non-confirmable/ack/reset.
    pub msg_type: MessageType,
    /// Request method or response status.
    pub code: Code,
    /// Message id, used for deduplication and ack matching.
    pub mid: u16,
    /// Client-chosen token (0-8 bytes), used for response matching.
    pub token: Bytes,
    /// Options, need not be pre-sorted — [`Message::encode`] sorts them.
    pub options: Vec<CoapOption>,
    /// Application payload, empty if none.
    pub payload: Bytes,
}

impl Message {
    /// Encode this message's header, token, options, and payload into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<(), ProtoError> {
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(ProtoError::InvalidArgument("token must be at most 8 bytes"));
        }

        let header = (VERSION << 6) | (self.msg_type.code() << 4) | self.token.len() as u8;
        dst.put_u8(header);
        dst.put_u8(self.code.0);
        dst.put_u16(self.mid);
        dst.put_slice(&self.token);

        let mut sorted: Vec<&CoapOption> = self.options.iter().collect();
        sorted.sort_by_key(|o| o.number);

        let mut prev_number = 0u16;
        for option in sorted {
            let delta = option.number.checked_sub(prev_number).ok_or(ProtoError::InvalidArgument(
                "options must be encodable as ascending non-negative deltas",
            ))?;
            let value = option.encoded_value();
            encode_option(dst, delta, &value)?;
            prev_number = option.number;
        }

        if !self.payload.is_empty() {
            dst.put_u8(PAYLOAD_MARKER);
            dst.put_slice(&self.payload);
        }

        Ok(())
    }

    /// Decode a message from a full received datagram.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        let mut cursor = Bytes::copy_from_slice(buf);
        if cursor.remaining() < 4 {
            return Err(ProtoError::encoding("datagram shorter than fixed header"));
        }

        let header = cursor.get_u8();
        let version = header >> 6;
        if version != VERSION {
            return Err(ProtoError::encoding("unsupported protocol version"));
        }
        let msg_type = MessageType::from_code((header >> 4) & 0x03);
        let tkl = usize::from(header & 0x0F);
        if tkl > MAX_TOKEN_LEN {
            return Err(ProtoError::encoding("token length exceeds 8 bytes"));
        }

        let code = Code(cursor.get_u8());
        let mid = cursor.get_u16();

        if cursor.remaining() < tkl {
            return Err(ProtoError::encoding("datagram truncated before token"));
        }
        let token = cursor.copy_to_bytes(tkl);

        let mut options = Vec::new();
        let mut prev_number = 0u16;
        while cursor.has_remaining() {
            if cursor[0] == PAYLOAD_MARKER {
                cursor.advance(1);
                break;
            }
            let (delta, value) = decode_option(&mut cursor)?;
            let number = prev_number
                .checked_add(delta)
                .ok_or(ProtoError::encoding("option number overflowed u16"))?;
            options.push(CoapOption { number, value: OptionValue::Opaque(value) });
            prev_number = number;
        }

        let payload = cursor.copy_to_bytes(cursor.remaining());

        Ok(Self { msg_type, code, mid, token, options, payload })
    }
}

fn encode_extended(dst: &mut impl BufMut, value: u16) -> Result<u8, ProtoError> {
    if value < 13 {
        Ok(value as u8)
    } else if value < 269 {
        dst.put_u8((value - 13) as u8);
        Ok(13)
    } else {
        dst.put_u16(value - 269);
        Ok(14)
    }
}

fn encode_option(dst: &mut impl BufMut, delta: u16, value: &Bytes) -> Result<(), ProtoError> {
    if value.len() > u16::MAX as usize {
        return Err(ProtoError::InvalidArgument("option value too large"));
    }
    // Nibbles must be written after their extension bytes are known, so
    // stage them before committing the first byte.
    let mut ext_buf = Vec::new();
    let delta_nibble = encode_extended(&mut ext_buf, delta)?;
    let delta_ext = std::mem::take(&mut ext_buf);
    let length_nibble = encode_extended(&mut ext_buf, value.len() as u16)?;
    let length_ext = ext_buf;

    dst.put_u8((delta_nibble << 4) | length_nibble);
    dst.put_slice(&delta_ext);
    dst.put_slice(&length_ext);
    dst.put_slice(value);
    Ok(())
}

fn decode_extended(cursor: &mut Bytes, nibble: u8) -> Result<u16, ProtoError> {
    match nibble {
        0..=12 => Ok(u16::from(nibble)),
        13 => {
            if !cursor.has_remaining() {
                return Err(ProtoError::encoding("option extension byte truncated"));
            }
            Ok(u16::from(cursor.get_u8()) + 13)
        },
        14 => {
            if cursor.remaining() < 2 {
                return Err(ProtoError::encoding("option extension word truncated"));
            }
            Ok(cursor.get_u16() + 269)
        },
        _ => Err(ProtoError::encoding("option nibble 15 is reserved for the payload marker")),
    }
}

fn decode_option(cursor: &mut Bytes) -> Result<(u16, Bytes), ProtoError> {
    let first = cursor.get_u8();
    let delta_nibble = first >> 4;
    let length_nibble = first & 0x0F;

    let delta = decode_extended(cursor, delta_nibble)?;
    let length = decode_extended(cursor, length_nibble)? as usize;

    if cursor.remaining() < length {
        return Err(ProtoError::encoding("option value truncated"));
    }
    Ok((delta, cursor.copy_to_bytes(length)))
}

/// Interpret a decoded `Opaque` option value as a minimum-width unsigned
/// integer, per the `Content-Format`/`Observe`/`Block*` option formats.
pub fn option_as_uint(option: &CoapOption) -> Result<u32, ProtoError> {
    match &option.value {
        OptionValue::Opaque(b) => decode_uint(b),
        OptionValue::Uint(v) => Ok(*v),
        _ => Err(ProtoError::encoding("expected a uint-formatted option")),
    }
}

/// Interpret a decoded `Opaque` option value as a UTF-8 string, per the
/// `Uri-Path`/`Uri-Query`/`Location-Path` option formats.
pub fn option_as_str(option: &CoapOption) -> Result<&str, ProtoError> {
    match &option.value {
        OptionValue::Opaque(b) => {
            std::str::from_utf8(b).map_err(|_| ProtoError::encoding("option value is not valid UTF-8"))
        },
        OptionValue::Str(s) => Ok(s.as_str()),
        _ => Err(ProtoError::encoding("expected a string-formatted option")),
    }
}

/// Re-encode `encode_uint` results for callers that build options directly
/// (kept alongside decode helpers for symmetry).
#[cfg(test)]
pub(crate) fn uint_option(number: u16, value: u32) -> CoapOption {
    CoapOption::opaque(number, crate::option::encode_uint(value))
}
