//! Tag-Length-Value codec for resource payloads.
//!
//! Each element carries a 1-byte type header: bits 7-6 select the
//! [`IdKind`], bit 5 selects a 1- or 2-byte identifier, and bits 4-3 select
//! how the length is encoded (inline in bits 2-0, or as a trailing 1/2/3
//! byte big-endian integer). Integers are stored in the minimum width
//! among {1, 2, 4} bytes that preserves their sign; only the *length*
//! field itself may use a 3-byte encoding.

use bytes::{BufMut, Bytes};

use crate::error::ProtoError;

const TYPE_BIT_POS: u8 = 6;
const ID_LEN_BIT_POS: u8 = 5;
const LEN_TYPE_BIT_POS: u8 = 3;
const LEN_VAL_MASK: u8 = 0x07;

const LEN_TYPE_3BIT: u8 = 0;
const LEN_TYPE_8BIT: u8 = 1;
const LEN_TYPE_16BIT: u8 = 2;
const LEN_TYPE_24BIT: u8 = 3;

/// What an element's identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// A top-level Object Instance within an Object payload.
    ObjectInstance,
    /// One value inside a multi-instance resource.
    ResourceInstance,
    /// A multi-instance resource, wrapping [`IdKind::ResourceInstance`] children.
    MultiResource,
    /// A single-instance resource carrying a scalar or opaque value.
    ResourceValue,
}

impl IdKind {
    const fn code(self) -> u8 {
        match self {
            Self::ObjectInstance => 0,
            Self::ResourceInstance => 1,
            Self::MultiResource => 2,
            Self::ResourceValue => 3,
        }
    }

    const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::ObjectInstance,
            1 => Self::ResourceInstance,
            2 => Self::MultiResource,
            _ => Self::ResourceValue,
        }
    }
}

/// The payload carried by a TLV element: either a flat value or nested
/// children (used by [`IdKind::ObjectInstance`] and [`IdKind::MultiResource`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlvValue {
    /// Raw scalar/string/opaque bytes.
    Bytes(Bytes),
    /// Nested elements, encoded back-to-back inside this element's length.
    Children(Vec<TlvElement>),
}

/// A single decoded (or to-be-encoded) TLV element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvElement {
    /// What kind of identifier `id` is.
    pub kind: IdKind,
    /// The object-instance, resource, or resource-instance id.
    pub id: u16,
    /// The element's payload.
    pub value: TlvValue,
}

impl TlvElement {
    /// A resource carrying a raw byte string (used for `string`/`opaque`).
    pub fn bytes(id: u16, bytes: impl Into<Bytes>) -> Self {
        Self { kind: IdKind::ResourceValue, id, value: TlvValue::Bytes(bytes.into()) }
    }

    /// A resource carrying a signed integer, minimum-width encoded.
    pub fn integer(id: u16, value: i32) -> Self {
        Self::bytes(id, Bytes::from(encode_int32(value).to_vec()))
    }

    /// A resource carrying an unsigned 16-bit value, encoded on the int32
    /// path (LwM2M TLV has no dedicated unsigned integer width).
    pub fn uint16(id: u16, value: u16) -> Self {
        Self::integer(id, i32::from(value))
    }

    /// A resource carrying a boolean as a single `0`/`1` byte.
    pub fn boolean(id: u16, value: bool) -> Self {
        Self::bytes(id, Bytes::from(vec![u8::from(value)]))
    }

    /// A multi-instance resource, wrapping each `(id, bytes)` pair as a
    /// resource-instance child.
    pub fn list(id: u16, items: impl IntoIterator<Item = (u16, Bytes)>) -> Self {
        let children = items
            .into_iter()
            .map(|(item_id, bytes)| TlvElement {
                kind: IdKind::ResourceInstance,
                id: item_id,
                value: TlvValue::Bytes(bytes),
            })
            .collect();
        Self { kind: IdKind::MultiResource, id, value: TlvValue::Children(children) }
    }

    /// An object instance, wrapping its resources.
    pub fn instance(id: u16, resources: Vec<TlvElement>) -> Self {
        Self { kind: IdKind::ObjectInstance, id, value: TlvValue::Children(resources) }
    }

    /// Length of this element's value, excluding its own header.
    fn value_len(&self) -> usize {
        match &self.value {
            TlvValue::Bytes(b) => b.len(),
            TlvValue::Children(children) => children.iter().map(TlvElement::encoded_len).sum(),
        }
    }

    /// Total encoded size of this element including its header. Usable as
    /// a dry run before calling [`TlvElement::encode`].
    pub fn encoded_len(&self) -> usize {
        header_len(self.id, self.value_len()) + self.value_len()
    }

    /// Encode this element (header, then value or children) into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<(), ProtoError> {
        let value_len = self.value_len();
        encode_header(dst, self.kind, self.id, value_len)?;
        match &self.value {
            TlvValue::Bytes(b) => {
                check_capacity(dst, b.len())?;
                dst.put_slice(b);
            },
            TlvValue::Children(children) => {
                for child in children {
                    child.encode(dst)?;
                }
            },
        }
        Ok(())
    }

    /// Decode a single element from the front of `buf`, consuming the bytes
    /// it occupies (header + value).
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtoError> {
        let (kind, id, length) = decode_header(buf)?;
        if length > buf.len() {
            return Err(ProtoError::encoding("TLV length exceeds remaining buffer"));
        }
        let mut value_buf = buf.split_to(length);

        let value = match kind {
            IdKind::ObjectInstance | IdKind::MultiResource => {
                let mut children = Vec::new();
                while !value_buf.is_empty() {
                    children.push(TlvElement::decode(&mut value_buf)?);
                }
                TlvValue::Children(children)
            },
            IdKind::ResourceInstance | IdKind::ResourceValue => TlvValue::Bytes(value_buf),
        };

        Ok(Self { kind, id, value })
    }

    /// Interpret this element's value as a signed integer (1/2/4 bytes).
    pub fn as_integer(&self) -> Result<i32, ProtoError> {
        match &self.value {
            TlvValue::Bytes(b) => decode_int32(b),
            TlvValue::Children(_) => Err(ProtoError::encoding("expected scalar value, found container")),
        }
    }

    /// Interpret this element's value as a boolean (`0` or `1`).
    pub fn as_boolean(&self) -> Result<bool, ProtoError> {
        match &self.value {
            TlvValue::Bytes(b) if b.len() == 1 => Ok(b[0] != 0),
            _ => Err(ProtoError::encoding("expected a single boolean byte")),
        }
    }

    /// Borrow this element's raw value bytes (string/opaque resources).
    pub fn as_bytes(&self) -> Result<&Bytes, ProtoError> {
        match &self.value {
            TlvValue::Bytes(b) => Ok(b),
            TlvValue::Children(_) => Err(ProtoError::encoding("expected scalar value, found container")),
        }
    }

    /// Borrow this element's children (object instance / multi-resource).
    pub fn as_children(&self) -> Result<&[TlvElement], ProtoError> {
        match &self.value {
            TlvValue::Children(c) => Ok(c),
            TlvValue::Bytes(_) => Err(ProtoError::encoding("expected container, found scalar value")),
        }
    }
}

fn header_len(id: u16, length: usize) -> usize {
    let id_len = if id > u16::from(u8::MAX) { 2 } else { 1 };
    let length_len = if length <= LEN_VAL_MASK as usize { 0 } else { uint_min_width(length as u32) };
    usize::from(1 + id_len + length_len)
}

fn check_capacity(dst: &impl BufMut, needed: usize) -> Result<(), ProtoError> {
    if dst.remaining_mut() < needed {
        return Err(ProtoError::BufferTooSmall { needed, available: dst.remaining_mut() });
    }
    Ok(())
}

fn encode_header(dst: &mut impl BufMut, kind: IdKind, id: u16, length: usize) -> Result<(), ProtoError> {
    let id_len = if id > u16::from(u8::MAX) { 2u8 } else { 1 };

    let (length_type, length_bytes): (u8, Vec<u8>) = if length <= LEN_VAL_MASK as usize {
        (LEN_TYPE_3BIT, Vec::new())
    } else {
        let width = uint_min_width(length as u32);
        if width > 3 {
            return Err(ProtoError::InvalidArgument("TLV length exceeds 24-bit range"));
        }
        let encoded = encode_uint32(length as u32, width);
        let length_type = match width {
            1 => LEN_TYPE_8BIT,
            2 => LEN_TYPE_16BIT,
            _ => LEN_TYPE_24BIT,
        };
        (length_type, encoded)
    };

    let needed = 1 + usize::from(id_len) + length_bytes.len();
    check_capacity(dst, needed)?;

    let mut type_byte = kind.code() << TYPE_BIT_POS;
    type_byte |= u8::from(id_len == 2) << ID_LEN_BIT_POS;
    type_byte |= length_type << LEN_TYPE_BIT_POS;
    if length_type == LEN_TYPE_3BIT {
        type_byte |= (length as u8) & LEN_VAL_MASK;
    }
    dst.put_u8(type_byte);

    if id_len == 2 {
        dst.put_u16(id);
    } else {
        dst.put_u8(id as u8);
    }

    dst.put_slice(&length_bytes);
    Ok(())
}

fn decode_header(buf: &mut Bytes) -> Result<(IdKind, u16, usize), ProtoError> {
    if buf.is_empty() {
        return Err(ProtoError::encoding("TLV header truncated"));
    }
    let type_byte = buf[0];
    let kind = IdKind::from_code((type_byte >> TYPE_BIT_POS) & 0x03);
    let id_len = if (type_byte >> ID_LEN_BIT_POS) & 0x01 != 0 { 2usize } else { 1 };
    let length_type = (type_byte >> LEN_TYPE_BIT_POS) & 0x03;
    let inline_length = type_byte & LEN_VAL_MASK;

    if buf.len() < 1 + id_len {
        return Err(ProtoError::encoding("TLV header truncated"));
    }
    let _ = buf.split_to(1);

    let id = if id_len == 2 {
        let bytes = buf.split_to(2);
        u16::from_be_bytes([bytes[0], bytes[1]])
    } else {
        let bytes = buf.split_to(1);
        u16::from(bytes[0])
    };

    let length = if length_type == LEN_TYPE_3BIT {
        usize::from(inline_length)
    } else {
        let width = usize::from(length_type) + 1;
        if buf.len() < width {
            return Err(ProtoError::encoding("TLV length field truncated"));
        }
        let bytes = buf.split_to(width);
        decode_uint32(&bytes)? as usize
    };

    Ok((kind, id, length))
}

/// Minimum byte width (1, 2, or 4) that preserves the sign of `value`.
fn int_min_width(value: i32) -> u8 {
    if (i32::from(i8::MIN)..=i32::from(i8::MAX)).contains(&value) {
        1
    } else if (i32::from(i16::MIN)..=i32::from(i16::MAX)).contains(&value) {
        2
    } else {
        4
    }
}

/// Minimum unsigned byte width (1, 2, 3, or 4) that fits `value`; used only
/// for TLV length fields, which may legally be 3 bytes wide.
fn uint_min_width(value: u32) -> u8 {
    if value <= u32::from(u8::MAX) {
        1
    } else if value <= u32::from(u16::MAX) {
        2
    } else if value <= 0x00FF_FFFF {
        3
    } else {
        4
    }
}

fn encode_int32(value: i32) -> Vec<u8> {
    match int_min_width(value) {
        1 => vec![value as u8],
        2 => (value as i16).to_be_bytes().to_vec(),
        _ => value.to_be_bytes().to_vec(),
    }
}

fn encode_uint32(value: u32, width: u8) -> Vec<u8> {
    value.to_be_bytes()[4 - usize::from(width)..].to_vec()
}

fn decode_int32(buf: &[u8]) -> Result<i32, ProtoError> {
    match buf.len() {
        0 => Ok(0),
        1 => Ok(i32::from(buf[0] as i8)),
        2 => Ok(i32::from(i16::from_be_bytes([buf[0], buf[1]]))),
        4 => Ok(i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])),
        _ => Err(ProtoError::encoding("integer value must be 0, 1, 2, or 4 bytes")),
    }
}

fn decode_uint32(buf: &[u8]) -> Result<u32, ProtoError> {
    match buf.len() {
        0 => Ok(0),
        1 => Ok(u32::from(buf[0])),
        2 => Ok(u32::from(u16::from_be_bytes([buf[0], buf[1]]))),
        3 => Ok((u32::from(buf[0]) << 16) | (u32::from(buf[1]) << 8) | u32::from(buf[2])),
        4 => Ok(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])),
        _ => Err(ProtoError::encoding("length value must be 0-4 bytes")),
    }
}
