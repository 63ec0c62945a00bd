//! Wire codecs for the device-management protocol.
//!
//! Three independent layers, leaves first:
//!
//! - [`tlv`]: the binary tag-length-value grammar used for resource payloads.
//! - [`option`]: CoAP-style option values, plus the Block1/Block2 descriptor.
//! - [`message`]: datagram header + options + payload framing.
//!
//! None of these types perform I/O; they only encode/decode byte buffers.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod message;
mod option;
mod tlv;

pub use error::ProtoError;
pub use message::{Code, Message, MessageType, option_as_str, option_as_uint};
pub use option::{BlockOption, CoapOption, OptionValue, content_format, decode_uint, encode_uint, number};
pub use tlv::{IdKind, TlvElement, TlvValue};
