//! Errors produced by the wire codecs.
//!
//! These map directly onto the CoAP response codes a decoding failure
//! should produce (`lwm2m_core::CoreError` carries the mapping); this crate
//! only needs to distinguish the encoding failure modes themselves.

use thiserror::Error;

/// Failure encoding or decoding a TLV element, option, or datagram.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Caller-supplied argument was out of range (e.g. a length too large
    /// to represent, or a token longer than 8 bytes).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Malformed TLV, option, or datagram header.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(&'static str),

    /// Destination buffer cannot hold the encoded output.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes required to complete the encode.
        needed: usize,
        /// Bytes actually remaining in the destination.
        available: usize,
    },
}

impl ProtoError {
    /// Shorthand for a [`ProtoError::InvalidEncoding`] with a static reason.
    pub(crate) fn encoding(reason: &'static str) -> Self {
        Self::InvalidEncoding(reason)
    }
}
