//! Canonical serialization of wire types.
//!
//! Everything that is hashed or shipped over the wire goes through [Codec]:
//! a deterministic binary layout with fixed-width big-endian integers and
//! `u32`-length-prefixed byte strings. Two implementations that agree on a
//! type's field order produce identical bytes, which is what makes the Merkle
//! commitments in this crate portable.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Errors that can occur when decoding untrusted bytes.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("end of buffer")]
    EndOfBuffer,
    #[error("extra data: {0} bytes remaining")]
    ExtraData(usize),
    #[error("invalid length: {0}")]
    InvalidLength(usize),
    #[error("invalid tag: {0}")]
    InvalidTag(u8),
    #[error("invalid {0}: {1}")]
    Invalid(&'static str, &'static str),
}

/// Returns an error if the buffer does not contain at least `len` more bytes.
#[inline]
pub fn at_least<B: Buf>(buf: &mut B, len: usize) -> Result<(), Error> {
    if buf.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    Ok(())
}

/// Trait for types with a canonical binary encoding.
pub trait Codec: Sized {
    /// Encodes this value to a buffer.
    fn write<B: BufMut>(&self, buf: &mut B);

    /// Returns the encoded length of this value.
    fn len_encoded(&self) -> usize;

    /// Encodes this value to bytes.
    fn encode(&self) -> BytesMut {
        let len = self.len_encoded();
        let mut buffer = BytesMut::with_capacity(len);
        self.write(&mut buffer);
        assert_eq!(buffer.len(), len);
        buffer
    }

    /// Reads a value from a buffer, leaving any trailing bytes in place.
    fn read<B: Buf>(buf: &mut B) -> Result<Self, Error>;

    /// Decodes a value from a buffer.
    ///
    /// Returns an error if decoding fails or if data remains after the value
    /// has been read.
    fn decode<B: Buf>(mut buf: B) -> Result<Self, Error> {
        let result = Self::read(&mut buf)?;
        let remaining = buf.remaining();
        if remaining > 0 {
            return Err(Error::ExtraData(remaining));
        }
        Ok(result)
    }
}

/// Trait for types with a fixed-length encoding.
pub trait SizedCodec: Codec {
    /// The encoded length of this value.
    const LEN_ENCODED: usize;
}

impl Codec for u8 {
    #[inline]
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(*self);
    }

    #[inline]
    fn len_encoded(&self) -> usize {
        Self::LEN_ENCODED
    }

    #[inline]
    fn read<B: Buf>(buf: &mut B) -> Result<Self, Error> {
        at_least(buf, Self::LEN_ENCODED)?;
        Ok(buf.get_u8())
    }
}

impl SizedCodec for u8 {
    const LEN_ENCODED: usize = 1;
}

impl Codec for u32 {
    #[inline]
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(*self);
    }

    #[inline]
    fn len_encoded(&self) -> usize {
        Self::LEN_ENCODED
    }

    #[inline]
    fn read<B: Buf>(buf: &mut B) -> Result<Self, Error> {
        at_least(buf, Self::LEN_ENCODED)?;
        Ok(buf.get_u32())
    }
}

impl SizedCodec for u32 {
    const LEN_ENCODED: usize = 4;
}

impl Codec for u64 {
    #[inline]
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64(*self);
    }

    #[inline]
    fn len_encoded(&self) -> usize {
        Self::LEN_ENCODED
    }

    #[inline]
    fn read<B: Buf>(buf: &mut B) -> Result<Self, Error> {
        at_least(buf, Self::LEN_ENCODED)?;
        Ok(buf.get_u64())
    }
}

impl SizedCodec for u64 {
    const LEN_ENCODED: usize = 8;
}

// Variable-length byte strings carry a u32 length prefix.
impl Codec for Bytes {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(self.len() as u32);
        buf.put_slice(self);
    }

    fn len_encoded(&self) -> usize {
        u32::LEN_ENCODED + self.len()
    }

    fn read<B: Buf>(buf: &mut B) -> Result<Self, Error> {
        let len = u32::read(buf)? as usize;
        at_least(buf, len)?;
        Ok(buf.copy_to_bytes(len))
    }
}
