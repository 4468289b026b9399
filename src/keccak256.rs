//! Keccak-256 implementation of the [Hasher](crate::Hasher) trait.
//!
//! All commitments and coin derivations in this crate are defined over
//! Keccak-256 of the concatenation of canonically encoded fields.

use crate::{
    codec::{self, Codec, SizedCodec},
    Hasher,
};
use bytes::{Buf, BufMut};
use rand::{CryptoRng, Rng};
use sha3::{Digest as _, Keccak256 as IKeccak256};
use std::ops::Deref;

const DIGEST_LENGTH: usize = 32;

/// Generate a Keccak-256 digest from a message.
pub fn hash(message: &[u8]) -> Digest {
    Keccak256::hash(message)
}

/// Keccak-256 hasher.
#[derive(Debug, Default)]
pub struct Keccak256 {
    hasher: IKeccak256,
}

impl Clone for Keccak256 {
    fn clone(&self) -> Self {
        // We manually implement `Clone` to avoid cloning the hasher state.
        Self::default()
    }
}

impl Hasher for Keccak256 {
    type Digest = Digest;

    fn update(&mut self, message: &[u8]) {
        self.hasher.update(message);
    }

    fn finalize(&mut self) -> Self::Digest {
        let finalized = self.hasher.finalize_reset();
        let array: [u8; DIGEST_LENGTH] = finalized.into();
        Self::Digest::from(array)
    }

    fn reset(&mut self) {
        self.hasher = IKeccak256::new();
    }
}

/// Digest of a Keccak-256 hashing operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
#[repr(transparent)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl crate::Digest for Digest {
    const SIZE: usize = DIGEST_LENGTH;

    fn random<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        let mut digest = [0u8; DIGEST_LENGTH];
        rng.fill_bytes(&mut digest);
        Self(digest)
    }
}

impl Codec for Digest {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.0);
    }

    fn len_encoded(&self) -> usize {
        Self::LEN_ENCODED
    }

    fn read<B: Buf>(buf: &mut B) -> Result<Self, codec::Error> {
        codec::at_least(buf, DIGEST_LENGTH)?;
        let mut digest = [0u8; DIGEST_LENGTH];
        buf.copy_to_slice(&mut digest);
        Ok(Self(digest))
    }
}

impl SizedCodec for Digest {
    const LEN_ENCODED: usize = DIGEST_LENGTH;
}

impl From<[u8; DIGEST_LENGTH]> for Digest {
    fn from(value: [u8; DIGEST_LENGTH]) -> Self {
        Self(value)
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = codec::Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != DIGEST_LENGTH {
            return Err(codec::Error::InvalidLength(value.len()));
        }
        let mut digest = [0u8; DIGEST_LENGTH];
        digest.copy_from_slice(value);
        Ok(Self(digest))
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Digest {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}
