//! Compact weighted threshold-signature certificates.
//!
//! A committee of participants, each holding a signing key and a weight,
//! attests to a message. Once the aggregate weight of collected signatures
//! meets a public threshold, [cert::Builder] produces a short [cert::Certificate]:
//! a commitment to the full signature set plus a pseudo-randomly chosen,
//! weight-biased subset of revealed signatures whose selection is bound to the
//! commitment itself. [cert::Verifier] checks a certificate against the
//! long-lived roster commitment in time proportional to the number of reveals
//! rather than the committee size.
//!
//! # Example
//! ```rust
//! use compact_cert::{cert, dilithium2::Dilithium2, Scheme};
//! use bytes::Bytes;
//!
//! // A committee of three, with a threshold of half the total weight.
//! let signers: Vec<Dilithium2> = (0..3).map(Dilithium2::from_seed).collect();
//! let participants: Vec<cert::Participant> = signers
//!     .iter()
//!     .zip([10u64, 20, 30])
//!     .map(|(signer, weight)| cert::Participant {
//!         pk: signer.public_key(),
//!         weight,
//!     })
//!     .collect();
//! let party_tree = cert::party_tree(&participants);
//! let party_root = party_tree.root().unwrap();
//! let params = cert::Params {
//!     msg: Bytes::from_static(b"hello, world!"),
//!     proven_weight: 30,
//!     sec_kq: 64,
//! };
//!
//! // Everyone signs.
//! let mut builder =
//!     cert::Builder::<Dilithium2>::new(params.clone(), participants, party_tree);
//! for (position, signer) in signers.iter().enumerate() {
//!     builder
//!         .add_signature(position as u64, signer.sign(&params.msg))
//!         .unwrap();
//! }
//!
//! // Build and verify the certificate.
//! let certificate = builder.build().unwrap();
//! let verifier = cert::Verifier::<Dilithium2>::new(params, party_root);
//! assert!(verifier.verify(&certificate).is_ok());
//! ```

use bytes::Bytes;
use rand::{rngs::StdRng, CryptoRng, Rng, SeedableRng};

use crate::codec::Codec;

pub mod bmt;
pub mod cert;
pub mod codec;
pub mod dilithium2;
pub mod keccak256;
pub mod utils;

/// Byte representation of a private key.
pub type PrivateKey = Bytes;

/// Byte representation of a public key.
pub type PublicKey = Bytes;

/// Byte representation of a signature.
pub type Signature = Bytes;

/// A fixed-length digest produced by a [Hasher].
///
/// Digests are cheap to copy and encode without a length prefix (their length
/// is part of the wire contract).
pub trait Digest:
    Codec
    + Copy
    + Clone
    + Eq
    + PartialEq
    + Ord
    + PartialOrd
    + std::hash::Hash
    + std::fmt::Debug
    + AsRef<[u8]>
    + Send
    + Sync
    + 'static
{
    /// Length of the digest in bytes.
    const SIZE: usize;

    /// Generate a random digest.
    ///
    /// # Warning
    ///
    /// This function is typically used for testing and benchmarking and is not
    /// recommended for production use.
    fn random<R: Rng + CryptoRng>(rng: &mut R) -> Self;
}

/// Interface for hashing arbitrary byte strings into a [Digest].
///
/// Implementations are expected to reset themselves after `finalize` so a
/// single hasher can be reused across many inputs.
pub trait Hasher: Default + Clone + Send + Sync + 'static {
    /// Digest generated by the hasher.
    type Digest: Digest;

    /// Create a new, empty hasher.
    fn new() -> Self {
        Self::default()
    }

    /// Append message to previously recorded data.
    fn update(&mut self, message: &[u8]);

    /// Hash all recorded data and reset the hasher to its initial state.
    fn finalize(&mut self) -> Self::Digest;

    /// Reset the hasher without generating a digest.
    fn reset(&mut self);

    /// Hash a single message with a one-time-use hasher.
    fn hash(message: &[u8]) -> Self::Digest {
        let mut hasher = Self::new();
        hasher.update(message);
        hasher.finalize()
    }
}

/// Capability to generate keys, sign messages, and deterministically verify
/// signatures.
///
/// The certificate core treats the signature scheme as opaque: any scheme with
/// fixed-length public keys and deterministic verification can back a
/// committee. One implementation is bundled ([dilithium2::Dilithium2]).
pub trait Scheme: Clone + Send + Sync + 'static {
    /// Generate a fresh signer using the supplied RNG.
    fn new<R: Rng + CryptoRng>(rng: &mut R) -> Self;

    /// Generate a signer from a seed.
    ///
    /// # Warning
    ///
    /// This function is insecure and should only be used for examples and
    /// testing.
    fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new(&mut rng)
    }

    /// Returns the public key of this signer.
    fn public_key(&self) -> PublicKey;

    /// Sign the given message.
    fn sign(&self, message: &[u8]) -> Signature;

    /// Check that a public key is well-formed.
    fn validate(public_key: &PublicKey) -> bool;

    /// Verify that a signature is valid over a given message.
    fn verify(message: &[u8], public_key: &PublicKey, signature: &Signature) -> bool;

    /// Returns the length (in bytes) of public keys and signatures.
    fn len() -> (usize, usize);
}
