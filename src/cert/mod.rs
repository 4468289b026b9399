//! Compact threshold-signature certificates.
//!
//! A roster of [Participant]s (public key + weight) is committed to once as a
//! Merkle root and published alongside a message and a proven-weight
//! threshold. Signatures are collected by a [Builder]; once their aggregate
//! weight meets the threshold, [Builder::build] commits to the full signature
//! set, derives pseudo-random coins bound to both commitments, and reveals
//! only the coin-selected slots with batched Merkle proofs. [Verifier::verify]
//! replays the coins against the reveals, so soundness rests on the coin
//! binding rather than on seeing every signature.
//!
//! # Wire format
//!
//! A [Certificate] encodes deterministically as:
//!
//! ```text
//! sig_commit (32) || signed_weight (u64) || total (u32)
//! || coins (u32) || coins x (u64 coin index, u64 position)
//! || reveals (u32) || reveals x (u64 position, SigSlot, Participant)
//! || sig_proof || party_proof
//! ```
//!
//! with reveal entries in strictly increasing position order. The roster
//! commitment is not carried; the verifier already holds it.

mod builder;
mod verifier;

pub use builder::Builder;
pub use verifier::Verifier;

use crate::{
    bmt,
    codec::{self, Codec, SizedCodec},
    keccak256::{Digest, Keccak256},
    Hasher, PublicKey, Signature,
};
use bytes::{Buf, BufMut, Bytes};
use std::collections::BTreeMap;
use thiserror::Error;

/// Upper bound on the number of reveals [num_reveals] will recommend.
pub const MAX_REVEALS: u64 = 1024;

/// Errors that can occur when building or verifying certificates.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid position {0} ({1} participants)")]
    InvalidPosition(u64, u32),
    #[error("slot {0} already has a signature")]
    DuplicateSignature(u64),
    #[error("invalid signature for position {0}")]
    InvalidSignature(u64),
    #[error("participant {0} has zero weight")]
    InvalidWeight(u64),
    #[error("signed weight {0} below proven weight {1}")]
    InsufficientWeight(u64, u64),
    #[error("declared signed weight {0} below proven weight {1}")]
    WeightBelowThreshold(u64, u64),
    #[error("reveal {0} is missing a signature")]
    MissingSignature(u64),
    #[error("merkle reconstruction failed for {0}")]
    BadProof(&'static str),
    #[error("coin {0} does not map to its revealed position")]
    CoinMismatch(u64),
    #[error("malformed certificate: {0}")]
    MalformedCertificate(&'static str),
    #[error("{0} reveals exceed the bound {1}")]
    TooManyReveals(u64, u64),
    #[error("merkle tree: {0}")]
    Tree(#[from] bmt::Error),
    #[error("codec: {0}")]
    Codec(#[from] codec::Error),
}

/// Public parameters of one attestation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Params {
    /// The message being attested to.
    pub msg: Bytes,
    /// The minimum signed weight for a certificate to be valid.
    pub proven_weight: u64,
    /// The number of coin flips (and thus reveal-trace entries).
    pub sec_kq: u64,
}

/// A member of the committee: an opaque public key and a positive weight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    /// Scheme-defined public key bytes.
    pub pk: PublicKey,
    /// The participant's voting weight.
    pub weight: u64,
}

impl Codec for Participant {
    fn write<B: BufMut>(&self, buf: &mut B) {
        self.pk.write(buf);
        self.weight.write(buf);
    }

    fn len_encoded(&self) -> usize {
        self.pk.len_encoded() + self.weight.len_encoded()
    }

    fn read<B: Buf>(buf: &mut B) -> Result<Self, codec::Error> {
        let pk = PublicKey::read(buf)?;
        let weight = u64::read(buf)?;
        Ok(Self { pk, weight })
    }
}

const SLOT_ABSENT: u8 = 0x00;
const SLOT_PRESENT: u8 = 0x01;

/// One signature slot, aligned with a participant position.
///
/// `l` is the aggregate weight of signing slots strictly to the left, so every
/// signing slot occupies the half-open range `[l, l + weight)` of the signed
/// weight. Slots without a signature encode as a single tag byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigSlot {
    /// The collected signature, if the participant signed.
    pub sig: Option<Signature>,
    /// Aggregate weight of signing slots before this one.
    pub l: u64,
}

impl SigSlot {
    /// The canonical empty slot.
    pub fn empty() -> Self {
        Self { sig: None, l: 0 }
    }
}

impl Codec for SigSlot {
    fn write<B: BufMut>(&self, buf: &mut B) {
        match &self.sig {
            None => SLOT_ABSENT.write(buf),
            Some(sig) => {
                SLOT_PRESENT.write(buf);
                sig.write(buf);
                self.l.write(buf);
            }
        }
    }

    fn len_encoded(&self) -> usize {
        match &self.sig {
            None => 1,
            Some(sig) => 1 + sig.len_encoded() + self.l.len_encoded(),
        }
    }

    fn read<B: Buf>(buf: &mut B) -> Result<Self, codec::Error> {
        match u8::read(buf)? {
            SLOT_ABSENT => Ok(Self::empty()),
            SLOT_PRESENT => {
                let sig = Signature::read(buf)?;
                let l = u64::read(buf)?;
                Ok(Self { sig: Some(sig), l })
            }
            tag => Err(codec::Error::InvalidTag(tag)),
        }
    }
}

/// A revealed (slot, participant) pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reveal {
    /// The revealed signature slot.
    pub slot: SigSlot,
    /// The participant at the same position.
    pub party: Participant,
}

/// A self-contained attestation that at least `proven_weight` of the roster
/// signed the message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    /// Root of the signature-slot tree.
    pub sig_commit: Digest,
    /// Aggregate weight of all participants that signed.
    pub signed_weight: u64,
    /// Number of participants (leaves in both trees).
    pub total: u32,
    /// Revealed slots, keyed by participant position.
    pub reveals: BTreeMap<u64, Reveal>,
    /// Batched inclusion proof for the revealed slots.
    pub sig_proof: bmt::MultiProof<Keccak256>,
    /// Batched inclusion proof for the revealed participants.
    pub party_proof: bmt::MultiProof<Keccak256>,
    /// The position selected by each coin, in coin order (duplicates kept).
    pub reveal_positions: Vec<u64>,
    /// The coin index behind each entry of `reveal_positions`.
    pub reveal_indices: Vec<u64>,
}

impl Certificate {
    /// Encoded size (in bytes) of the signature and participant proofs.
    pub fn proof_size(&self) -> (usize, usize) {
        (self.sig_proof.len_encoded(), self.party_proof.len_encoded())
    }
}

impl Codec for Certificate {
    fn write<B: BufMut>(&self, buf: &mut B) {
        self.sig_commit.write(buf);
        self.signed_weight.write(buf);
        self.total.write(buf);
        buf.put_u32(self.reveal_indices.len() as u32);
        for (index, position) in self.reveal_indices.iter().zip(&self.reveal_positions) {
            index.write(buf);
            position.write(buf);
        }
        buf.put_u32(self.reveals.len() as u32);
        for (position, reveal) in &self.reveals {
            position.write(buf);
            reveal.slot.write(buf);
            reveal.party.write(buf);
        }
        self.sig_proof.write(buf);
        self.party_proof.write(buf);
    }

    fn len_encoded(&self) -> usize {
        let reveals: usize = self
            .reveals
            .values()
            .map(|reveal| 8 + reveal.slot.len_encoded() + reveal.party.len_encoded())
            .sum();
        Digest::LEN_ENCODED
            + 8
            + 4
            + 4
            + self.reveal_indices.len() * 16
            + 4
            + reveals
            + self.sig_proof.len_encoded()
            + self.party_proof.len_encoded()
    }

    fn read<B: Buf>(buf: &mut B) -> Result<Self, codec::Error> {
        let sig_commit = Digest::read(buf)?;
        let signed_weight = u64::read(buf)?;
        let total = u32::read(buf)?;

        let coins = u32::read(buf)? as usize;
        codec::at_least(buf, coins * 16)?;
        let mut reveal_indices = Vec::with_capacity(coins);
        let mut reveal_positions = Vec::with_capacity(coins);
        for _ in 0..coins {
            reveal_indices.push(u64::read(buf)?);
            reveal_positions.push(u64::read(buf)?);
        }

        let count = u32::read(buf)? as usize;
        let mut reveals = BTreeMap::new();
        let mut last = None;
        for _ in 0..count {
            let position = u64::read(buf)?;
            if last.map_or(false, |previous| previous >= position) {
                return Err(codec::Error::Invalid(
                    "certificate",
                    "reveal positions not strictly increasing",
                ));
            }
            last = Some(position);
            let slot = SigSlot::read(buf)?;
            let party = Participant::read(buf)?;
            reveals.insert(position, Reveal { slot, party });
        }

        let sig_proof = bmt::MultiProof::<Keccak256>::read(buf)?;
        let party_proof = bmt::MultiProof::<Keccak256>::read(buf)?;
        Ok(Self {
            sig_commit,
            signed_weight,
            total,
            reveals,
            sig_proof,
            party_proof,
            reveal_positions,
            reveal_indices,
        })
    }
}

/// Build the roster tree whose root is the long-lived party commitment.
///
/// Leaf `i` is the Keccak-256 digest of `participants[i]`'s canonical
/// encoding.
pub fn party_tree(participants: &[Participant]) -> bmt::Tree<Keccak256> {
    let mut builder = bmt::Builder::new(participants.len());
    for participant in participants {
        builder.add(&Keccak256::hash(&participant.encode()));
    }
    builder.build()
}

/// Derive the `index`-th coin: a pseudo-random value in `[0, signed_weight)`
/// bound to both commitments, the message, and both weight parameters.
///
/// The 32-byte seed is interpreted as a 256-bit big-endian integer and reduced
/// modulo the signed weight, which must be nonzero.
pub(crate) fn derive_coin(
    index: u64,
    signed_weight: u64,
    proven_weight: u64,
    sig_commit: &Digest,
    party_commit: &Digest,
    msg: &[u8],
) -> u64 {
    let mut hasher = Keccak256::new();
    hasher.update(&index.to_le_bytes());
    hasher.update(&signed_weight.to_le_bytes());
    hasher.update(&proven_weight.to_le_bytes());
    hasher.update(sig_commit.as_ref());
    hasher.update(party_commit.as_ref());
    hasher.update(msg);
    let seed = hasher.finalize();

    let modulus = signed_weight as u128;
    let mut acc = 0u128;
    for byte in seed.as_ref() {
        acc = ((acc << 8) | *byte as u128) % modulus;
    }
    acc as u64
}

/// Compute the number of reveals needed for `2^-sec_param` soundness, for use
/// when choosing [Params::sec_kq].
///
/// Finds the smallest `n` with `(signed_weight / proven_weight)^n >=
/// 2^sec_param`, failing if the signed weight is below the proven weight or
/// `n` would exceed [MAX_REVEALS].
pub fn num_reveals(signed_weight: u64, proven_weight: u64, sec_param: u64) -> Result<u64, Error> {
    if signed_weight < proven_weight || signed_weight == 0 {
        return Err(Error::InsufficientWeight(signed_weight, proven_weight));
    }

    let sw = signed_weight as f64;
    let pw = proven_weight as f64;
    let mut n = 0u64;
    let mut lhs = 1.0f64;
    let mut rhs = 2.0f64.powf(sec_param as f64);
    loop {
        if lhs >= rhs {
            return Ok(n);
        }
        if n >= MAX_REVEALS {
            return Err(Error::TooManyReveals(n, MAX_REVEALS));
        }
        lhs *= sw;
        rhs *= pw;
        n += 1;
    }
}
