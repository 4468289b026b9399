//! Stateless binary Merkle tree with multi-position inclusion proofs.
//!
//! Leaves are 32-byte digests in caller-defined order. Internal nodes hash the
//! concatenation of their children. When a level has an odd number of nodes,
//! the lonely last node is carried forward unchanged to the next level (it is
//! not hashed with itself); this is part of the wire contract and any verifier
//! must reconstruct roots the same way.
//!
//! A [MultiProof] covers an arbitrary subset of leaf positions with a single
//! ordered sequence of sibling digests: at each level, the sibling of every
//! needed node that is not itself needed, left to right. Proving every leaf
//! yields an empty proof.

use crate::{
    codec::{self, Codec},
    Hasher,
};
use bytes::{Buf, BufMut};
use thiserror::Error;

/// Errors that can occur when proving inclusion.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("tree has no leaves")]
    Empty,
    #[error("no positions to prove")]
    NoPositions,
    #[error("position {0} out of range ({1} leaves)")]
    InvalidPosition(u32, u32),
    #[error("positions must be sorted and unique")]
    UnsortedPositions,
}

/// Combines two digests into their parent digest.
fn combine<H: Hasher>(hasher: &mut H, left: &H::Digest, right: &H::Digest) -> H::Digest {
    hasher.update(left.as_ref());
    hasher.update(right.as_ref());
    hasher.finalize()
}

/// Collects leaf digests for a [Tree].
pub struct Builder<H: Hasher> {
    leaves: Vec<H::Digest>,
}

impl<H: Hasher> Builder<H> {
    /// Create a builder expecting roughly `capacity` leaves.
    pub fn new(capacity: usize) -> Self {
        Self {
            leaves: Vec::with_capacity(capacity),
        }
    }

    /// Append a leaf digest.
    pub fn add(&mut self, digest: &H::Digest) {
        self.leaves.push(*digest);
    }

    /// Build the tree over all added leaves.
    pub fn build(self) -> Tree<H> {
        let mut hasher = H::new();
        let mut levels = Vec::new();
        let mut current = self.leaves;
        while current.len() > 1 {
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                if let [left, right] = pair {
                    next.push(combine(&mut hasher, left, right));
                } else {
                    // Lonely node: carried forward unchanged.
                    next.push(pair[0]);
                }
            }
            levels.push(current);
            current = next;
        }
        levels.push(current);
        Tree { levels }
    }
}

/// A fully-materialized Merkle tree, retaining every level for proving.
pub struct Tree<H: Hasher> {
    /// levels[0] holds the leaves; the last level holds the root alone.
    levels: Vec<Vec<H::Digest>>,
}

impl<H: Hasher> Tree<H> {
    /// Number of leaves in the tree.
    pub fn len(&self) -> u32 {
        self.levels[0].len() as u32
    }

    /// Whether the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    /// The root digest, or `None` for an empty tree.
    ///
    /// A single-leaf tree's root is the leaf digest itself.
    pub fn root(&self) -> Option<H::Digest> {
        self.levels.last().and_then(|level| level.first()).copied()
    }

    /// Produce a [MultiProof] for the given leaf positions.
    ///
    /// Positions must be sorted, unique, and within range.
    pub fn prove(&self, positions: &[u32]) -> Result<MultiProof<H>, Error> {
        if self.is_empty() {
            return Err(Error::Empty);
        }
        if positions.is_empty() {
            return Err(Error::NoPositions);
        }
        if !positions.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(Error::UnsortedPositions);
        }
        let total = self.len();
        let last = positions[positions.len() - 1];
        if last >= total {
            return Err(Error::InvalidPosition(last, total));
        }

        let mut hashes = Vec::new();
        let mut needed = positions.to_vec();
        for level in &self.levels[..self.levels.len() - 1] {
            let width = level.len() as u32;
            let mut next = Vec::with_capacity(needed.len());
            let mut i = 0;
            while i < needed.len() {
                let pos = needed[i];
                if pos % 2 == 0 {
                    if i + 1 < needed.len() && needed[i + 1] == pos + 1 {
                        // Both children are needed; no sibling digest required.
                        i += 2;
                    } else if pos + 1 < width {
                        hashes.push(level[pos as usize + 1]);
                        i += 1;
                    } else {
                        // Lonely node: carried forward, nothing to emit.
                        i += 1;
                    }
                } else {
                    hashes.push(level[pos as usize - 1]);
                    i += 1;
                }
                next.push(pos / 2);
            }
            needed = next;
        }
        Ok(MultiProof { hashes })
    }
}

/// A batched inclusion proof for a subset of leaf positions.
#[derive(Clone, Debug)]
pub struct MultiProof<H: Hasher> {
    /// Sibling digests, level by level from the leaves up, left to right
    /// within each level.
    pub hashes: Vec<H::Digest>,
}

impl<H: Hasher> PartialEq for MultiProof<H> {
    fn eq(&self, other: &Self) -> bool {
        self.hashes == other.hashes
    }
}

impl<H: Hasher> Eq for MultiProof<H> {}

impl<H: Hasher> MultiProof<H> {
    /// Returns true if this proof places every `(position, digest)` item in
    /// the tree of `total` leaves with the given root.
    ///
    /// Items must be sorted by position, unique, and within range. A malformed
    /// proof (missing, leftover, or misplaced digests) returns false.
    pub fn verify(
        &self,
        hasher: &mut H,
        items: &[(u32, H::Digest)],
        total: u32,
        root: &H::Digest,
    ) -> bool {
        if total == 0 || items.is_empty() {
            return false;
        }
        if !items.windows(2).all(|pair| pair[0].0 < pair[1].0) {
            return false;
        }
        if items[items.len() - 1].0 >= total {
            return false;
        }

        let mut current = items.to_vec();
        let mut width = total;
        let mut proof = self.hashes.iter();
        while width > 1 {
            let mut next = Vec::with_capacity(current.len());
            let mut i = 0;
            while i < current.len() {
                let (pos, digest) = current[i];
                if pos % 2 == 0 {
                    if i + 1 < current.len() && current[i + 1].0 == pos + 1 {
                        let (_, right) = current[i + 1];
                        next.push((pos / 2, combine(hasher, &digest, &right)));
                        i += 2;
                    } else if pos + 1 < width {
                        let Some(sibling) = proof.next() else {
                            return false;
                        };
                        next.push((pos / 2, combine(hasher, &digest, sibling)));
                        i += 1;
                    } else {
                        // Lonely node: carried forward unchanged.
                        next.push((pos / 2, digest));
                        i += 1;
                    }
                } else {
                    let Some(sibling) = proof.next() else {
                        return false;
                    };
                    next.push((pos / 2, combine(hasher, sibling, &digest)));
                    i += 1;
                }
            }
            current = next;
            width = width.div_ceil(2);
        }
        proof.next().is_none() && current.len() == 1 && current[0] == (0, *root)
    }
}

impl<H: Hasher> Codec for MultiProof<H> {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(self.hashes.len() as u32);
        for hash in &self.hashes {
            hash.write(buf);
        }
    }

    fn len_encoded(&self) -> usize {
        4 + self.hashes.len() * <H::Digest as crate::Digest>::SIZE
    }

    fn read<B: Buf>(buf: &mut B) -> Result<Self, codec::Error> {
        let count = u32::read(buf)? as usize;
        codec::at_least(buf, count * <H::Digest as crate::Digest>::SIZE)?;
        let mut hashes = Vec::with_capacity(count);
        for _ in 0..count {
            hashes.push(H::Digest::read(buf)?);
        }
        Ok(Self { hashes })
    }
}
