//! Certificate construction.

use crate::{
    bmt,
    cert::{derive_coin, Certificate, Error, Params, Participant, Reveal, SigSlot},
    codec::Codec,
    keccak256::Keccak256,
    Hasher, Scheme, Signature,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    marker::PhantomData,
};

/// Collects signatures over a fixed roster and seals them into a
/// [Certificate].
///
/// The builder is the only owner of the accumulating slot vector and the
/// signature tree state; [Builder::build] consumes it, so a sealed builder
/// cannot accept further signatures.
pub struct Builder<S: Scheme> {
    params: Params,
    participants: Vec<Participant>,
    party_tree: bmt::Tree<Keccak256>,
    slots: Vec<SigSlot>,
    signed_weight: u64,
    total_weight: u64,
    _scheme: PhantomData<S>,
}

impl<S: Scheme> Builder<S> {
    /// Create a builder over a fixed roster and its pre-built tree.
    ///
    /// The roster must be non-empty, match the tree leaf-for-leaf, and carry a
    /// total weight that fits in a `u64`.
    pub fn new(
        params: Params,
        participants: Vec<Participant>,
        party_tree: bmt::Tree<Keccak256>,
    ) -> Self {
        assert!(params.sec_kq > 0, "at least one coin flip is required");
        assert!(!participants.is_empty(), "roster is empty");
        assert!(
            participants.len() <= u32::MAX as usize,
            "roster exceeds u32 positions"
        );
        assert_eq!(
            participants.len() as u32,
            party_tree.len(),
            "roster does not match the party tree"
        );
        let total_weight = participants
            .iter()
            .try_fold(0u64, |sum, participant| sum.checked_add(participant.weight))
            .expect("total roster weight overflows u64");

        let slots = vec![SigSlot::empty(); participants.len()];
        Self {
            params,
            participants,
            party_tree,
            slots,
            signed_weight: 0,
            total_weight,
            _scheme: PhantomData,
        }
    }

    /// Aggregate weight of the signatures collected so far.
    pub fn signed_weight(&self) -> u64 {
        self.signed_weight
    }

    /// Total weight of the roster.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Record `position`'s signature over the message.
    ///
    /// The signature is verified against the participant's public key before
    /// it is accepted; each position can sign at most once.
    pub fn add_signature(&mut self, position: u64, signature: Signature) -> Result<(), Error> {
        let total = self.participants.len() as u32;
        if position >= total as u64 {
            return Err(Error::InvalidPosition(position, total));
        }
        let index = position as usize;
        if self.slots[index].sig.is_some() {
            return Err(Error::DuplicateSignature(position));
        }
        let participant = &self.participants[index];
        if participant.weight == 0 {
            return Err(Error::InvalidWeight(position));
        }
        if !S::verify(&self.params.msg, &participant.pk, &signature) {
            return Err(Error::InvalidSignature(position));
        }

        self.slots[index].sig = Some(signature);
        self.signed_weight += participant.weight;
        Ok(())
    }

    /// Seal the collected signatures into a [Certificate].
    ///
    /// Fails with [Error::InsufficientWeight] if the signed weight has not
    /// reached the proven weight (or nothing was signed at all).
    pub fn build(mut self) -> Result<Certificate, Error> {
        if self.signed_weight < self.params.proven_weight || self.signed_weight == 0 {
            return Err(Error::InsufficientWeight(
                self.signed_weight,
                self.params.proven_weight,
            ));
        }

        // Assign cumulative weights: signing slots tile [0, signed_weight) in
        // position order, non-signers occupy no range.
        let mut running = 0u64;
        let mut cumulative = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.sig.is_some() {
                slot.l = running;
                running += self.participants[index].weight;
                cumulative.push((index as u32, running));
            }
        }
        debug_assert_eq!(running, self.signed_weight);

        // Commit to the slots.
        let mut sig_builder = bmt::Builder::new(self.slots.len());
        for slot in &self.slots {
            sig_builder.add(&Keccak256::hash(&slot.encode()));
        }
        let sig_tree = sig_builder.build();
        let sig_commit = sig_tree.root().expect("roster is non-empty");
        let party_commit = self.party_tree.root().expect("roster is non-empty");

        // Flip the coins. Each lands in a signing slot's weight range; the
        // full trace is recorded, duplicate positions included.
        let coins = self.params.sec_kq;
        let mut reveal_positions = Vec::with_capacity(coins as usize);
        let mut reveal_indices = Vec::with_capacity(coins as usize);
        let mut revealed = BTreeSet::new();
        for index in 0..coins {
            let coin = derive_coin(
                index,
                self.signed_weight,
                self.params.proven_weight,
                &sig_commit,
                &party_commit,
                &self.params.msg,
            );
            let position = find_position(&cumulative, coin);
            reveal_positions.push(position as u64);
            reveal_indices.push(index);
            revealed.insert(position);
        }

        // Extract proofs and reveals for the distinct positions.
        let positions: Vec<u32> = revealed.into_iter().collect();
        let sig_proof = sig_tree.prove(&positions)?;
        let party_proof = self.party_tree.prove(&positions)?;
        let mut reveals = BTreeMap::new();
        for &position in &positions {
            let index = position as usize;
            reveals.insert(
                position as u64,
                Reveal {
                    slot: self.slots[index].clone(),
                    party: self.participants[index].clone(),
                },
            );
        }

        Ok(Certificate {
            sig_commit,
            signed_weight: self.signed_weight,
            total: self.participants.len() as u32,
            reveals,
            sig_proof,
            party_proof,
            reveal_positions,
            reveal_indices,
        })
    }
}

/// Map a coin value to the signing slot whose weight range contains it.
///
/// `cumulative` holds `(position, end)` pairs for signing slots in position
/// order, where `end` is the exclusive end of the slot's range; the final
/// `end` equals the signed weight, so any `coin < signed_weight` has a slot.
fn find_position(cumulative: &[(u32, u64)], coin: u64) -> u32 {
    let index = cumulative.partition_point(|&(_, end)| end <= coin);
    cumulative[index].0
}
