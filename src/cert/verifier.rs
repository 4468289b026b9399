//! Certificate verification.

use crate::{
    cert::{derive_coin, Certificate, Error, Params, Reveal},
    codec::Codec,
    keccak256::{Digest, Keccak256},
    Hasher, Scheme,
};
use std::{collections::BTreeSet, marker::PhantomData};
use tracing::debug;

/// Checks [Certificate]s against a message, a threshold, and the long-lived
/// roster commitment.
///
/// Verification is pure: it re-derives every coin from the certificate's own
/// commitments, so the work is proportional to the number of reveals rather
/// than the roster size.
pub struct Verifier<S: Scheme> {
    params: Params,
    party_root: Digest,
    _scheme: PhantomData<S>,
}

impl<S: Scheme> Verifier<S> {
    /// Create a verifier for the given parameters and roster commitment.
    ///
    /// The commitment must be the root produced by
    /// [party_tree](crate::cert::party_tree) over the same roster the builder
    /// used.
    pub fn new(params: Params, party_root: Digest) -> Self {
        Self {
            params,
            party_root,
            _scheme: PhantomData,
        }
    }

    /// Check a certificate. Any failure is terminal; there is no partial
    /// acceptance.
    pub fn verify(&self, certificate: &Certificate) -> Result<(), Error> {
        self.check_shape(certificate)?;

        // Weight floor: the declared signed weight must meet the threshold.
        // Coins range over the declared weight, so overstating it leaves coins
        // pointing at slots the prover cannot reveal.
        if certificate.signed_weight < self.params.proven_weight {
            debug!(
                signed_weight = certificate.signed_weight,
                proven_weight = self.params.proven_weight,
                "certificate below weight threshold"
            );
            return Err(Error::WeightBelowThreshold(
                certificate.signed_weight,
                self.params.proven_weight,
            ));
        }

        self.check_reveals(certificate)?;
        self.check_commitments(certificate)?;
        self.check_coins(certificate)
    }

    /// Structural invariants that make the remaining checks well-defined.
    fn check_shape(&self, certificate: &Certificate) -> Result<(), Error> {
        if certificate.total == 0 {
            return Err(Error::MalformedCertificate("empty roster"));
        }
        if certificate.signed_weight == 0 {
            return Err(Error::MalformedCertificate("zero signed weight"));
        }
        if certificate.reveals.is_empty() {
            return Err(Error::MalformedCertificate("no reveals"));
        }
        if certificate.reveal_positions.len() != certificate.reveal_indices.len() {
            return Err(Error::MalformedCertificate(
                "reveal trace length mismatch",
            ));
        }
        if certificate.reveal_positions.len() as u64 != self.params.sec_kq {
            return Err(Error::MalformedCertificate("wrong coin count"));
        }
        // Coins are never skipped, so the recorded indices are exactly 0..K.
        for (expected, &index) in certificate.reveal_indices.iter().enumerate() {
            if index != expected as u64 {
                return Err(Error::MalformedCertificate(
                    "coin indices not sequential",
                ));
            }
        }
        // The reveal map must hold exactly the distinct traced positions.
        let traced: BTreeSet<u64> = certificate.reveal_positions.iter().copied().collect();
        let revealed: BTreeSet<u64> = certificate.reveals.keys().copied().collect();
        if traced != revealed {
            return Err(Error::MalformedCertificate(
                "reveal keys do not match the trace",
            ));
        }
        if let Some(&last) = revealed.iter().next_back() {
            if last >= certificate.total as u64 {
                return Err(Error::MalformedCertificate("reveal position out of range"));
            }
        }
        Ok(())
    }

    /// Per-reveal signature checks and cumulative-weight consistency.
    ///
    /// Non-revealed slots are opaque, so the exactness of each `l` is
    /// enforced by the signature commitment; here the revealed values only
    /// need to form disjoint in-bounds ranges for the coin search below.
    fn check_reveals(&self, certificate: &Certificate) -> Result<(), Error> {
        let mut revealed_weight = 0u64;
        let mut previous_end = 0u64;
        for (&position, Reveal { slot, party }) in &certificate.reveals {
            let Some(signature) = &slot.sig else {
                debug!(position, "revealed slot has no signature");
                return Err(Error::MissingSignature(position));
            };
            if !S::verify(&self.params.msg, &party.pk, signature) {
                debug!(position, "revealed signature is invalid");
                return Err(Error::InvalidSignature(position));
            }

            if slot.l < previous_end {
                return Err(Error::MalformedCertificate(
                    "revealed weight ranges overlap",
                ));
            }
            let end = slot
                .l
                .checked_add(party.weight)
                .ok_or(Error::MalformedCertificate("weight range overflow"))?;
            if end > certificate.signed_weight {
                return Err(Error::MalformedCertificate(
                    "weight range exceeds signed weight",
                ));
            }
            previous_end = end;
            revealed_weight += party.weight;
        }
        // The revealed weight is a byproduct, not the threshold: that check is
        // on the committed signed weight.
        debug!(
            reveals = certificate.reveals.len(),
            revealed_weight, "reveals verified"
        );
        Ok(())
    }

    /// Recompute both Merkle roots from the reveals and their proofs.
    fn check_commitments(&self, certificate: &Certificate) -> Result<(), Error> {
        let mut sig_items = Vec::with_capacity(certificate.reveals.len());
        let mut party_items = Vec::with_capacity(certificate.reveals.len());
        for (&position, Reveal { slot, party }) in &certificate.reveals {
            sig_items.push((position as u32, Keccak256::hash(&slot.encode())));
            party_items.push((position as u32, Keccak256::hash(&party.encode())));
        }

        let mut hasher = Keccak256::new();
        if !certificate.sig_proof.verify(
            &mut hasher,
            &sig_items,
            certificate.total,
            &certificate.sig_commit,
        ) {
            debug!("signature commitment mismatch");
            return Err(Error::BadProof("signature slots"));
        }
        if !certificate.party_proof.verify(
            &mut hasher,
            &party_items,
            certificate.total,
            &self.party_root,
        ) {
            debug!("roster commitment mismatch");
            return Err(Error::BadProof("participants"));
        }
        Ok(())
    }

    /// Re-derive every coin and demand it maps to the traced position.
    fn check_coins(&self, certificate: &Certificate) -> Result<(), Error> {
        // Revealed ranges, in increasing order of `l` (validated above).
        let ranges: Vec<(u64, u64, u64)> = certificate
            .reveals
            .iter()
            .map(|(&position, reveal)| {
                let start = reveal.slot.l;
                (position, start, start + reveal.party.weight)
            })
            .collect();

        for (k, &index) in certificate.reveal_indices.iter().enumerate() {
            let coin = derive_coin(
                index,
                certificate.signed_weight,
                self.params.proven_weight,
                &certificate.sig_commit,
                &self.party_root,
                &self.params.msg,
            );
            let found = ranges.partition_point(|&(_, _, end)| end <= coin);
            let Some(&(position, start, _)) = ranges.get(found) else {
                debug!(index, coin, "coin lands outside the revealed ranges");
                return Err(Error::CoinMismatch(index));
            };
            if coin < start || position != certificate.reveal_positions[k] {
                debug!(index, coin, position, "coin does not match the trace");
                return Err(Error::CoinMismatch(index));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cert::{self, Builder, Params, Participant},
        dilithium2::Dilithium2,
    };
    use bytes::Bytes;

    const MSG: &[u8] = b"certificate verifier test message";

    struct Fixture {
        signers: Vec<Dilithium2>,
        participants: Vec<Participant>,
        params: Params,
        party_root: Digest,
    }

    impl Fixture {
        fn new(weights: &[u64], proven_weight: u64, sec_kq: u64) -> Self {
            let signers: Vec<Dilithium2> = (0..weights.len() as u64)
                .map(Dilithium2::from_seed)
                .collect();
            let participants: Vec<Participant> = signers
                .iter()
                .zip(weights)
                .map(|(signer, &weight)| Participant {
                    pk: signer.public_key(),
                    weight,
                })
                .collect();
            let party_root = cert::party_tree(&participants).root().unwrap();
            let params = Params {
                msg: Bytes::from_static(MSG),
                proven_weight,
                sec_kq,
            };
            Self {
                signers,
                participants,
                params,
                party_root,
            }
        }

        fn builder(&self) -> Builder<Dilithium2> {
            Builder::new(
                self.params.clone(),
                self.participants.clone(),
                cert::party_tree(&self.participants),
            )
        }

        fn sign_all(&self, builder: &mut Builder<Dilithium2>) {
            for (position, signer) in self.signers.iter().enumerate() {
                builder
                    .add_signature(position as u64, signer.sign(&self.params.msg))
                    .unwrap();
            }
        }

        fn verifier(&self) -> Verifier<Dilithium2> {
            Verifier::new(self.params.clone(), self.party_root)
        }

        fn certificate(&self) -> Certificate {
            let mut builder = self.builder();
            self.sign_all(&mut builder);
            builder.build().unwrap()
        }
    }

    fn ten_party_fixture() -> Fixture {
        // W = 550, threshold at half.
        Fixture::new(&[10, 20, 30, 40, 50, 60, 70, 80, 90, 100], 275, 64)
    }

    #[test]
    fn test_roundtrip() {
        let fixture = ten_party_fixture();
        let certificate = fixture.certificate();
        assert_eq!(certificate.signed_weight, 550);
        assert_eq!(certificate.total, 10);
        assert!(fixture.verifier().verify(&certificate).is_ok());
    }

    #[test]
    fn test_wire_roundtrip_then_verify() {
        let fixture = ten_party_fixture();
        let certificate = fixture.certificate();
        let encoded = certificate.encode();
        assert_eq!(encoded.len(), certificate.len_encoded());

        let decoded = Certificate::decode(encoded.freeze()).unwrap();
        assert_eq!(decoded, certificate);
        assert!(fixture.verifier().verify(&decoded).is_ok());
    }

    #[test]
    fn test_partial_signers_roundtrip() {
        // Only the heavy half signs; still above threshold.
        let fixture = ten_party_fixture();
        let mut builder = fixture.builder();
        for position in 5..10u64 {
            builder
                .add_signature(
                    position,
                    fixture.signers[position as usize].sign(&fixture.params.msg),
                )
                .unwrap();
        }
        let certificate = builder.build().unwrap();
        assert_eq!(certificate.signed_weight, 400);
        assert!(fixture.verifier().verify(&certificate).is_ok());
    }

    #[test]
    fn test_light_signers_cannot_build() {
        // The four lightest participants together hold 100 of the 275
        // required weight.
        let fixture = ten_party_fixture();
        let mut builder = fixture.builder();
        for position in 0..4u64 {
            builder
                .add_signature(
                    position,
                    fixture.signers[position as usize].sign(&fixture.params.msg),
                )
                .unwrap();
        }
        assert!(matches!(
            builder.build(),
            Err(Error::InsufficientWeight(100, 275))
        ));
    }

    #[test]
    fn test_declared_weight_below_threshold() {
        let fixture = ten_party_fixture();
        let mut certificate = fixture.certificate();
        certificate.signed_weight = 100;
        let result = fixture.verifier().verify(&certificate);
        assert!(matches!(
            result,
            Err(Error::WeightBelowThreshold(100, 275))
        ));
    }

    #[test]
    fn test_tampered_reveal_signature() {
        let fixture = ten_party_fixture();
        let mut certificate = fixture.certificate();
        let (&position, reveal) = certificate.reveals.iter().next().unwrap();
        let mut sig = reveal.slot.sig.clone().unwrap().to_vec();
        sig[0] ^= 0x01;
        certificate
            .reveals
            .get_mut(&position)
            .unwrap()
            .slot
            .sig = Some(Bytes::from(sig));

        let result = fixture.verifier().verify(&certificate);
        assert!(matches!(result, Err(Error::InvalidSignature(_))));
    }

    #[test]
    fn test_tampered_reveal_public_key() {
        let fixture = ten_party_fixture();
        let mut certificate = fixture.certificate();
        let (&position, reveal) = certificate.reveals.iter().next().unwrap();
        let mut pk = reveal.party.pk.to_vec();
        pk[0] ^= 0x01;
        certificate
            .reveals
            .get_mut(&position)
            .unwrap()
            .party
            .pk = Bytes::from(pk);

        // The signature check sees the bad key first; either way the
        // certificate must not survive.
        let result = fixture.verifier().verify(&certificate);
        assert!(matches!(
            result,
            Err(Error::InvalidSignature(_)) | Err(Error::BadProof(_))
        ));
    }

    #[test]
    fn test_removed_signature() {
        let fixture = ten_party_fixture();
        let mut certificate = fixture.certificate();
        let (&position, _) = certificate.reveals.iter().next().unwrap();
        let reveal = certificate.reveals.get_mut(&position).unwrap();
        reveal.slot.sig = None;
        reveal.slot.l = 0;

        let result = fixture.verifier().verify(&certificate);
        assert!(matches!(result, Err(Error::MissingSignature(_))));
    }

    #[test]
    fn test_tampered_cumulative_weight() {
        let fixture = ten_party_fixture();
        let mut certificate = fixture.certificate();
        // Shift one revealed slot's range without touching the commitment.
        let (&position, _) = certificate.reveals.iter().next_back().unwrap();
        certificate.reveals.get_mut(&position).unwrap().slot.l += 1;

        // The slot encoding contains l, so the commitment no longer matches
        // (unless the shift first collides with a neighboring range).
        let result = fixture.verifier().verify(&certificate);
        assert!(matches!(
            result,
            Err(Error::BadProof(_)) | Err(Error::MalformedCertificate(_))
        ));
    }

    #[test]
    fn test_forged_coin_trace() {
        let fixture = ten_party_fixture();
        let mut certificate = fixture.certificate();

        // Swap two trace entries with different positions, keeping `reveals`
        // untouched.
        let first = certificate.reveal_positions[0];
        let Some(other) = certificate
            .reveal_positions
            .iter()
            .position(|&position| position != first)
        else {
            panic!("all coins landed in one slot");
        };
        certificate.reveal_positions.swap(0, other);

        let result = fixture.verifier().verify(&certificate);
        assert!(matches!(result, Err(Error::CoinMismatch(_))));
    }

    #[test]
    fn test_coin_binding_to_threshold() {
        // Same roster and signatures, different proven weight: every coin
        // moves, so the original trace no longer replays.
        let fixture = ten_party_fixture();
        let certificate = fixture.certificate();

        let mut params = fixture.params.clone();
        params.proven_weight += 1;
        let verifier = Verifier::<Dilithium2>::new(params, fixture.party_root);
        let result = verifier.verify(&certificate);
        assert!(matches!(result, Err(Error::CoinMismatch(_))));
    }

    #[test]
    fn test_wrong_roster_commitment() {
        let fixture = ten_party_fixture();
        let certificate = fixture.certificate();
        let other = Keccak256::hash(b"some other roster");
        let verifier = Verifier::<Dilithium2>::new(fixture.params.clone(), other);
        let result = verifier.verify(&certificate);
        // Party proofs no longer reconstruct (a coin mismatch is also
        // acceptable in principle since the roster root feeds the coins, but
        // the proof check runs first).
        assert!(matches!(result, Err(Error::BadProof("participants"))));
    }

    #[test]
    fn test_malformed_shapes() {
        let fixture = ten_party_fixture();
        let verifier = fixture.verifier();

        // Truncated trace.
        let mut certificate = fixture.certificate();
        certificate.reveal_positions.pop();
        certificate.reveal_indices.pop();
        assert!(matches!(
            verifier.verify(&certificate),
            Err(Error::MalformedCertificate("wrong coin count"))
        ));

        // Length mismatch between the two trace columns.
        let mut certificate = fixture.certificate();
        certificate.reveal_indices.pop();
        assert!(matches!(
            verifier.verify(&certificate),
            Err(Error::MalformedCertificate("reveal trace length mismatch"))
        ));

        // Non-identity coin indices.
        let mut certificate = fixture.certificate();
        certificate.reveal_indices.swap(0, 1);
        assert!(matches!(
            verifier.verify(&certificate),
            Err(Error::MalformedCertificate("coin indices not sequential"))
        ));

        // A revealed slot nothing in the trace points at.
        let mut certificate = fixture.certificate();
        let stray = certificate.reveals.values().next().unwrap().clone();
        certificate.reveals.insert(certificate.total as u64, stray);
        assert!(matches!(
            verifier.verify(&certificate),
            Err(Error::MalformedCertificate(
                "reveal keys do not match the trace"
            ))
        ));

        // A consistent trace and reveal set, but out of roster range.
        let mut certificate = fixture.certificate();
        let (&old, _) = certificate.reveals.iter().next_back().unwrap();
        let moved = certificate.reveals.remove(&old).unwrap();
        let out_of_range = certificate.total as u64;
        certificate.reveals.insert(out_of_range, moved);
        for position in certificate.reveal_positions.iter_mut() {
            if *position == old {
                *position = out_of_range;
            }
        }
        assert!(matches!(
            verifier.verify(&certificate),
            Err(Error::MalformedCertificate("reveal position out of range"))
        ));

        // Zero declared weight.
        let mut certificate = fixture.certificate();
        certificate.signed_weight = 0;
        assert!(matches!(
            verifier.verify(&certificate),
            Err(Error::MalformedCertificate("zero signed weight"))
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let fixture = ten_party_fixture();
        let certificate = fixture.certificate();
        let encoded = certificate.encode().freeze();

        // Truncation fails cleanly.
        let truncated = encoded.slice(0..encoded.len() - 1);
        assert!(Certificate::decode(truncated).is_err());

        // Trailing bytes are rejected.
        let mut extended = encoded.to_vec();
        extended.push(0);
        assert!(Certificate::decode(Bytes::from(extended)).is_err());
    }
}
