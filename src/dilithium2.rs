//! CRYSTALS-Dilithium2 implementation of the [Scheme](crate::Scheme) trait.
//!
//! Dilithium verification is deterministic and its public keys and signatures
//! are fixed-length, which is all the certificate core requires of a scheme.
//! Signers are reconstructed from a 32-byte seed, so cloning is cheap to
//! reason about even though the underlying keypair is regenerated.

use crate::{PublicKey, Scheme, Signature};
use bytes::Bytes;
use crystals_dilithium::dilithium2::{Keypair, PublicKey as IPublicKey};
use rand::{CryptoRng, Rng};

/// Length of a serialized Dilithium2 public key.
pub const PUBLIC_KEY_LENGTH: usize = 1312;

/// Length of a serialized Dilithium2 signature.
pub const SIGNATURE_LENGTH: usize = 2420;

const SEED_LENGTH: usize = 32;

/// Dilithium2 signer.
pub struct Dilithium2 {
    seed: [u8; SEED_LENGTH],
    keypair: Keypair,
}

impl Clone for Dilithium2 {
    fn clone(&self) -> Self {
        // Key generation is deterministic in the seed.
        Self {
            seed: self.seed,
            keypair: Keypair::generate(Some(&self.seed)),
        }
    }
}

impl Scheme for Dilithium2 {
    fn new<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        let mut seed = [0u8; SEED_LENGTH];
        rng.fill_bytes(&mut seed);
        let keypair = Keypair::generate(Some(&seed));
        Self { seed, keypair }
    }

    fn public_key(&self) -> PublicKey {
        Bytes::copy_from_slice(&self.keypair.public.to_bytes())
    }

    fn sign(&self, message: &[u8]) -> Signature {
        Bytes::copy_from_slice(&self.keypair.sign(message))
    }

    fn validate(public_key: &PublicKey) -> bool {
        public_key.len() == PUBLIC_KEY_LENGTH
    }

    fn verify(message: &[u8], public_key: &PublicKey, signature: &Signature) -> bool {
        let public_key: [u8; PUBLIC_KEY_LENGTH] = match public_key.as_ref().try_into() {
            Ok(key) => key,
            Err(_) => return false,
        };
        let signature: [u8; SIGNATURE_LENGTH] = match signature.as_ref().try_into() {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        let public_key = IPublicKey::from_bytes(&public_key);
        public_key.verify(message, &signature)
    }

    fn len() -> (usize, usize) {
        (PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let signer = Dilithium2::from_seed(7);
        let message = b"attest to this";
        let signature = signer.sign(message);
        assert_eq!(signature.len(), SIGNATURE_LENGTH);
        assert!(Dilithium2::verify(message, &signer.public_key(), &signature));
    }

    #[test]
    fn test_tampered_signature() {
        let signer = Dilithium2::from_seed(7);
        let message = b"attest to this";
        let mut tampered = signer.sign(message).to_vec();
        tampered[0] ^= 0xff;
        assert!(!Dilithium2::verify(
            message,
            &signer.public_key(),
            &Bytes::from(tampered)
        ));
    }

    #[test]
    fn test_malformed_inputs() {
        let signer = Dilithium2::from_seed(7);
        let message = b"attest to this";
        let signature = signer.sign(message);

        // Wrong-length public key and signature are rejected, not panicked on.
        let short_key = Bytes::from_static(&[1u8; 16]);
        assert!(!Dilithium2::verify(message, &short_key, &signature));
        let short_sig = Bytes::from_static(&[1u8; 16]);
        assert!(!Dilithium2::verify(
            message,
            &signer.public_key(),
            &short_sig
        ));
    }

    #[test]
    fn test_clone_signs_identically() {
        let signer = Dilithium2::from_seed(42);
        let clone = signer.clone();
        assert_eq!(signer.public_key(), clone.public_key());
        assert_eq!(signer.sign(b"msg"), clone.sign(b"msg"));
    }
}
