//! Raw asymmetric signatures over an already computed digest.
use crate::keys::{KeyAlgorithm, SigningKeyMaterial, VerifyingKeyMaterial};
use base64ct::{Base64, Encoding};
use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use rsa::Pkcs1v15Sign;
use sha2::Sha256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("{algorithm} signing failed: {message}")]
    Sign {
        algorithm: KeyAlgorithm,
        message: String,
    },
    #[error("signature is not valid base64")]
    InvalidBase64,
}

/// Signature bytes together with the digest they cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitalSignature {
    signature: Vec<u8>,
    digest: Vec<u8>,
}

impl DigitalSignature {
    pub fn signature_bytes(&self) -> &[u8] {
        &self.signature
    }

    pub fn digest_bytes(&self) -> &[u8] {
        &self.digest
    }

    pub fn signature_base64(&self) -> String {
        Base64::encode_string(&self.signature)
    }
}

/// ECDSA signatures are DER `SEQUENCE { r, s }`. RSA signatures are
/// PKCS#1 v1.5 with a SHA-256 DigestInfo wrapped around the given digest,
/// so the digest is never hashed a second time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureEngine;

impl SignatureEngine {
    pub fn sign(
        &self,
        key: &SigningKeyMaterial,
        digest: &[u8],
    ) -> Result<DigitalSignature, SignatureError> {
        let sign_err = |message: String| SignatureError::Sign {
            algorithm: key.algorithm(),
            message,
        };
        let signature = match key {
            SigningKeyMaterial::Secp256k1(key) => {
                let signature: k256::ecdsa::Signature =
                    key.sign_prehash(digest).map_err(|e| sign_err(e.to_string()))?;
                signature.to_der().as_bytes().to_vec()
            }
            SigningKeyMaterial::P256(key) => {
                let signature: p256::ecdsa::Signature =
                    key.sign_prehash(digest).map_err(|e| sign_err(e.to_string()))?;
                signature.to_der().as_bytes().to_vec()
            }
            SigningKeyMaterial::Rsa(key) => key
                .sign(Pkcs1v15Sign::new::<Sha256>(), digest)
                .map_err(|e| sign_err(e.to_string()))?,
        };
        Ok(DigitalSignature {
            signature,
            digest: digest.to_vec(),
        })
    }

    /// `Ok(false)` for a well-formed key whose signature does not match.
    pub fn verify(
        &self,
        key: &VerifyingKeyMaterial,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<bool, SignatureError> {
        let valid = match key {
            VerifyingKeyMaterial::Secp256k1(key) => k256::ecdsa::Signature::from_der(signature)
                .map(|sig| key.verify_prehash(digest, &sig).is_ok())
                .unwrap_or(false),
            VerifyingKeyMaterial::P256(key) => p256::ecdsa::Signature::from_der(signature)
                .map(|sig| key.verify_prehash(digest, &sig).is_ok())
                .unwrap_or(false),
            VerifyingKeyMaterial::Rsa(key) => key
                .verify(Pkcs1v15Sign::new::<Sha256>(), digest, signature)
                .is_ok(),
        };
        Ok(valid)
    }

    pub fn verify_base64(
        &self,
        key: &VerifyingKeyMaterial,
        digest: &[u8],
        signature_b64: &str,
    ) -> Result<bool, SignatureError> {
        let signature =
            Base64::decode_vec(signature_b64).map_err(|_| SignatureError::InvalidBase64)?;
        self.verify(key, digest, &signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Digest;

    fn digest() -> Vec<u8> {
        Sha256::digest(b"<Invoice/>").to_vec()
    }

    #[test]
    fn ec_signatures_verify_for_both_curves() {
        let engine = SignatureEngine;
        for algorithm in [KeyAlgorithm::Secp256k1, KeyAlgorithm::P256] {
            let key = SigningKeyMaterial::generate(algorithm).expect("generate");
            let signed = engine.sign(&key, &digest()).expect("sign");
            assert_eq!(signed.signature_bytes()[0], 0x30, "DER SEQUENCE");
            assert!(engine
                .verify(&key.verifying_key(), &digest(), signed.signature_bytes())
                .expect("verify"));
        }
    }

    #[test]
    fn rsa_signature_verifies() {
        let key = SigningKeyMaterial::generate_rsa(1024).expect("generate");
        let engine = SignatureEngine;
        let signed = engine.sign(&key, &digest()).expect("sign");
        assert_eq!(signed.signature_bytes().len(), 128);
        assert!(engine
            .verify_base64(&key.verifying_key(), &digest(), &signed.signature_base64())
            .expect("verify"));
    }

    #[test]
    fn tampered_digest_fails_verification() {
        let key = SigningKeyMaterial::generate(KeyAlgorithm::Secp256k1).expect("generate");
        let engine = SignatureEngine;
        let signed = engine.sign(&key, &digest()).expect("sign");
        let mut other = digest();
        other[0] ^= 0xFF;
        assert!(!engine
            .verify(&key.verifying_key(), &other, signed.signature_bytes())
            .expect("verify"));
    }
}
