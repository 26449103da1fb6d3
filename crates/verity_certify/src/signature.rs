//! Ed25519 key handling.

use ed25519_dalek::Signature as DalekSignature;
use ed25519_dalek::Signer as DalekSigner;
use ed25519_dalek::SigningKey;
use ed25519_dalek::Verifier as DalekVerifier;
use ed25519_dalek::VerifyingKey;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

/// A signer holding an Ed25519 keypair
pub struct Signer {
    /// The signing key
    signing_key: SigningKey,
    /// The verifying key (derived)
    verifying_key: VerifyingKey,
}

impl Signer {
    /// Create a new signer with a random keypair
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self::from_secret_bytes(&bytes)
    }

    /// Create a signer from a 32-byte secret key
    ///
    /// # Errors
    ///
    /// Returns error if the secret key is not 32 bytes
    pub fn from_secret(secret: &[u8]) -> Result<Self, SignatureError> {
        let bytes: [u8; 32] = secret
            .try_into()
            .map_err(|_| SignatureError::InvalidSecretKey)?;
        Ok(Self::from_secret_bytes(&bytes))
    }

    /// Create a signer from a hex-encoded secret key
    ///
    /// # Errors
    ///
    /// Returns error if the hex is malformed or not 32 bytes
    pub fn from_secret_hex(hex: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(hex.trim()).map_err(|_| SignatureError::InvalidHex)?;
        Self::from_secret(&bytes)
    }

    fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = VerifyingKey::from(&signing_key);
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Hex encoding of the secret key, for key generation output
    #[must_use]
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Get the public key
    #[must_use]
    pub fn public_key(&self) -> PublicKeyBytes {
        PublicKeyBytes(self.verifying_key.to_bytes())
    }

    /// Sign a message
    ///
    /// # Errors
    ///
    /// Returns error if signing fails
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let sig = self
            .signing_key
            .try_sign(message)
            .map_err(|_| SignatureError::SigningFailed)?;
        Ok(sig.to_bytes().to_vec())
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("public_key", &self.public_key().to_hex())
            .finish_non_exhaustive()
    }
}

/// Public key bytes for verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyBytes(pub [u8; 32]);

impl PublicKeyBytes {
    /// Create from bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    ///
    /// # Errors
    ///
    /// Returns error if hex is invalid
    pub fn from_hex(hex: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(hex.trim()).map_err(|_| SignatureError::InvalidHex)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SignatureError::InvalidPublicKey)?;
        Ok(Self(arr))
    }
}

/// A verifier for a single public key
pub struct Verifier {
    /// The public key for verification
    verifying_key: VerifyingKey,
}

impl Verifier {
    /// Create a verifier from a public key
    ///
    /// # Errors
    ///
    /// Returns error if public key is invalid
    pub fn new(public_key: &PublicKeyBytes) -> Result<Self, SignatureError> {
        let verifying_key = VerifyingKey::from_bytes(&public_key.0)
            .map_err(|_| SignatureError::InvalidPublicKey)?;
        Ok(Self { verifying_key })
    }

    /// Verify a signature on a message
    ///
    /// # Errors
    ///
    /// Returns error if the signature is malformed or does not verify
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
        let sig =
            DalekSignature::from_slice(signature).map_err(|_| SignatureError::InvalidSignature)?;
        self.verifying_key
            .verify(message, &sig)
            .map_err(|_| SignatureError::VerificationFailed)
    }
}

/// Signature-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// Invalid secret key
    #[error("invalid secret key")]
    InvalidSecretKey,
    /// Invalid public key
    #[error("invalid public key")]
    InvalidPublicKey,
    /// Invalid signature
    #[error("invalid signature")]
    InvalidSignature,
    /// Invalid hex encoding
    #[error("invalid hex encoding")]
    InvalidHex,
    /// Unsupported signature algorithm
    #[error("unsupported signature algorithm")]
    UnsupportedAlgorithm,
    /// Tree head carries no signature
    #[error("tree head is not signed")]
    Unsigned,
    /// Signing failed
    #[error("signing failed")]
    SigningFailed,
    /// Verification failed
    #[error("signature verification failed")]
    VerificationFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signer_generate() {
        let signer = Signer::generate();
        assert_ne!(signer.public_key().0, [0u8; 32]);
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = Signer::generate();
        let signature = signer.sign(b"test message").unwrap();
        assert_eq!(signature.len(), 64);

        let verifier = Verifier::new(&signer.public_key()).unwrap();
        assert!(verifier.verify(b"test message", &signature).is_ok());
    }

    #[test]
    fn test_verify_fails_with_different_message() {
        let signer = Signer::generate();
        let signature = signer.sign(b"test message").unwrap();

        let verifier = Verifier::new(&signer.public_key()).unwrap();
        assert_eq!(
            verifier.verify(b"different message", &signature),
            Err(SignatureError::VerificationFailed)
        );
    }

    #[test]
    fn test_secret_hex_restores_same_key() {
        let signer = Signer::generate();
        let restored = Signer::from_secret_hex(&signer.secret_hex()).unwrap();
        assert_eq!(signer.public_key(), restored.public_key());
    }

    #[test]
    fn test_from_secret_wrong_length() {
        assert!(matches!(
            Signer::from_secret(&[1u8; 16]),
            Err(SignatureError::InvalidSecretKey)
        ));
        assert!(matches!(
            Signer::from_secret_hex("not hex"),
            Err(SignatureError::InvalidHex)
        ));
    }

    #[test]
    fn test_deterministic_signatures() {
        let signer = Signer::from_secret(&[9u8; 32]).unwrap();
        assert_eq!(signer.sign(b"m").unwrap(), signer.sign(b"m").unwrap());
    }

    #[test]
    fn test_public_key_from_hex_invalid_length() {
        let result = PublicKeyBytes::from_hex("abcd");
        assert!(matches!(result, Err(SignatureError::InvalidPublicKey)));
    }

    #[test]
    fn test_debug_hides_secret() {
        let signer = Signer::from_secret(&[9u8; 32]).unwrap();
        let debug = format!("{:?}", signer);
        assert!(!debug.contains(&signer.secret_hex()));
    }
}
