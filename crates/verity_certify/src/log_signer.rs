//! Signing and verifying tree heads.

use crate::signature::{PublicKeyBytes, SignatureError, Signer, Verifier};
use tracing::debug;
use verity_log::{DigitallySigned, SignatureAlgorithm, SignedTreeHead};

/// Something that can attach a signature to a tree head
pub trait TreeHeadSigner: Send + Sync {
    /// Sign `sth` in place, populating its signature field.
    ///
    /// # Errors
    ///
    /// Returns error if no signature could be produced
    fn sign_tree_head(&self, sth: &mut SignedTreeHead) -> Result<(), SignatureError>;
}

impl<T: TreeHeadSigner + ?Sized> TreeHeadSigner for std::sync::Arc<T> {
    fn sign_tree_head(&self, sth: &mut SignedTreeHead) -> Result<(), SignatureError> {
        (**self).sign_tree_head(sth)
    }
}

/// Ed25519 tree head signer for a log
#[derive(Debug)]
pub struct LogSigner {
    signer: Signer,
}

impl LogSigner {
    /// Wrap an Ed25519 key
    #[must_use]
    pub fn new(signer: Signer) -> Self {
        Self { signer }
    }

    /// Public key matching this signer
    #[must_use]
    pub fn public_key(&self) -> PublicKeyBytes {
        self.signer.public_key()
    }
}

impl TreeHeadSigner for LogSigner {
    fn sign_tree_head(&self, sth: &mut SignedTreeHead) -> Result<(), SignatureError> {
        let signature = self.signer.sign(&sth.signing_input())?;
        sth.signature = Some(DigitallySigned {
            algorithm: SignatureAlgorithm::Ed25519,
            signature,
        });
        debug!(tree_size = sth.tree_size, timestamp = %sth.timestamp, "signed tree head");
        Ok(())
    }
}

/// Verifies tree heads produced by a [`LogSigner`]
pub struct LogVerifier {
    verifier: Verifier,
}

impl LogVerifier {
    /// Create a verifier for a log's public key
    ///
    /// # Errors
    ///
    /// Returns error if the public key is invalid
    pub fn new(public_key: &PublicKeyBytes) -> Result<Self, SignatureError> {
        Ok(Self {
            verifier: Verifier::new(public_key)?,
        })
    }

    /// Check the tree head's signature over its signing input.
    ///
    /// # Errors
    ///
    /// `Unsigned` if no signature is attached, otherwise any verification failure
    pub fn verify_tree_head(&self, sth: &SignedTreeHead) -> Result<(), SignatureError> {
        let signed = sth.signature.as_ref().ok_or(SignatureError::Unsigned)?;
        match signed.algorithm {
            SignatureAlgorithm::Ed25519 => self
                .verifier
                .verify(&sth.signing_input(), &signed.signature),
        }
    }
}
