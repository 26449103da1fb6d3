//! Tree head signing for VERITY.
//!
//! Provides the Ed25519 key handling and the [`TreeHeadSigner`] seam the
//! tree signer uses to attach signatures to freshly built tree heads.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod log_signer;
pub mod signature;

pub use log_signer::{LogSigner, LogVerifier, TreeHeadSigner};
pub use signature::{PublicKeyBytes, SignatureError, Signer, Verifier};
