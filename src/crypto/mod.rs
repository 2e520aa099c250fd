//! The asynchronous cryptography the engine depends on.
//!
//! The engine never calls a primitive directly. It hands out
//! [`CryptoRequest`]s tagged with a [`CryptoTicket`], and a
//! [`CryptoProvider`] answers each one with a [`CryptoCompletion`] some time
//! later. This allows hardware accelerators that complete in an interrupt.

use alloc::vec::Vec;
use thiserror::Error;

mod software;

pub use software::{
    aes_cmac, ccm_decrypt, ccm_encrypt, ecdh, public_key_bytes,
    SoftwareCrypto,
};

/// Length of AES-128 keys.
pub const KEY_LEN: usize = 16;
/// Length of the AES-CMAC output.
pub const MAC_LEN: usize = 16;
/// Length of the AES-CCM nonce.
pub const NONCE_LEN: usize = 13;
/// Length of the AES-CCM message integrity check.
pub const MIC_LEN: usize = 8;
/// Length of an uncompressed P-256 public key without the SEC1 tag.
pub const PUBLIC_KEY_LEN: usize = 64;
/// Length of the ECDH shared secret.
pub const DHKEY_LEN: usize = 32;

/// Identifies the session generation a request was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CryptoTicket(u64);

impl CryptoTicket {
    pub(crate) fn new(generation: u64) -> CryptoTicket {
        CryptoTicket(generation)
    }

    /// Returns the generation of the session that issued the request.
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// A cryptographic operation requested by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoRequest {
    /// Generate a fresh P-256 key pair, keeping the private key.
    GenerateKeyPair,
    /// Compute the ECDH shared secret with the last generated key pair.
    SharedSecret {
        /// The peer's public key, X followed by Y.
        remote_public: [u8; PUBLIC_KEY_LEN],
    },
    /// AES-CMAC of `message` under `key`.
    Mac {
        /// The CMAC key.
        key: [u8; KEY_LEN],
        /// The message to authenticate.
        message: Vec<u8>,
    },
    /// AES-CMAC of `message` under the all-zero key.
    MacZeroKey {
        /// The message to authenticate.
        message: Vec<u8>,
    },
    /// AES-CCM authenticated decryption with an 8 byte MIC.
    AuthDecrypt {
        /// The session key.
        key: [u8; KEY_LEN],
        /// The session nonce.
        nonce: [u8; NONCE_LEN],
        /// Ciphertext followed by the MIC.
        ciphertext: Vec<u8>,
    },
    /// `len` bytes from a cryptographically secure source.
    RandomBytes {
        /// The number of bytes.
        len: usize,
    },
}

/// The result of a successful [`CryptoRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoResponse {
    /// The public key of the generated pair.
    KeyPair {
        /// The public key, X followed by Y.
        public: [u8; PUBLIC_KEY_LEN],
    },
    /// The X coordinate of the shared point.
    SharedSecret([u8; DHKEY_LEN]),
    /// A CMAC tag.
    Mac([u8; MAC_LEN]),
    /// The decrypted and authenticated plaintext.
    Plaintext(Vec<u8>),
    /// Random bytes.
    Random(Vec<u8>),
}

/// The answer to a request, carrying the ticket it was issued with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoCompletion {
    /// The ticket of the request.
    pub ticket: CryptoTicket,
    /// The outcome.
    pub result: Result<CryptoResponse, CryptoError>,
}

/// The error type for the `crypto` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// A request is already in flight.
    #[error("a crypto request is already outstanding")]
    Busy,
    /// The shared secret was requested before generating a key pair.
    #[error("no key pair has been generated")]
    NoKeyPair,
    /// The peer's public key isn't a point on the curve.
    #[error("invalid public key")]
    InvalidPublicKey,
    /// The MIC doesn't match the ciphertext.
    #[error("authentication failed")]
    AuthenticationFailed,
    /// The random number generator failed.
    #[error("random source failure")]
    RandomSource,
    /// The response doesn't belong to the pending request.
    #[error("unexpected response, expected {0}")]
    UnexpectedResponse(&'static str),
}

impl From<ccm::aead::Error> for CryptoError {
    fn from(_: ccm::aead::Error) -> CryptoError {
        CryptoError::AuthenticationFailed
    }
}

impl From<p256::elliptic_curve::Error> for CryptoError {
    fn from(_: p256::elliptic_curve::Error) -> CryptoError {
        CryptoError::InvalidPublicKey
    }
}

impl From<rand_core::Error> for CryptoError {
    fn from(_: rand_core::Error) -> CryptoError {
        CryptoError::RandomSource
    }
}

/// An asynchronous provider of the primitives.
///
/// At most one request is outstanding at any time. `submit` rejects a second
/// one with [`CryptoError::Busy`] until the first has been polled or
/// cancelled.
pub trait CryptoProvider {
    /// Starts working on `request`.
    fn submit(
        &mut self,
        ticket: CryptoTicket,
        request: CryptoRequest,
    ) -> Result<(), CryptoError>;

    /// Returns the completion of the outstanding request, once it's done.
    fn poll_completion(&mut self) -> Option<CryptoCompletion>;

    /// Abandons the outstanding request, if any.
    ///
    /// Afterwards `submit` accepts a new request, and the abandoned one is
    /// never returned by `poll_completion`. A provider that can't stop its
    /// hardware has to drop the result once it arrives.
    fn cancel(&mut self);
}
