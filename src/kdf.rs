//! The mesh key derivation functions `s1` and `k1`.
//!
//! Both are built on AES-CMAC. The engine runs `k1` as a [`K1Derivation`],
//! feeding it one MAC completion at a time, while [`s1`] and [`k1`] compute
//! the same values synchronously.

use alloc::vec::Vec;

use crate::crypto::{aes_cmac, CryptoRequest, KEY_LEN, MAC_LEN};

/// The `P` parameters of `k1` used during provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum K1Label {
    /// "prck", the confirmation key.
    ConfirmationKey,
    /// "prsk", the session key.
    SessionKey,
    /// "prsn", the session nonce.
    SessionNonce,
    /// "prdk", the device key.
    DeviceKey,
}

impl K1Label {
    /// All labels.
    pub const ALL: [K1Label; 4] = [
        K1Label::ConfirmationKey,
        K1Label::SessionKey,
        K1Label::SessionNonce,
        K1Label::DeviceKey,
    ];

    /// Returns the ASCII label.
    pub fn as_bytes(self) -> &'static [u8; 4] {
        match self {
            K1Label::ConfirmationKey => b"prck",
            K1Label::SessionKey => b"prsk",
            K1Label::SessionNonce => b"prsn",
            K1Label::DeviceKey => b"prdk",
        }
    }
}

/// The salt generation function, AES-CMAC under the zero key.
pub fn s1(message: &[u8]) -> [u8; MAC_LEN] {
    aes_cmac(&[0; KEY_LEN], message)
}

/// The key derivation function `k1(N, SALT, P)`.
pub fn k1(n: &[u8], salt: &[u8; MAC_LEN], p: &[u8]) -> [u8; MAC_LEN] {
    let t = aes_cmac(salt, n);
    aes_cmac(&t, p)
}

/// Zeroes the three most significant bytes of a `k1` output, leaving the
/// 13 byte CCM nonce in the remaining ones.
pub fn session_nonce(mut k1_output: [u8; MAC_LEN]) -> [u8; MAC_LEN] {
    k1_output[..3].fill(0);
    k1_output
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum K1Stage {
    /// Waiting for `T = CMAC_SALT(N)`.
    Intermediate,
    /// Waiting for `CMAC_T(P)`.
    Output,
}

/// A `k1` computation in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct K1Derivation {
    label: K1Label,
    stage: K1Stage,
}

/// What to do after a MAC completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum K1Step {
    /// Submit the request, then advance again with its tag.
    Continue(K1Derivation, CryptoRequest),
    /// The derivation is finished.
    Done([u8; MAC_LEN]),
}

impl K1Derivation {
    /// Begins `k1(n, salt, label)`, returning the first MAC request.
    pub fn start(
        n: &[u8],
        salt: &[u8; MAC_LEN],
        label: K1Label,
    ) -> (K1Derivation, CryptoRequest) {
        let derivation = K1Derivation {
            label,
            stage: K1Stage::Intermediate,
        };
        let request = CryptoRequest::Mac {
            key: *salt,
            message: Vec::from(n),
        };

        (derivation, request)
    }

    /// Returns the label being derived.
    pub fn label(&self) -> K1Label {
        self.label
    }

    /// Consumes the tag of the last request.
    pub fn advance(self, tag: [u8; MAC_LEN]) -> K1Step {
        match self.stage {
            K1Stage::Intermediate => {
                let request = CryptoRequest::Mac {
                    key: tag,
                    message: Vec::from(&self.label.as_bytes()[..]),
                };
                let next = K1Derivation {
                    label: self.label,
                    stage: K1Stage::Output,
                };
                K1Step::Continue(next, request)
            }
            K1Stage::Output => K1Step::Done(tag),
        }
    }
}
