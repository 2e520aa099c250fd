//! The errors of the crate.

use thiserror::Error;

use crate::{
    confirmation::AccumulatorError,
    crypto::CryptoError,
    engine::ProvisioningState,
    pdu::{ErrorCode, PduError, PduType},
};

/// The catch-all error type for a provisioning session, mostly wrapping the
/// errors of the individual modules.
///
/// Every variant aborts the session. Except for [`PeerFailed`], the engine
/// reports it to the provisioner with a `Failed` PDU carrying
/// [`error_code`](ProvisioningError::error_code).
///
/// [`PeerFailed`]: ProvisioningError::PeerFailed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisioningError {
    /// The PDU couldn't be decoded, most likely because of its length.
    #[error("malformed PDU: {0}")]
    MalformedPdu(#[from] PduError),
    /// A well-formed PDU arrived in a state that doesn't accept it.
    #[error("unexpected {pdu_type:?} PDU in state {state:?}")]
    UnexpectedPdu {
        /// The type of the offending PDU.
        pdu_type: PduType,
        /// The state the engine was in.
        state: ProvisioningState,
    },
    /// A cryptographic primitive failed.
    #[error("crypto failure: {0}")]
    CryptoFailure(#[from] CryptoError),
    /// No progress was made within the protocol timeout.
    #[error("provisioning protocol timed out")]
    Timeout,
    /// The provisioner aborted with a `Failed` PDU.
    #[error("provisioner failed the session with {0:?}")]
    PeerFailed(ErrorCode),
    /// Wraps errors from the confirmation inputs transcript.
    #[error("confirmation inputs: {0}")]
    Transcript(#[from] AccumulatorError),
    /// A step ran without a live session.
    #[error("no provisioning session is active")]
    NoSession,
}

impl ProvisioningError {
    /// Returns the code to send in the `Failed` PDU for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ProvisioningError::MalformedPdu(
                PduError::Empty | PduError::UnknownType(_),
            ) => ErrorCode::InvalidPdu,
            ProvisioningError::MalformedPdu(_) => ErrorCode::InvalidFormat,
            ProvisioningError::UnexpectedPdu { .. } => ErrorCode::UnexpectedPdu,
            ProvisioningError::CryptoFailure(
                CryptoError::AuthenticationFailed,
            ) => ErrorCode::DecryptionFailed,
            ProvisioningError::PeerFailed(code) => *code,
            ProvisioningError::CryptoFailure(_)
            | ProvisioningError::Timeout
            | ProvisioningError::Transcript(_)
            | ProvisioningError::NoSession => ErrorCode::UnexpectedError,
        }
    }
}
