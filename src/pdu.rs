//! Provisioning PDUs and their wire format.
//!
//! Every PDU is a one byte type code followed by a payload of fixed length.
//! Multi-byte fields are big-endian.

use alloc::vec::Vec;
use core::convert::TryFrom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{MAC_LEN, MIC_LEN, PUBLIC_KEY_LEN};

/// Length of the encrypted provisioning data, without the MIC.
pub const PROVISIONING_DATA_LEN: usize = 25;
/// Bit of the supported algorithms field for FIPS P-256.
pub const ALGORITHM_FIPS_P256: u16 = 0x0001;

/// OOB action bits advertised in the `Capabilities` PDU.
pub mod oob {
    /// Output OOB action: blink.
    pub const OUTPUT_BLINK: u16 = 0x0001;
    /// Output OOB action: beep.
    pub const OUTPUT_BEEP: u16 = 0x0002;
    /// Output OOB action: vibrate.
    pub const OUTPUT_VIBRATE: u16 = 0x0004;
    /// Output OOB action: output numeric.
    pub const OUTPUT_NUMBER: u16 = 0x0008;
    /// Output OOB action: output alphanumeric.
    pub const OUTPUT_STRING: u16 = 0x0010;

    /// Input OOB action: push.
    pub const INPUT_PUSH: u16 = 0x0001;
    /// Input OOB action: twist.
    pub const INPUT_TWIST: u16 = 0x0002;
    /// Input OOB action: input numeric.
    pub const INPUT_NUMBER: u16 = 0x0004;
    /// Input OOB action: input alphanumeric.
    pub const INPUT_STRING: u16 = 0x0008;
}

/// The type code of a provisioning PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PduType {
    /// Provisioning Invite.
    Invite = 0x00,
    /// Provisioning Capabilities.
    Capabilities = 0x01,
    /// Provisioning Start.
    Start = 0x02,
    /// Provisioning Public Key.
    PublicKey = 0x03,
    /// Provisioning Input Complete.
    InputComplete = 0x04,
    /// Provisioning Confirmation.
    Confirmation = 0x05,
    /// Provisioning Random.
    Random = 0x06,
    /// Provisioning Data.
    ///
    /// The payload is the 25 encrypted bytes followed by the 8 byte MIC,
    /// 33 bytes in total. A payload without the MIC is rejected as
    /// `InvalidLength`.
    Data = 0x07,
    /// Provisioning Complete.
    Complete = 0x08,
    /// Provisioning Failed.
    Failed = 0x09,
}

impl PduType {
    /// Returns the type for the given code, if there is one.
    pub fn from_code(code: u8) -> Option<PduType> {
        Some(match code {
            0x00 => PduType::Invite,
            0x01 => PduType::Capabilities,
            0x02 => PduType::Start,
            0x03 => PduType::PublicKey,
            0x04 => PduType::InputComplete,
            0x05 => PduType::Confirmation,
            0x06 => PduType::Random,
            0x07 => PduType::Data,
            0x08 => PduType::Complete,
            0x09 => PduType::Failed,
            _ => return None,
        })
    }

    /// Returns the type code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns the exact payload length of this PDU type.
    pub fn payload_len(self) -> usize {
        match self {
            PduType::Invite | PduType::Failed => 1,
            PduType::Capabilities => Capabilities::LEN,
            PduType::Start => Start::LEN,
            PduType::PublicKey => PUBLIC_KEY_LEN,
            PduType::InputComplete | PduType::Complete => 0,
            PduType::Confirmation | PduType::Random => MAC_LEN,
            PduType::Data => PROVISIONING_DATA_LEN + MIC_LEN,
        }
    }
}

/// The error codes carried by the `Failed` PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// The PDU type isn't recognized.
    InvalidPdu = 0x01,
    /// The PDU's length or a field value isn't valid.
    InvalidFormat = 0x02,
    /// The PDU isn't expected at this point.
    UnexpectedPdu = 0x03,
    /// The confirmation value couldn't be verified.
    ConfirmationFailed = 0x04,
    /// The device ran out of resources.
    OutOfResources = 0x05,
    /// The provisioning data couldn't be decrypted.
    DecryptionFailed = 0x06,
    /// An error not covered by the other codes.
    UnexpectedError = 0x07,
    /// The device can't assign consecutive unicast addresses.
    CannotAssignAddresses = 0x08,
}

impl ErrorCode {
    /// Returns the error code for the given byte, if there is one.
    pub fn from_code(code: u8) -> Option<ErrorCode> {
        Some(match code {
            0x01 => ErrorCode::InvalidPdu,
            0x02 => ErrorCode::InvalidFormat,
            0x03 => ErrorCode::UnexpectedPdu,
            0x04 => ErrorCode::ConfirmationFailed,
            0x05 => ErrorCode::OutOfResources,
            0x06 => ErrorCode::DecryptionFailed,
            0x07 => ErrorCode::UnexpectedError,
            0x08 => ErrorCode::CannotAssignAddresses,
            _ => return None,
        })
    }

    /// Returns the byte value.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// The error type for the `pdu` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PduError {
    /// The packet doesn't even contain a type code.
    #[error("empty packet")]
    Empty,
    /// The type code isn't known.
    #[error("unknown PDU type {0:#04x}")]
    UnknownType(u8),
    /// The payload doesn't have the length of its type.
    #[error("{pdu_type:?} payload must be {expected} bytes, got {actual}")]
    InvalidLength {
        /// The PDU type.
        pdu_type: PduType,
        /// The fixed payload length of the type.
        expected: usize,
        /// The received payload length.
        actual: usize,
    },
    /// A field holds a prohibited or unsupported value.
    #[error("{pdu_type:?} field {field} has invalid value {value:#x}")]
    InvalidField {
        /// The PDU type.
        pdu_type: PduType,
        /// The name of the field.
        field: &'static str,
        /// The offending value.
        value: u16,
    },
}

/// The device capabilities, sent in reply to an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Number of elements of the device.
    pub elements: u8,
    /// Bitmask of supported algorithms.
    pub algorithms: u16,
    /// Supported public key types.
    pub public_key_type: u8,
    /// Whether static OOB information is available.
    pub static_oob_type: u8,
    /// Maximum size of output OOB.
    pub output_oob_size: u8,
    /// Bitmask of supported output OOB actions.
    pub output_oob_action: u16,
    /// Maximum size of input OOB.
    pub input_oob_size: u8,
    /// Bitmask of supported input OOB actions.
    pub input_oob_action: u16,
}

impl Capabilities {
    /// Length of the encoded capabilities.
    pub const LEN: usize = 11;

    /// Returns the encoded capabilities.
    pub fn to_bytes(&self) -> [u8; Capabilities::LEN] {
        let mut bytes = [0; Capabilities::LEN];
        bytes[0] = self.elements;
        bytes[1..3].copy_from_slice(&self.algorithms.to_be_bytes());
        bytes[3] = self.public_key_type;
        bytes[4] = self.static_oob_type;
        bytes[5] = self.output_oob_size;
        bytes[6..8].copy_from_slice(&self.output_oob_action.to_be_bytes());
        bytes[8] = self.input_oob_size;
        bytes[9..11].copy_from_slice(&self.input_oob_action.to_be_bytes());

        bytes
    }

    /// Decodes capabilities.
    pub fn from_bytes(bytes: &[u8; Capabilities::LEN]) -> Capabilities {
        Capabilities {
            elements: bytes[0],
            algorithms: u16::from_be_bytes([bytes[1], bytes[2]]),
            public_key_type: bytes[3],
            static_oob_type: bytes[4],
            output_oob_size: bytes[5],
            output_oob_action: u16::from_be_bytes([bytes[6], bytes[7]]),
            input_oob_size: bytes[8],
            input_oob_action: u16::from_be_bytes([bytes[9], bytes[10]]),
        }
    }
}

impl Default for Capabilities {
    /// A single element device supporting FIPS P-256 that can output a
    /// number of up to eight digits.
    fn default() -> Self {
        Capabilities {
            elements: 1,
            algorithms: ALGORITHM_FIPS_P256,
            public_key_type: 0,
            static_oob_type: 0,
            output_oob_size: 8,
            output_oob_action: oob::OUTPUT_NUMBER,
            input_oob_size: 8,
            input_oob_action: oob::INPUT_STRING,
        }
    }
}

/// The parameters chosen by the provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Start {
    /// The algorithm to use, 0 is FIPS P-256.
    pub algorithm: u8,
    /// 0 if no OOB public key is used.
    pub public_key_type: u8,
    /// The authentication method.
    pub auth_method: u8,
    /// The authentication action, depending on the method.
    pub auth_action: u8,
    /// The authentication size, depending on the method.
    pub auth_size: u8,
}

impl Start {
    /// Length of the encoded start parameters.
    pub const LEN: usize = 5;

    /// Returns the encoded parameters.
    pub fn to_bytes(&self) -> [u8; Start::LEN] {
        [
            self.algorithm,
            self.public_key_type,
            self.auth_method,
            self.auth_action,
            self.auth_size,
        ]
    }

    /// Decodes start parameters.
    pub fn from_bytes(bytes: &[u8; Start::LEN]) -> Start {
        Start {
            algorithm: bytes[0],
            public_key_type: bytes[1],
            auth_method: bytes[2],
            auth_action: bytes[3],
            auth_size: bytes[4],
        }
    }
}

/// The encrypted provisioning data with its MIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptedData {
    /// The encrypted network credentials.
    pub data: [u8; PROVISIONING_DATA_LEN],
    /// The CCM message integrity check.
    pub mic: [u8; MIC_LEN],
}

impl EncryptedData {
    /// Returns ciphertext and MIC as one buffer, the way CCM expects them.
    pub fn to_ciphertext(&self) -> Vec<u8> {
        let mut ciphertext =
            Vec::with_capacity(PROVISIONING_DATA_LEN + MIC_LEN);
        ciphertext.extend_from_slice(&self.data);
        ciphertext.extend_from_slice(&self.mic);

        ciphertext
    }
}

/// A provisioning PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    /// Invitation with the attention timer duration in seconds.
    Invite {
        /// Seconds the device should draw attention to itself.
        attention_duration: u8,
    },
    /// The device capabilities.
    Capabilities(Capabilities),
    /// The chosen provisioning parameters.
    Start(Start),
    /// An uncompressed P-256 public key, X followed by Y.
    PublicKey([u8; PUBLIC_KEY_LEN]),
    /// The user finished entering the input OOB value.
    InputComplete,
    /// A confirmation value.
    Confirmation([u8; MAC_LEN]),
    /// A random value.
    Random([u8; MAC_LEN]),
    /// The encrypted provisioning data.
    Data(EncryptedData),
    /// Provisioning finished successfully.
    Complete,
    /// Provisioning failed.
    Failed(ErrorCode),
}

impl Pdu {
    /// Returns the type of this PDU.
    pub fn pdu_type(&self) -> PduType {
        match self {
            Pdu::Invite { .. } => PduType::Invite,
            Pdu::Capabilities(_) => PduType::Capabilities,
            Pdu::Start(_) => PduType::Start,
            Pdu::PublicKey(_) => PduType::PublicKey,
            Pdu::InputComplete => PduType::InputComplete,
            Pdu::Confirmation(_) => PduType::Confirmation,
            Pdu::Random(_) => PduType::Random,
            Pdu::Data(_) => PduType::Data,
            Pdu::Complete => PduType::Complete,
            Pdu::Failed(_) => PduType::Failed,
        }
    }

    /// Decodes a PDU from the type code and payload.
    pub fn decode(packet: &[u8]) -> Result<Pdu, PduError> {
        let (&code, payload) = packet.split_first().ok_or(PduError::Empty)?;
        let pdu_type =
            PduType::from_code(code).ok_or(PduError::UnknownType(code))?;

        Ok(match pdu_type {
            PduType::Invite => {
                let [attention_duration]: [u8; 1] =
                    fixed(pdu_type, payload)?;
                Pdu::Invite { attention_duration }
            }
            PduType::Capabilities => Pdu::Capabilities(Capabilities::from_bytes(
                &fixed(pdu_type, payload)?,
            )),
            PduType::Start => {
                Pdu::Start(Start::from_bytes(&fixed(pdu_type, payload)?))
            }
            PduType::PublicKey => Pdu::PublicKey(fixed(pdu_type, payload)?),
            PduType::InputComplete => {
                let []: [u8; 0] = fixed(pdu_type, payload)?;
                Pdu::InputComplete
            }
            PduType::Confirmation => {
                Pdu::Confirmation(fixed(pdu_type, payload)?)
            }
            PduType::Random => Pdu::Random(fixed(pdu_type, payload)?),
            PduType::Data => {
                let bytes: [u8; PROVISIONING_DATA_LEN + MIC_LEN] =
                    fixed(pdu_type, payload)?;
                let mut data = [0; PROVISIONING_DATA_LEN];
                data.copy_from_slice(&bytes[..PROVISIONING_DATA_LEN]);
                let mut mic = [0; MIC_LEN];
                mic.copy_from_slice(&bytes[PROVISIONING_DATA_LEN..]);
                Pdu::Data(EncryptedData { data, mic })
            }
            PduType::Complete => {
                let []: [u8; 0] = fixed(pdu_type, payload)?;
                Pdu::Complete
            }
            PduType::Failed => {
                let [code]: [u8; 1] = fixed(pdu_type, payload)?;
                let error_code = ErrorCode::from_code(code).ok_or(
                    PduError::InvalidField {
                        pdu_type,
                        field: "error code",
                        value: code.into(),
                    },
                )?;
                Pdu::Failed(error_code)
            }
        })
    }

    /// Returns the type code followed by the payload.
    pub fn encode(&self) -> Vec<u8> {
        let pdu_type = self.pdu_type();
        let mut packet = Vec::with_capacity(1 + pdu_type.payload_len());
        packet.push(pdu_type.code());

        match self {
            Pdu::Invite { attention_duration } => {
                packet.push(*attention_duration)
            }
            Pdu::Capabilities(capabilities) => {
                packet.extend_from_slice(&capabilities.to_bytes())
            }
            Pdu::Start(start) => packet.extend_from_slice(&start.to_bytes()),
            Pdu::PublicKey(key) => packet.extend_from_slice(key),
            Pdu::Confirmation(value) | Pdu::Random(value) => {
                packet.extend_from_slice(value)
            }
            Pdu::Data(data) => packet.extend_from_slice(&data.to_ciphertext()),
            Pdu::Failed(code) => packet.push(code.code()),
            Pdu::InputComplete | Pdu::Complete => {}
        }

        packet
    }
}

/// Returns the payload as an array, if it has exactly the right length.
fn fixed<const N: usize>(
    pdu_type: PduType,
    payload: &[u8],
) -> Result<[u8; N], PduError> {
    <[u8; N]>::try_from(payload).map_err(|_| PduError::InvalidLength {
        pdu_type,
        expected: N,
        actual: payload.len(),
    })
}
