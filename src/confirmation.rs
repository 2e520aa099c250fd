//! The write-once transcript the confirmation salt is computed over.

use thiserror::Error;

/// Total length of the confirmation inputs.
pub const CONFIRMATION_INPUTS_LEN: usize = 145;

/// The fields of the transcript, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationField {
    /// Payload of the provisioner's `Invite`.
    Invite,
    /// Payload of the device's `Capabilities`.
    Capabilities,
    /// Payload of the provisioner's `Start`.
    Start,
    /// The provisioner's public key.
    ProvisionerPublicKey,
    /// The device's public key.
    DevicePublicKey,
}

impl ConfirmationField {
    /// All fields, ordered by offset.
    pub const ALL: [ConfirmationField; 5] = [
        ConfirmationField::Invite,
        ConfirmationField::Capabilities,
        ConfirmationField::Start,
        ConfirmationField::ProvisionerPublicKey,
        ConfirmationField::DevicePublicKey,
    ];

    /// Returns the offset of the field in the transcript.
    pub fn offset(self) -> usize {
        match self {
            ConfirmationField::Invite => 0,
            ConfirmationField::Capabilities => 1,
            ConfirmationField::Start => 12,
            ConfirmationField::ProvisionerPublicKey => 17,
            ConfirmationField::DevicePublicKey => 81,
        }
    }

    /// Returns the length of the field.
    pub fn len(self) -> usize {
        match self {
            ConfirmationField::Invite => 1,
            ConfirmationField::Capabilities => 11,
            ConfirmationField::Start => 5,
            ConfirmationField::ProvisionerPublicKey
            | ConfirmationField::DevicePublicKey => 64,
        }
    }
}

/// The error type for the `confirmation` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccumulatorError {
    /// The range reaches past the end of the transcript.
    #[error("range {offset}..{end} is out of bounds")]
    OutOfBounds {
        /// Start of the range.
        offset: usize,
        /// End of the range, exclusive.
        end: usize,
    },
    /// Part of the range has been written before.
    #[error("range {offset}..{end} was already recorded")]
    AlreadyRecorded {
        /// Start of the range.
        offset: usize,
        /// End of the range, exclusive.
        end: usize,
    },
    /// The field hasn't been recorded yet.
    #[error("{0:?} is missing")]
    Missing(ConfirmationField),
    /// The bytes don't have the length of the field.
    #[error("{field:?} must be {expected} bytes, got {actual}")]
    FieldLength {
        /// The field.
        field: ConfirmationField,
        /// The length of the field.
        expected: usize,
        /// The length of the given bytes.
        actual: usize,
    },
}

/// The confirmation inputs, accumulated over the first half of the
/// handshake.
///
/// Each byte can only be written once, and the bytes can't be read until
/// every field has been recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationInputs {
    bytes: [u8; CONFIRMATION_INPUTS_LEN],
    written: [bool; CONFIRMATION_INPUTS_LEN],
}

impl ConfirmationInputs {
    /// Creates an empty transcript.
    pub fn new() -> ConfirmationInputs {
        ConfirmationInputs {
            bytes: [0; CONFIRMATION_INPUTS_LEN],
            written: [false; CONFIRMATION_INPUTS_LEN],
        }
    }

    /// Writes `bytes` at `offset`.
    pub fn record(
        &mut self,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), AccumulatorError> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= CONFIRMATION_INPUTS_LEN)
            .ok_or(AccumulatorError::OutOfBounds {
                offset,
                end: offset.saturating_add(bytes.len()),
            })?;
        if self.written[offset..end].iter().any(|&w| w) {
            return Err(AccumulatorError::AlreadyRecorded { offset, end });
        }

        self.bytes[offset..end].copy_from_slice(bytes);
        self.written[offset..end].fill(true);

        Ok(())
    }

    /// Writes a field, checking that `bytes` has its length.
    pub fn record_field(
        &mut self,
        field: ConfirmationField,
        bytes: &[u8],
    ) -> Result<(), AccumulatorError> {
        if bytes.len() != field.len() {
            return Err(AccumulatorError::FieldLength {
                field,
                expected: field.len(),
                actual: bytes.len(),
            });
        }

        self.record(field.offset(), bytes)
    }

    /// Returns whether the field has been recorded completely.
    pub fn has_field(&self, field: ConfirmationField) -> bool {
        let offset = field.offset();
        self.written[offset..offset + field.len()].iter().all(|&w| w)
    }

    /// Returns the first field that hasn't been recorded.
    pub fn missing_field(&self) -> Option<ConfirmationField> {
        ConfirmationField::ALL
            .iter()
            .copied()
            .find(|&field| !self.has_field(field))
    }

    /// Returns whether all 145 bytes have been written.
    pub fn is_complete(&self) -> bool {
        self.missing_field().is_none()
    }

    /// Returns the transcript, if it's complete.
    pub fn as_bytes(
        &self,
    ) -> Result<&[u8; CONFIRMATION_INPUTS_LEN], AccumulatorError> {
        match self.missing_field() {
            Some(field) => Err(AccumulatorError::Missing(field)),
            None => Ok(&self.bytes),
        }
    }
}

impl Default for ConfirmationInputs {
    fn default() -> Self {
        ConfirmationInputs::new()
    }
}
