//! The key material of one provisioning session.

use serde::{Deserialize, Serialize};

use crate::{
    confirmation::ConfirmationInputs,
    crypto::{DHKEY_LEN, KEY_LEN, MAC_LEN, NONCE_LEN, PUBLIC_KEY_LEN},
    pdu::PROVISIONING_DATA_LEN,
};

/// The device key derived at the end of provisioning.
pub type DeviceKey = [u8; KEY_LEN];

/// The credentials delivered in the `Data` PDU.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct NetworkCredentials {
    /// The network key.
    pub network_key: [u8; KEY_LEN],
    /// The index of the network key.
    pub key_index: u16,
    /// Key Refresh and IV Update flags.
    pub flags: u8,
    /// The current IV index.
    pub iv_index: u32,
    /// The unicast address of the primary element.
    pub unicast_address: u16,
}

impl NetworkCredentials {
    /// Decodes the decrypted provisioning data.
    pub fn from_bytes(
        bytes: &[u8; PROVISIONING_DATA_LEN],
    ) -> NetworkCredentials {
        let mut network_key = [0; KEY_LEN];
        network_key.copy_from_slice(&bytes[..16]);

        NetworkCredentials {
            network_key,
            key_index: u16::from_be_bytes([bytes[16], bytes[17]]),
            flags: bytes[18],
            iv_index: u32::from_be_bytes([
                bytes[19], bytes[20], bytes[21], bytes[22],
            ]),
            unicast_address: u16::from_be_bytes([bytes[23], bytes[24]]),
        }
    }

    /// Returns the plaintext provisioning data.
    pub fn to_bytes(&self) -> [u8; PROVISIONING_DATA_LEN] {
        let mut bytes = [0; PROVISIONING_DATA_LEN];
        bytes[..16].copy_from_slice(&self.network_key);
        bytes[16..18].copy_from_slice(&self.key_index.to_be_bytes());
        bytes[18] = self.flags;
        bytes[19..23].copy_from_slice(&self.iv_index.to_be_bytes());
        bytes[23..25].copy_from_slice(&self.unicast_address.to_be_bytes());

        bytes
    }

    /// Whether the network is in phase 2 of a key refresh.
    pub fn key_refresh(&self) -> bool {
        self.flags & 0x01 != 0
    }

    /// Whether an IV update is in progress.
    pub fn iv_update(&self) -> bool {
        self.flags & 0x02 != 0
    }
}

/// The authentication value for numeric output OOB with a single digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthValue([u8; MAC_LEN]);

impl AuthValue {
    /// Derives the value from one random byte, the digit being in 1..=9.
    pub fn from_random(byte: u8) -> AuthValue {
        let mut value = [0; MAC_LEN];
        value[MAC_LEN - 1] = byte % 9 + 1;
        AuthValue(value)
    }

    /// Returns the digit to output.
    pub fn digit(&self) -> u8 {
        self.0[MAC_LEN - 1]
    }

    /// Returns the 16 byte value.
    pub fn as_bytes(&self) -> &[u8; MAC_LEN] {
        &self.0
    }
}

impl Default for AuthValue {
    fn default() -> Self {
        AuthValue([0; MAC_LEN])
    }
}

/// Everything the engine learns and derives in one session.
///
/// Created when the local key pair has been generated, and dropped once the
/// session is over, whatever the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningSession {
    /// Our public key.
    pub local_public: [u8; PUBLIC_KEY_LEN],
    /// The provisioner's public key.
    pub remote_public: [u8; PUBLIC_KEY_LEN],
    /// The ECDH shared secret.
    pub shared_secret: [u8; DHKEY_LEN],
    /// The transcript.
    pub confirmation_inputs: ConfirmationInputs,
    /// The authentication action chosen in `Start`.
    pub auth_action: u8,
    pub confirmation_salt: [u8; MAC_LEN],
    pub confirmation_key: [u8; KEY_LEN],
    pub confirmation_local: [u8; MAC_LEN],
    /// Stored as received, it can't be checked before the provisioner's
    /// random arrives.
    pub confirmation_remote: [u8; MAC_LEN],
    pub random_local: [u8; MAC_LEN],
    pub random_remote: [u8; MAC_LEN],
    pub auth_value: AuthValue,
    pub provisioning_salt: [u8; MAC_LEN],
    pub session_key: [u8; KEY_LEN],
    /// The full `k1` output with the first three bytes zeroed.
    pub session_nonce: [u8; MAC_LEN],
    pub device_key: DeviceKey,
    pub network_credentials: Option<NetworkCredentials>,
}

impl ProvisioningSession {
    /// Creates a session for the freshly generated key pair.
    pub fn new(local_public: [u8; PUBLIC_KEY_LEN]) -> ProvisioningSession {
        ProvisioningSession {
            local_public,
            remote_public: [0; PUBLIC_KEY_LEN],
            shared_secret: [0; DHKEY_LEN],
            confirmation_inputs: ConfirmationInputs::new(),
            auth_action: 0,
            confirmation_salt: [0; MAC_LEN],
            confirmation_key: [0; KEY_LEN],
            confirmation_local: [0; MAC_LEN],
            confirmation_remote: [0; MAC_LEN],
            random_local: [0; MAC_LEN],
            random_remote: [0; MAC_LEN],
            auth_value: AuthValue::default(),
            provisioning_salt: [0; MAC_LEN],
            session_key: [0; KEY_LEN],
            session_nonce: [0; MAC_LEN],
            device_key: [0; KEY_LEN],
            network_credentials: None,
        }
    }

    /// Returns the nonce in the form AES-CCM takes it.
    pub fn ccm_nonce(&self) -> [u8; NONCE_LEN] {
        let mut nonce = [0; NONCE_LEN];
        nonce.copy_from_slice(&self.session_nonce[MAC_LEN - NONCE_LEN..]);
        nonce
    }

    /// Returns `confirmation_salt ‖ random_remote ‖ random_local`, the
    /// input of the provisioning salt.
    pub fn provisioning_salt_input(&self) -> [u8; 3 * MAC_LEN] {
        let mut input = [0; 3 * MAC_LEN];
        input[..MAC_LEN].copy_from_slice(&self.confirmation_salt);
        input[MAC_LEN..2 * MAC_LEN].copy_from_slice(&self.random_remote);
        input[2 * MAC_LEN..].copy_from_slice(&self.random_local);
        input
    }

    /// Returns `random_local ‖ auth_value`, the input of our confirmation.
    pub fn confirmation_input(&self) -> [u8; 2 * MAC_LEN] {
        let mut input = [0; 2 * MAC_LEN];
        input[..MAC_LEN].copy_from_slice(&self.random_local);
        input[MAC_LEN..].copy_from_slice(self.auth_value.as_bytes());
        input
    }
}
