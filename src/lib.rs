//! A device-side implementation of the mesh
//! [Provisioning Protocol](https://www.bluetooth.com/specifications/specs/mesh-protocol/),
//! intended for embedded devices.
//!
//! The engine takes an unprovisioned device through the provisioning
//! handshake: it answers the provisioner's invitation with its capabilities,
//! exchanges P-256 public keys, proves knowledge of the shared secret and a
//! single-digit output OOB value with AES-CMAC confirmations, and finally
//! decrypts the AES-CCM protected network credentials.
//!
//! The [`engine::ProvisioningEngine`] is a pure state machine without any
//! I/O. It returns [`engine::ProvisioningAction`]s, including requests for
//! asynchronous cryptographic operations, which the
//! [`device::ProvisioningDevice`] executes against a bearer, a timer and a
//! [`crypto::CryptoProvider`]. A software provider built on the RustCrypto
//! crates is available as [`crypto::SoftwareCrypto`].
//!
//! Only the FIPS P-256 algorithm without OOB public keys is supported, and
//! only one provisioning session can be active at a time.
//!
//! ## Security
//! This should **not currently be used in production code**, use at your own
//! risk. The provisioner's confirmation value is stored but not verified.

#![no_std]
#[cfg(any(feature = "std", test))]
extern crate std;
#[macro_use]
extern crate alloc;

pub mod config;
pub mod confirmation;
pub mod crypto;
pub mod device;
pub mod engine;
mod error;
pub mod kdf;
pub mod pdu;
pub mod session;
#[cfg(test)]
mod test_support;
#[cfg(test)]
mod test_vectors;

pub use config::ProvisioningConfig;
pub use device::ProvisioningDevice;
pub use engine::{ProvisioningAction, ProvisioningEngine, ProvisioningState};
pub use error::ProvisioningError;
pub use session::{DeviceKey, NetworkCredentials};

/// The result type for the provisioning engine.
pub type Result<T> = core::result::Result<T, ProvisioningError>;
