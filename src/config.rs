//! Device configuration.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::pdu::Capabilities;

/// The default protocol timeout.
pub const PROTOCOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration of a provisioning device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Time allowed between two outbound PDUs before the link is closed.
    pub protocol_timeout: Duration,
    /// The capabilities sent in reply to an invitation.
    pub capabilities: Capabilities,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        ProvisioningConfig {
            protocol_timeout: PROTOCOL_TIMEOUT,
            capabilities: Capabilities::default(),
        }
    }
}

impl ProvisioningConfig {
    /// Sets the protocol timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> ProvisioningConfig {
        self.protocol_timeout = timeout;
        self
    }

    /// Sets the capabilities.
    pub fn with_capabilities(
        mut self,
        capabilities: Capabilities,
    ) -> ProvisioningConfig {
        self.capabilities = capabilities;
        self
    }
}
