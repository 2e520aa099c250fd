use alloc::{collections::VecDeque, vec::Vec};
use p256::SecretKey;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    config::ProvisioningConfig,
    crypto::{
        ccm_encrypt, public_key_bytes, CryptoCompletion, CryptoRequest,
        CryptoTicket, SoftwareCrypto, MIC_LEN,
    },
    engine::{
        CloseReason, ProvisioningAction, ProvisioningEngine, ProvisioningState,
    },
    pdu::{EncryptedData, ErrorCode, Pdu, Start, PROVISIONING_DATA_LEN},
    session::{NetworkCredentials, ProvisioningSession},
};

/// An engine wired to a seeded software provider, with a scripted
/// provisioner on the other end.
pub struct Harness {
    pub engine: ProvisioningEngine,
    pub crypto: SoftwareCrypto<StdRng>,
    pub provisioner: SecretKey,
}

impl Harness {
    pub fn new() -> Harness {
        Harness {
            engine: ProvisioningEngine::new(ProvisioningConfig::default()),
            crypto: SoftwareCrypto::with_rng(StdRng::seed_from_u64(42)),
            provisioner: SecretKey::from_slice(&[0x11; 32]).unwrap(),
        }
    }

    pub fn provisioner_public(&self) -> [u8; 64] {
        public_key_bytes(&self.provisioner)
    }

    /// Runs every crypto request to completion, returning the other actions.
    pub fn settle(
        &mut self,
        actions: Vec<ProvisioningAction>,
    ) -> Vec<ProvisioningAction> {
        let mut queue = VecDeque::from(actions);
        let mut settled = Vec::new();
        while let Some(action) = queue.pop_front() {
            match action {
                ProvisioningAction::Crypto(ticket, request) => {
                    let result = self.crypto.perform(request);
                    queue.extend(
                        self.engine
                            .handle_crypto(CryptoCompletion { ticket, result }),
                    );
                }
                other => settled.push(other),
            }
        }

        settled
    }

    pub fn deliver(&mut self, pdu: &Pdu) -> Vec<ProvisioningAction> {
        self.deliver_raw(&pdu.encode())
    }

    pub fn deliver_raw(&mut self, packet: &[u8]) -> Vec<ProvisioningAction> {
        let actions = self.engine.handle_pdu(packet);
        self.settle(actions)
    }

    /// The PDU the provisioner sends in the current state.
    pub fn next_pdu(&self) -> Pdu {
        match self.engine.state() {
            ProvisioningState::AwaitInvite => Pdu::Invite {
                attention_duration: 0,
            },
            ProvisioningState::AwaitStart => Pdu::Start(start_params()),
            ProvisioningState::AwaitPublicKey => {
                Pdu::PublicKey(self.provisioner_public())
            }
            ProvisioningState::AwaitConfirmation => {
                Pdu::Confirmation([0xC0; 16])
            }
            ProvisioningState::AwaitRandom => Pdu::Random([0x5A; 16]),
            ProvisioningState::AwaitData => Pdu::Data(encrypt_credentials(
                self.engine.session().unwrap(),
                &test_credentials(),
            )),
            state => panic!("Provisioner has nothing to send in {:?}", state),
        }
    }

    /// Drives the handshake until the engine is in `target`, returning all
    /// actions on the way.
    pub fn advance_to(
        &mut self,
        target: ProvisioningState,
    ) -> Vec<ProvisioningAction> {
        let mut actions = Vec::new();
        if self.engine.state() == ProvisioningState::Initializing
            && !self.engine.is_busy()
        {
            let started = self.engine.start();
            actions.extend(self.settle(started));
        }
        while self.engine.state() != target {
            let pdu = self.next_pdu();
            actions.extend(self.deliver(&pdu));
        }

        actions
    }
}

/// Output OOB, numeric, a single digit.
pub fn start_params() -> Start {
    Start {
        algorithm: 0,
        public_key_type: 0,
        auth_method: 2,
        auth_action: 3,
        auth_size: 1,
    }
}

pub fn test_credentials() -> NetworkCredentials {
    NetworkCredentials {
        network_key: [
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A,
            0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
        ],
        key_index: 0x0000,
        flags: 0x00,
        iv_index: 0x0000_0000,
        unicast_address: 0x0001,
    }
}

pub fn encrypt_credentials(
    session: &ProvisioningSession,
    credentials: &NetworkCredentials,
) -> EncryptedData {
    let ciphertext = ccm_encrypt(
        &session.session_key,
        &session.ccm_nonce(),
        &credentials.to_bytes(),
    )
    .unwrap();

    let mut data = [0; PROVISIONING_DATA_LEN];
    data.copy_from_slice(&ciphertext[..PROVISIONING_DATA_LEN]);
    let mut mic = [0; MIC_LEN];
    mic.copy_from_slice(&ciphertext[PROVISIONING_DATA_LEN..]);
    EncryptedData { data, mic }
}

/// The actions of a locally detected failure.
pub fn failure(code: ErrorCode) -> Vec<ProvisioningAction> {
    vec![
        ProvisioningAction::SendPdu(Pdu::Failed(code)),
        ProvisioningAction::CancelTimer,
        ProvisioningAction::CloseLink(CloseReason::Fail),
    ]
}

pub fn crypto_request(
    action: &ProvisioningAction,
) -> (CryptoTicket, CryptoRequest) {
    match action {
        ProvisioningAction::Crypto(ticket, request) => {
            (*ticket, request.clone())
        }
        other => panic!("Expected Crypto, got {:?}", other),
    }
}
