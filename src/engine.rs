//! The device side of the provisioning handshake, as a pure state machine.
//!
//! The engine does no I/O. Each entry point consumes one input (an inbound
//! PDU, a crypto completion or the expiry of the protocol timer) and returns
//! the [`ProvisioningAction`]s the driver has to carry out, in order.
//!
//! # Handshake
//!
//! ```text
//! Initializing ──key pair──> AwaitInvite ──Invite──> AwaitStart
//!   ──Start──> AwaitPublicKey ──PublicKey──> ComputingSharedSecret
//!   ──ECDH──> AwaitConfirmation ──Confirmation──> ComputingConfirmationChain
//!   ──s1, k1, CMAC──> AwaitRandom ──Random──> ComputingSessionMaterials
//!   ──s1, k1, k1──> AwaitData ──Data──> ComputingDataDecryption
//!   ──CCM, k1──> Complete
//! ```
//!
//! Any error leads to `Failed`, and the expiry of the protocol timer to
//! `TimedOut`. Both are terminal, as is `Complete`.
//!
//! # Crypto requests
//!
//! At most one request is outstanding. The step that continues once it
//! completes is kept as the pending step, and every request carries a
//! [`CryptoTicket`] for the current generation. Starting over, failing or
//! timing out bumps the generation, so completions that arrive afterwards
//! are dropped.

use alloc::vec::Vec;
use core::{convert::TryFrom, time::Duration};
use tracing::{debug, instrument, trace, warn};

use crate::{
    config::ProvisioningConfig,
    confirmation::ConfirmationField,
    crypto::{
        CryptoCompletion, CryptoError, CryptoRequest, CryptoResponse,
        CryptoTicket, DHKEY_LEN, MAC_LEN, PUBLIC_KEY_LEN,
    },
    kdf::{self, K1Derivation, K1Label, K1Step},
    pdu::{
        EncryptedData, ErrorCode, Pdu, PduError, PduType, Start,
        PROVISIONING_DATA_LEN,
    },
    session::{AuthValue, DeviceKey, NetworkCredentials, ProvisioningSession},
    ProvisioningError, Result,
};

/// Who ended a failed session, and with which error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// We detected an error and sent a `Failed` PDU.
    Local(ErrorCode),
    /// The provisioner sent a `Failed` PDU.
    Remote(ErrorCode),
}

/// The state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisioningState {
    /// Generating the local key pair.
    Initializing,
    /// Waiting for `Invite`.
    AwaitInvite,
    /// Waiting for `Start`.
    AwaitStart,
    /// Waiting for the provisioner's `PublicKey`.
    AwaitPublicKey,
    /// Computing the ECDH shared secret.
    ComputingSharedSecret,
    /// Waiting for the provisioner's `Confirmation`.
    AwaitConfirmation,
    /// Computing confirmation salt, key, auth value and our confirmation.
    ComputingConfirmationChain,
    /// Waiting for the provisioner's `Random`.
    AwaitRandom,
    /// Computing provisioning salt, session key and session nonce.
    ComputingSessionMaterials,
    /// Waiting for `Data`.
    AwaitData,
    /// Decrypting the credentials and deriving the device key.
    ComputingDataDecryption,
    /// The credentials have been delivered.
    Complete,
    /// The session was aborted.
    Failed(FailureReason),
    /// The protocol timer expired.
    TimedOut,
}

impl ProvisioningState {
    /// Returns whether the session is over.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProvisioningState::Complete
                | ProvisioningState::Failed(_)
                | ProvisioningState::TimedOut
        )
    }
}

/// Why the link is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Provisioning succeeded.
    Success,
    /// The protocol timer expired.
    Timeout,
    /// Provisioning failed.
    Fail,
}

impl CloseReason {
    /// Returns the reason code of the link close message.
    pub fn code(self) -> u8 {
        match self {
            CloseReason::Success => 0x00,
            CloseReason::Timeout => 0x01,
            CloseReason::Fail => 0x02,
        }
    }
}

/// Actions returned by the engine, to be executed in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningAction {
    /// Send the PDU to the provisioner.
    SendPdu(Pdu),
    /// Submit the request to the crypto provider and hand its completion
    /// to [`ProvisioningEngine::handle_crypto`].
    Crypto(CryptoTicket, CryptoRequest),
    /// (Re)arm the protocol timer.
    ArmTimer(Duration),
    /// Stop the protocol timer.
    CancelTimer,
    /// Draw attention to the device for this long.
    Attention(Duration),
    /// Output the authentication value to the user.
    OutputOob {
        /// The output action chosen by the provisioner.
        action: u8,
        /// The digit to output.
        value: u8,
    },
    /// Close the provisioning link.
    CloseLink(CloseReason),
    /// Provisioning finished, hand the credentials to the network layer.
    Provisioned {
        /// The received credentials.
        credentials: NetworkCredentials,
        /// The derived device key.
        device_key: DeviceKey,
    },
}

/// The step waiting for the outstanding crypto request.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    KeyPair,
    SharedSecret,
    ConfirmationSalt,
    ConfirmationKey(K1Derivation),
    AuthRandom,
    RandomLocal,
    ConfirmationLocal,
    ProvisioningSalt,
    SessionKey(K1Derivation),
    SessionNonce(K1Derivation),
    DecryptData,
    DeviceKey {
        derivation: K1Derivation,
        credentials: NetworkCredentials,
    },
}

/// The provisioning state machine of an unprovisioned device.
#[derive(Debug, Clone)]
pub struct ProvisioningEngine {
    config: ProvisioningConfig,
    state: ProvisioningState,
    generation: u64,
    session: Option<ProvisioningSession>,
    pending: Option<Pending>,
    last_error: Option<ProvisioningError>,
}

impl ProvisioningEngine {
    /// Creates an engine that does nothing until [`start`] is called.
    ///
    /// [`start`]: ProvisioningEngine::start
    pub fn new(config: ProvisioningConfig) -> ProvisioningEngine {
        ProvisioningEngine {
            config,
            state: ProvisioningState::Initializing,
            generation: 0,
            session: None,
            pending: None,
            last_error: None,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    /// Returns the generation of the current session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the live session, if there is one.
    pub fn session(&self) -> Option<&ProvisioningSession> {
        self.session.as_ref()
    }

    /// Returns the error that ended the last session.
    pub fn last_error(&self) -> Option<&ProvisioningError> {
        self.last_error.as_ref()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// Returns whether a crypto request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Begins a new session by generating the local key pair.
    ///
    /// Whatever the previous session was doing is forgotten.
    pub fn start(&mut self) -> Vec<ProvisioningAction> {
        let mut actions = Vec::new();
        self.reset();
        self.last_error = None;
        self.transition(ProvisioningState::Initializing);

        if let Err(e) = self.issue(
            Pending::KeyPair,
            CryptoRequest::GenerateKeyPair,
            &mut actions,
        ) {
            self.abort(e, &mut actions);
        }

        actions
    }

    /// Handles an inbound PDU, type code included.
    #[instrument(
        level = "trace",
        skip_all,
        fields(generation = self.generation)
    )]
    pub fn handle_pdu(&mut self, packet: &[u8]) -> Vec<ProvisioningAction> {
        let mut actions = Vec::new();
        if self.state.is_terminal() {
            warn!(state = ?self.state, "Dropping PDU after the session ended");
            return actions;
        }

        let result = Pdu::decode(packet)
            .map_err(ProvisioningError::from)
            .and_then(|pdu| self.dispatch(pdu, &mut actions));
        if let Err(e) = result {
            self.abort(e, &mut actions);
        }

        actions
    }

    /// Resumes the pending step with the completion of its request.
    pub fn handle_crypto(
        &mut self,
        completion: CryptoCompletion,
    ) -> Vec<ProvisioningAction> {
        let mut actions = Vec::new();
        if completion.ticket.generation() != self.generation {
            warn!(
                ticket = completion.ticket.generation(),
                generation = self.generation,
                "Discarding stale crypto completion"
            );
            return actions;
        }
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => {
                warn!("Discarding crypto completion without pending step");
                return actions;
            }
        };

        let result = completion
            .result
            .map_err(ProvisioningError::from)
            .and_then(|response| self.resume(pending, response, &mut actions));
        if let Err(e) = result {
            self.abort(e, &mut actions);
        }

        actions
    }

    /// Handles the expiry of the protocol timer.
    pub fn handle_timeout(&mut self) -> Vec<ProvisioningAction> {
        if self.state.is_terminal() {
            return Vec::new();
        }

        warn!(state = ?self.state, "Provisioning timed out");
        self.transition(ProvisioningState::TimedOut);
        self.reset();
        self.last_error = Some(ProvisioningError::Timeout);

        vec![ProvisioningAction::CloseLink(CloseReason::Timeout)]
    }

    fn dispatch(
        &mut self,
        pdu: Pdu,
        actions: &mut Vec<ProvisioningAction>,
    ) -> Result<()> {
        debug!(pdu_type = ?pdu.pdu_type(), state = ?self.state, "Received PDU");

        match (self.state, pdu) {
            (_, Pdu::Failed(code)) => Err(ProvisioningError::PeerFailed(code)),
            (
                ProvisioningState::AwaitInvite,
                Pdu::Invite { attention_duration },
            ) => self.handle_invite(attention_duration, actions),
            (ProvisioningState::AwaitStart, Pdu::Start(start)) => {
                self.handle_start(start)
            }
            (ProvisioningState::AwaitPublicKey, Pdu::PublicKey(key)) => {
                self.handle_public_key(key, actions)
            }
            (
                ProvisioningState::AwaitConfirmation,
                Pdu::Confirmation(value),
            ) => self.handle_confirmation(value, actions),
            (ProvisioningState::AwaitRandom, Pdu::Random(random)) => {
                self.handle_random(random, actions)
            }
            (ProvisioningState::AwaitData, Pdu::Data(data)) => {
                self.handle_data(data, actions)
            }
            (state, pdu) => Err(ProvisioningError::UnexpectedPdu {
                pdu_type: pdu.pdu_type(),
                state,
            }),
        }
    }

    fn handle_invite(
        &mut self,
        attention_duration: u8,
        actions: &mut Vec<ProvisioningAction>,
    ) -> Result<()> {
        let capabilities = self.config.capabilities;
        let inputs = &mut self.session_mut()?.confirmation_inputs;
        inputs.record_field(ConfirmationField::Invite, &[attention_duration])?;
        inputs.record_field(
            ConfirmationField::Capabilities,
            &capabilities.to_bytes(),
        )?;

        if attention_duration != 0 {
            actions.push(ProvisioningAction::Attention(Duration::from_secs(
                attention_duration.into(),
            )));
        }
        self.send(Pdu::Capabilities(capabilities), actions);
        self.transition(ProvisioningState::AwaitStart);

        Ok(())
    }

    fn handle_start(&mut self, start: Start) -> Result<()> {
        // Only FIPS P-256 without an OOB public key
        if start.algorithm != 0 {
            return Err(PduError::InvalidField {
                pdu_type: PduType::Start,
                field: "algorithm",
                value: start.algorithm.into(),
            }
            .into());
        }
        if start.public_key_type != 0 {
            return Err(PduError::InvalidField {
                pdu_type: PduType::Start,
                field: "public key type",
                value: start.public_key_type.into(),
            }
            .into());
        }

        let session = self.session_mut()?;
        session
            .confirmation_inputs
            .record_field(ConfirmationField::Start, &start.to_bytes())?;
        session.auth_action = start.auth_action;
        self.transition(ProvisioningState::AwaitPublicKey);

        Ok(())
    }

    fn handle_public_key(
        &mut self,
        remote_public: [u8; PUBLIC_KEY_LEN],
        actions: &mut Vec<ProvisioningAction>,
    ) -> Result<()> {
        let session = self.session_mut()?;
        session.confirmation_inputs.record_field(
            ConfirmationField::ProvisionerPublicKey,
            &remote_public,
        )?;
        session.remote_public = remote_public;
        trace!(remote_public = %hex::encode(remote_public), "Peer public key");

        self.transition(ProvisioningState::ComputingSharedSecret);
        self.issue(
            Pending::SharedSecret,
            CryptoRequest::SharedSecret { remote_public },
            actions,
        )
    }

    fn handle_confirmation(
        &mut self,
        confirmation: [u8; MAC_LEN],
        actions: &mut Vec<ProvisioningAction>,
    ) -> Result<()> {
        let session = self.session_mut()?;
        session.confirmation_remote = confirmation;
        let message = session.confirmation_inputs.as_bytes()?.to_vec();
        trace!(inputs = %hex::encode(&message), "Confirmation inputs");

        self.transition(ProvisioningState::ComputingConfirmationChain);
        self.issue(
            Pending::ConfirmationSalt,
            CryptoRequest::MacZeroKey { message },
            actions,
        )
    }

    fn handle_random(
        &mut self,
        random: [u8; MAC_LEN],
        actions: &mut Vec<ProvisioningAction>,
    ) -> Result<()> {
        let session = self.session_mut()?;
        session.random_remote = random;
        let message = session.provisioning_salt_input().to_vec();

        self.transition(ProvisioningState::ComputingSessionMaterials);
        self.issue(
            Pending::ProvisioningSalt,
            CryptoRequest::MacZeroKey { message },
            actions,
        )
    }

    fn handle_data(
        &mut self,
        data: EncryptedData,
        actions: &mut Vec<ProvisioningAction>,
    ) -> Result<()> {
        let session = self.session_mut()?;
        let request = CryptoRequest::AuthDecrypt {
            key: session.session_key,
            nonce: session.ccm_nonce(),
            ciphertext: data.to_ciphertext(),
        };

        self.transition(ProvisioningState::ComputingDataDecryption);
        self.issue(Pending::DecryptData, request, actions)
    }

    fn resume(
        &mut self,
        pending: Pending,
        response: CryptoResponse,
        actions: &mut Vec<ProvisioningAction>,
    ) -> Result<()> {
        match pending {
            Pending::KeyPair => {
                let public = match response {
                    CryptoResponse::KeyPair { public } => public,
                    _ => return Err(unexpected("KeyPair")),
                };
                trace!(public = %hex::encode(public), "Generated key pair");
                self.session = Some(ProvisioningSession::new(public));
                self.transition(ProvisioningState::AwaitInvite);
            }
            Pending::SharedSecret => {
                let shared_secret: [u8; DHKEY_LEN] = match response {
                    CryptoResponse::SharedSecret(secret) => secret,
                    _ => return Err(unexpected("SharedSecret")),
                };
                let session = self.session_mut()?;
                session.shared_secret = shared_secret;
                let local_public = session.local_public;
                session.confirmation_inputs.record_field(
                    ConfirmationField::DevicePublicKey,
                    &local_public,
                )?;
                trace!(dhkey = %hex::encode(shared_secret), "Shared secret");

                self.send(Pdu::PublicKey(local_public), actions);
                self.transition(ProvisioningState::AwaitConfirmation);
            }
            Pending::ConfirmationSalt => {
                let salt = expect_mac(response)?;
                let session = self.session_mut()?;
                session.confirmation_salt = salt;
                trace!(salt = %hex::encode(salt), "Confirmation salt");

                let (derivation, request) = K1Derivation::start(
                    &session.shared_secret,
                    &salt,
                    K1Label::ConfirmationKey,
                );
                self.issue(
                    Pending::ConfirmationKey(derivation),
                    request,
                    actions,
                )?;
            }
            Pending::ConfirmationKey(derivation) => {
                match derivation.advance(expect_mac(response)?) {
                    K1Step::Continue(next, request) => self.issue(
                        Pending::ConfirmationKey(next),
                        request,
                        actions,
                    )?,
                    K1Step::Done(key) => {
                        self.session_mut()?.confirmation_key = key;
                        trace!(key = %hex::encode(key), "Confirmation key");
                        self.issue(
                            Pending::AuthRandom,
                            CryptoRequest::RandomBytes { len: 1 },
                            actions,
                        )?;
                    }
                }
            }
            Pending::AuthRandom => {
                let [byte]: [u8; 1] = expect_random(response)?;
                let session = self.session_mut()?;
                session.auth_value = AuthValue::from_random(byte);
                actions.push(ProvisioningAction::OutputOob {
                    action: session.auth_action,
                    value: session.auth_value.digit(),
                });

                self.issue(
                    Pending::RandomLocal,
                    CryptoRequest::RandomBytes { len: MAC_LEN },
                    actions,
                )?;
            }
            Pending::RandomLocal => {
                let random = expect_random(response)?;
                let session = self.session_mut()?;
                session.random_local = random;
                let request = CryptoRequest::Mac {
                    key: session.confirmation_key,
                    message: session.confirmation_input().to_vec(),
                };

                self.issue(Pending::ConfirmationLocal, request, actions)?;
            }
            Pending::ConfirmationLocal => {
                let confirmation = expect_mac(response)?;
                self.session_mut()?.confirmation_local = confirmation;
                trace!(
                    confirmation = %hex::encode(confirmation),
                    "Confirmation"
                );

                self.send(Pdu::Confirmation(confirmation), actions);
                self.transition(ProvisioningState::AwaitRandom);
            }
            Pending::ProvisioningSalt => {
                let salt = expect_mac(response)?;
                let session = self.session_mut()?;
                session.provisioning_salt = salt;
                trace!(salt = %hex::encode(salt), "Provisioning salt");

                let (derivation, request) = K1Derivation::start(
                    &session.shared_secret,
                    &salt,
                    K1Label::SessionKey,
                );
                self.issue(Pending::SessionKey(derivation), request, actions)?;
            }
            Pending::SessionKey(derivation) => {
                match derivation.advance(expect_mac(response)?) {
                    K1Step::Continue(next, request) => self.issue(
                        Pending::SessionKey(next),
                        request,
                        actions,
                    )?,
                    K1Step::Done(key) => {
                        let session = self.session_mut()?;
                        session.session_key = key;
                        trace!(key = %hex::encode(key), "Session key");

                        let (derivation, request) = K1Derivation::start(
                            &session.shared_secret,
                            &session.provisioning_salt,
                            K1Label::SessionNonce,
                        );
                        self.issue(
                            Pending::SessionNonce(derivation),
                            request,
                            actions,
                        )?;
                    }
                }
            }
            Pending::SessionNonce(derivation) => {
                match derivation.advance(expect_mac(response)?) {
                    K1Step::Continue(next, request) => self.issue(
                        Pending::SessionNonce(next),
                        request,
                        actions,
                    )?,
                    K1Step::Done(output) => {
                        let session = self.session_mut()?;
                        session.session_nonce = kdf::session_nonce(output);
                        trace!(
                            nonce = %hex::encode(session.session_nonce),
                            "Session nonce"
                        );

                        let random_local = session.random_local;
                        self.send(Pdu::Random(random_local), actions);
                        self.transition(ProvisioningState::AwaitData);
                    }
                }
            }
            Pending::DecryptData => {
                let plaintext = match response {
                    CryptoResponse::Plaintext(plaintext) => plaintext,
                    _ => return Err(unexpected("Plaintext")),
                };
                let data = <[u8; PROVISIONING_DATA_LEN]>::try_from(
                    plaintext.as_slice(),
                )
                .map_err(|_| unexpected("Plaintext"))?;
                let credentials = NetworkCredentials::from_bytes(&data);
                debug!(
                    key_index = credentials.key_index,
                    flags = credentials.flags,
                    iv_index = credentials.iv_index,
                    unicast_address = credentials.unicast_address,
                    "Received network credentials"
                );

                let session = self.session_mut()?;
                session.network_credentials = Some(credentials);
                let (derivation, request) = K1Derivation::start(
                    &session.shared_secret,
                    &session.provisioning_salt,
                    K1Label::DeviceKey,
                );
                self.issue(
                    Pending::DeviceKey {
                        derivation,
                        credentials,
                    },
                    request,
                    actions,
                )?;
            }
            Pending::DeviceKey {
                derivation,
                credentials,
            } => match derivation.advance(expect_mac(response)?) {
                K1Step::Continue(next, request) => self.issue(
                    Pending::DeviceKey {
                        derivation: next,
                        credentials,
                    },
                    request,
                    actions,
                )?,
                K1Step::Done(device_key) => {
                    self.session_mut()?.device_key = device_key;
                    self.complete(credentials, device_key, actions);
                }
            },
        }

        Ok(())
    }

    /// Sends a PDU and rearms the protocol timer.
    fn send(&mut self, pdu: Pdu, actions: &mut Vec<ProvisioningAction>) {
        debug!(pdu_type = ?pdu.pdu_type(), "Sending PDU");
        actions.push(ProvisioningAction::SendPdu(pdu));
        let timeout = self.config.protocol_timeout;
        actions.push(ProvisioningAction::ArmTimer(timeout));
    }

    fn issue(
        &mut self,
        pending: Pending,
        request: CryptoRequest,
        actions: &mut Vec<ProvisioningAction>,
    ) -> Result<()> {
        if self.pending.is_some() {
            return Err(CryptoError::Busy.into());
        }

        self.pending = Some(pending);
        actions.push(ProvisioningAction::Crypto(
            CryptoTicket::new(self.generation),
            request,
        ));

        Ok(())
    }

    fn complete(
        &mut self,
        credentials: NetworkCredentials,
        device_key: DeviceKey,
        actions: &mut Vec<ProvisioningAction>,
    ) {
        trace!(device_key = %hex::encode(device_key), "Device key");
        actions.push(ProvisioningAction::SendPdu(Pdu::Complete));
        actions.push(ProvisioningAction::CancelTimer);
        actions.push(ProvisioningAction::Provisioned {
            credentials,
            device_key,
        });

        self.transition(ProvisioningState::Complete);
        self.session = None;
    }

    /// Ends the session in the `Failed` state.
    fn abort(
        &mut self,
        error: ProvisioningError,
        actions: &mut Vec<ProvisioningAction>,
    ) {
        warn!(%error, state = ?self.state, "Aborting provisioning");

        let reason = match &error {
            ProvisioningError::PeerFailed(code) => FailureReason::Remote(*code),
            _ => {
                let code = error.error_code();
                actions.push(ProvisioningAction::SendPdu(Pdu::Failed(code)));
                FailureReason::Local(code)
            }
        };
        actions.push(ProvisioningAction::CancelTimer);
        actions.push(ProvisioningAction::CloseLink(CloseReason::Fail));

        self.transition(ProvisioningState::Failed(reason));
        self.reset();
        self.last_error = Some(error);
    }

    /// Drops the session and invalidates outstanding requests.
    fn reset(&mut self) {
        self.generation += 1;
        self.pending = None;
        self.session = None;
    }

    fn transition(&mut self, state: ProvisioningState) {
        debug!(from = ?self.state, to = ?state, "State transition");
        self.state = state;
    }

    fn session_mut(&mut self) -> Result<&mut ProvisioningSession> {
        self.session.as_mut().ok_or(ProvisioningError::NoSession)
    }
}

fn unexpected(expected: &'static str) -> ProvisioningError {
    CryptoError::UnexpectedResponse(expected).into()
}

fn expect_mac(response: CryptoResponse) -> Result<[u8; MAC_LEN]> {
    match response {
        CryptoResponse::Mac(tag) => Ok(tag),
        _ => Err(unexpected("Mac")),
    }
}

fn expect_random<const N: usize>(response: CryptoResponse) -> Result<[u8; N]> {
    match response {
        CryptoResponse::Random(bytes) => {
            <[u8; N]>::try_from(bytes.as_slice())
                .map_err(|_| unexpected("Random"))
        }
        _ => Err(unexpected("Random")),
    }
}
