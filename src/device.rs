//! Runs a [`ProvisioningEngine`] against the device's bearer, timer and
//! crypto provider.
//!
//! The [`ProvisioningDevice`] is meant to be called from a single run loop.
//! Inbound packets go to [`handle_packet`], the expiry of the protocol timer
//! to [`handle_timeout`], and [`poll_crypto`] should be called whenever the
//! crypto provider may have finished a request.
//!
//! A session that fails or times out is reported through
//! [`ProvisioningEvents::session_ended`], after which the device starts
//! listening for a new provisioner on its own.
//!
//! [`handle_packet`]: ProvisioningDevice::handle_packet
//! [`handle_timeout`]: ProvisioningDevice::handle_timeout
//! [`poll_crypto`]: ProvisioningDevice::poll_crypto

use alloc::{collections::VecDeque, vec::Vec};
use core::time::Duration;
use tracing::{debug, trace, warn};

use crate::{
    config::ProvisioningConfig,
    crypto::{CryptoCompletion, CryptoProvider},
    engine::{
        CloseReason, ProvisioningAction, ProvisioningEngine, ProvisioningState,
    },
    session::{DeviceKey, NetworkCredentials},
    ProvisioningError,
};

/// The kind of packet the bearer delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// A reassembled provisioning PDU.
    ProvisioningData,
    /// A bearer event, e.g. a link being opened.
    Event,
}

/// The provisioning bearer, e.g. PB-ADV.
pub trait Bearer {
    /// Starts accepting links for the device with this UUID.
    fn init(&mut self, device_uuid: &[u8; 16]);

    /// Sends a PDU over the open link.
    fn send_pdu(&mut self, pdu: &[u8]);

    /// Closes the link.
    fn close_link(&mut self, link_id: u16, reason: CloseReason);
}

/// A single shot timer.
pub trait TimerService {
    /// Arms the timer, replacing any previous deadline.
    fn arm(&mut self, timeout: Duration);

    /// Stops the timer.
    fn cancel(&mut self);
}

/// Receives what the engine has for the rest of the node.
pub trait ProvisioningEvents {
    /// Provisioning succeeded.
    fn provisioned(
        &mut self,
        credentials: &NetworkCredentials,
        device_key: &DeviceKey,
    );

    /// The provisioner asked the device to draw attention to itself.
    fn attention(&mut self, _duration: Duration) {}

    /// The authentication value has to be shown to the user.
    fn output_oob(&mut self, _action: u8, _value: u8) {}

    /// The session ended in `Failed` or `TimedOut`.
    fn session_ended(&mut self, _state: ProvisioningState) {}
}

/// An unprovisioned device.
pub struct ProvisioningDevice<B, C, T, E> {
    engine: ProvisioningEngine,
    bearer: B,
    crypto: C,
    timer: T,
    events: E,
    link_id: u16,
    timer_armed: bool,
}

impl<B, C, T, E> ProvisioningDevice<B, C, T, E>
where
    B: Bearer,
    C: CryptoProvider,
    T: TimerService,
    E: ProvisioningEvents,
{
    /// Creates a new `ProvisioningDevice`.
    pub fn new(
        config: ProvisioningConfig,
        bearer: B,
        crypto: C,
        timer: T,
        events: E,
    ) -> ProvisioningDevice<B, C, T, E> {
        ProvisioningDevice {
            engine: ProvisioningEngine::new(config),
            bearer,
            crypto,
            timer,
            events,
            link_id: 0,
            timer_armed: false,
        }
    }

    /// Registers with the bearer and begins the first session.
    pub fn init(&mut self, device_uuid: &[u8; 16]) {
        self.bearer.init(device_uuid);
        self.restart();
    }

    /// Abandons the current session and begins a new one.
    pub fn restart(&mut self) {
        // Whatever the provider still holds belongs to an older generation
        self.crypto.cancel();
        if self.timer_armed {
            self.timer.cancel();
            self.timer_armed = false;
        }
        let actions = self.engine.start();
        self.run(ProvisioningState::Initializing, actions);
    }

    /// Handles a packet from the bearer.
    pub fn handle_packet(
        &mut self,
        kind: PacketKind,
        channel: u16,
        packet: &[u8],
    ) {
        if kind == PacketKind::Event {
            trace!(channel, "Ignoring bearer event");
            return;
        }

        self.link_id = channel;
        let before = self.engine.state();
        let actions = self.engine.handle_pdu(packet);
        self.run(before, actions);
    }

    /// Handles the expiry of the protocol timer.
    ///
    /// An expiry after the timer was cancelled is ignored.
    pub fn handle_timeout(&mut self) {
        if !self.timer_armed {
            trace!("Ignoring expiry of a stopped timer");
            return;
        }
        self.timer_armed = false;

        let before = self.engine.state();
        let actions = self.engine.handle_timeout();
        self.run(before, actions);
    }

    /// Hands the next crypto completion to the engine.
    ///
    /// Returns whether there was one.
    pub fn poll_crypto(&mut self) -> bool {
        match self.crypto.poll_completion() {
            Some(completion) => {
                let before = self.engine.state();
                let actions = self.engine.handle_crypto(completion);
                self.run(before, actions);
                true
            }
            None => false,
        }
    }

    /// Polls the crypto provider until it has nothing more.
    pub fn run_until_idle(&mut self) {
        while self.poll_crypto() {}
    }

    /// Returns the engine.
    pub fn engine(&self) -> &ProvisioningEngine {
        &self.engine
    }

    /// Returns the bearer.
    pub fn bearer(&self) -> &B {
        &self.bearer
    }

    /// Returns the crypto provider.
    pub fn crypto(&self) -> &C {
        &self.crypto
    }

    /// Returns the timer.
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Returns the event sink.
    pub fn events(&self) -> &E {
        &self.events
    }

    /// Returns the channel the last PDU arrived on.
    pub fn link_id(&self) -> u16 {
        self.link_id
    }

    /// Executes `actions`, then reports a session that just failed and
    /// begins the next one.
    fn run(
        &mut self,
        before: ProvisioningState,
        actions: Vec<ProvisioningAction>,
    ) {
        self.execute(actions);

        let state = self.engine.state();
        let ended = matches!(
            state,
            ProvisioningState::Failed(_) | ProvisioningState::TimedOut
        );
        if before.is_terminal() || !ended {
            return;
        }
        self.events.session_ended(state);

        // A key pair that couldn't be generated won't be on retry either
        let key_pair_failed = before == ProvisioningState::Initializing
            && matches!(
                self.engine.last_error(),
                Some(ProvisioningError::CryptoFailure(_))
            );
        if key_pair_failed {
            warn!(?state, "Not listening for provisioners anymore");
        } else {
            debug!(?state, "Listening for a new provisioner");
            self.restart();
        }
    }

    fn execute(&mut self, actions: Vec<ProvisioningAction>) {
        let mut queue = VecDeque::from(actions);
        while let Some(action) = queue.pop_front() {
            match action {
                ProvisioningAction::SendPdu(pdu) => {
                    self.bearer.send_pdu(&pdu.encode())
                }
                ProvisioningAction::Crypto(ticket, request) => {
                    if let Err(e) = self.crypto.submit(ticket, request) {
                        warn!(error = %e, "Crypto provider rejected request");
                        // Let the engine fail the session
                        queue.extend(self.engine.handle_crypto(
                            CryptoCompletion {
                                ticket,
                                result: Err(e),
                            },
                        ));
                    }
                }
                ProvisioningAction::ArmTimer(timeout) => {
                    self.timer.arm(timeout);
                    self.timer_armed = true;
                }
                ProvisioningAction::CancelTimer => {
                    self.timer.cancel();
                    self.timer_armed = false;
                }
                ProvisioningAction::Attention(duration) => {
                    self.events.attention(duration)
                }
                ProvisioningAction::OutputOob { action, value } => {
                    self.events.output_oob(action, value)
                }
                ProvisioningAction::CloseLink(reason) => {
                    self.bearer.close_link(self.link_id, reason)
                }
                ProvisioningAction::Provisioned {
                    credentials,
                    device_key,
                } => self.events.provisioned(&credentials, &device_key),
            }
        }
    }
}
