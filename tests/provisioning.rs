use aes::Aes128;
use ccm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    consts::{U13, U8},
    Ccm,
};
use cmac::{Cmac, Mac};
use mesh_provisioning::{
    crypto::SoftwareCrypto,
    device::{
        Bearer, PacketKind, ProvisioningDevice, ProvisioningEvents,
        TimerService,
    },
    engine::{CloseReason, FailureReason},
    pdu::{Capabilities, EncryptedData, ErrorCode, Pdu, Start},
    DeviceKey, NetworkCredentials, ProvisioningConfig, ProvisioningState,
};
use p256::{
    ecdh::diffie_hellman, elliptic_curve::sec1::ToEncodedPoint, PublicKey,
    SecretKey,
};
use rand::{rngs::StdRng, SeedableRng};
use std::time::Duration;

// The provisioner's primitives, built straight on RustCrypto ------------------

fn cmac(key: &[u8; 16], message: &[u8]) -> [u8; 16] {
    let mut mac = <Cmac<Aes128> as Mac>::new(GenericArray::from_slice(key));
    mac.update(message);
    let mut tag = [0; 16];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    tag
}

fn s1(message: &[u8]) -> [u8; 16] {
    cmac(&[0; 16], message)
}

fn k1(n: &[u8], salt: &[u8; 16], p: &[u8]) -> [u8; 16] {
    cmac(&cmac(salt, n), p)
}

fn public_key_bytes(secret: &SecretKey) -> [u8; 64] {
    let point = secret.public_key().to_encoded_point(false);
    let mut public = [0; 64];
    public.copy_from_slice(&point.as_bytes()[1..]);
    public
}

fn ecdh(secret: &SecretKey, remote: &[u8; 64]) -> [u8; 32] {
    let mut sec1 = vec![0x04];
    sec1.extend_from_slice(remote);
    let remote = PublicKey::from_sec1_bytes(&sec1).unwrap();
    let shared =
        diffie_hellman(secret.to_nonzero_scalar(), remote.as_affine());
    let mut dhkey = [0; 32];
    dhkey.copy_from_slice(shared.raw_secret_bytes());
    dhkey
}

fn ccm_encrypt(
    key: &[u8; 16],
    nonce: &[u8; 13],
    plaintext: &[u8],
) -> Vec<u8> {
    let ccm: Ccm<Aes128, U8, U13> = Ccm::new(GenericArray::from_slice(key));
    ccm.encrypt(GenericArray::from_slice(nonce), plaintext).unwrap()
}

const LINK: u16 = 0x4242;

#[derive(Default)]
struct Link {
    inbox: Vec<Pdu>,
    closed: Vec<(u16, CloseReason)>,
}

impl Bearer for Link {
    fn init(&mut self, _device_uuid: &[u8; 16]) {}

    fn send_pdu(&mut self, pdu: &[u8]) {
        self.inbox.push(Pdu::decode(pdu).unwrap());
    }

    fn close_link(&mut self, link_id: u16, reason: CloseReason) {
        self.closed.push((link_id, reason));
    }
}

#[derive(Default)]
struct Timer {
    armed: bool,
}

impl TimerService for Timer {
    fn arm(&mut self, _timeout: Duration) {
        self.armed = true;
    }

    fn cancel(&mut self) {
        self.armed = false;
    }
}

#[derive(Default)]
struct Node {
    provisioned: Option<(NetworkCredentials, DeviceKey)>,
    displayed: Option<u8>,
    ended: Vec<ProvisioningState>,
}

impl ProvisioningEvents for Node {
    fn provisioned(
        &mut self,
        credentials: &NetworkCredentials,
        device_key: &DeviceKey,
    ) {
        self.provisioned = Some((*credentials, *device_key));
    }

    fn output_oob(&mut self, _action: u8, value: u8) {
        self.displayed = Some(value);
    }

    fn session_ended(&mut self, state: ProvisioningState) {
        self.ended.push(state);
    }
}

type Device = ProvisioningDevice<Link, SoftwareCrypto<StdRng>, Timer, Node>;

/// The provisioner's half of the handshake, computed independently of the
/// device's engine.
struct Provisioner {
    secret: SecretKey,
    inputs: Vec<u8>,
    dhkey: [u8; 32],
    confirmation_salt: [u8; 16],
    confirmation_key: [u8; 16],
    auth_value: [u8; 16],
    random: [u8; 16],
    provisioning_salt: [u8; 16],
}

impl Provisioner {
    fn new() -> Provisioner {
        Provisioner {
            secret: SecretKey::from_slice(&[0x5C; 32]).unwrap(),
            inputs: Vec::new(),
            dhkey: [0; 32],
            confirmation_salt: [0; 16],
            confirmation_key: [0; 16],
            auth_value: [0; 16],
            random: [0x21; 16],
            provisioning_salt: [0; 16],
        }
    }

    fn public(&self) -> [u8; 64] {
        public_key_bytes(&self.secret)
    }
}

fn start() -> Start {
    Start {
        algorithm: 0,
        public_key_type: 0,
        auth_method: 2,
        auth_action: 3,
        auth_size: 1,
    }
}

fn credentials() -> NetworkCredentials {
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

fn device() -> Device {
    let mut device = ProvisioningDevice::new(
        ProvisioningConfig::default(),
        Link::default(),
        SoftwareCrypto::with_rng(StdRng::seed_from_u64(2024)),
        Timer::default(),
        Node::default(),
    );
    device.init(&[0x01; 16]);
    device.run_until_idle();
    device
}

/// Sends a PDU and returns the device's replies.
fn exchange(device: &mut Device, pdu: &Pdu) -> Vec<Pdu> {
    let before = device.bearer().inbox.len();
    device.handle_packet(PacketKind::ProvisioningData, LINK, &pdu.encode());
    device.run_until_idle();
    device.bearer().inbox[before..].to_vec()
}

fn single(replies: Vec<Pdu>) -> Pdu {
    assert_eq!(1, replies.len(), "Expected one reply, got {:?}", replies);
    replies.into_iter().next().unwrap()
}

/// Runs the handshake up to the point where the provisioner sends `Data`,
/// returning the session key and nonce.
fn handshake(
    device: &mut Device,
    provisioner: &mut Provisioner,
) -> ([u8; 16], [u8; 13]) {
    let invite = Pdu::Invite {
        attention_duration: 0,
    };
    let capabilities = match single(exchange(device, &invite)) {
        Pdu::Capabilities(capabilities) => capabilities,
        other => panic!("Expected Capabilities, got {:?}", other),
    };
    assert_eq!(Capabilities::default(), capabilities);
    assert_eq!(1, capabilities.elements);
    provisioner.inputs.push(0x00);
    provisioner.inputs.extend_from_slice(&capabilities.to_bytes());

    let start_pdu = Pdu::Start(start());
    assert_eq!(vec![0x02, 0x00, 0x00, 0x02, 0x03, 0x01], start_pdu.encode());
    assert!(exchange(device, &start_pdu).is_empty());
    provisioner.inputs.extend_from_slice(&start().to_bytes());

    let public = provisioner.public();
    let device_public =
        match single(exchange(device, &Pdu::PublicKey(public))) {
            Pdu::PublicKey(key) => key,
            other => panic!("Expected PublicKey, got {:?}", other),
        };
    provisioner.inputs.extend_from_slice(&public);
    provisioner.inputs.extend_from_slice(&device_public);
    assert_eq!(145, provisioner.inputs.len());
    provisioner.dhkey = ecdh(&provisioner.secret, &device_public);

    provisioner.confirmation_salt = s1(&provisioner.inputs);
    provisioner.confirmation_key =
        k1(&provisioner.dhkey, &provisioner.confirmation_salt, b"prck");

    // The device shows its digit once it has computed its confirmation, so
    // the provisioner's confirmation is sent without it
    let confirmation = Pdu::Confirmation([0x99; 16]);
    let device_confirmation = match single(exchange(device, &confirmation)) {
        Pdu::Confirmation(value) => value,
        other => panic!("Expected Confirmation, got {:?}", other),
    };
    let digit = device.events().displayed.unwrap();
    assert!((1..=9).contains(&digit));
    provisioner.auth_value[15] = digit;

    let device_random =
        match single(exchange(device, &Pdu::Random(provisioner.random))) {
            Pdu::Random(random) => random,
            other => panic!("Expected Random, got {:?}", other),
        };

    let mut message = device_random.to_vec();
    message.extend_from_slice(&provisioner.auth_value);
    assert_eq!(
        cmac(&provisioner.confirmation_key, &message),
        device_confirmation
    );

    let mut salt_input = provisioner.confirmation_salt.to_vec();
    salt_input.extend_from_slice(&provisioner.random);
    salt_input.extend_from_slice(&device_random);
    provisioner.provisioning_salt = s1(&salt_input);

    let session_key =
        k1(&provisioner.dhkey, &provisioner.provisioning_salt, b"prsk");
    let nonce = k1(&provisioner.dhkey, &provisioner.provisioning_salt, b"prsn");
    let mut ccm_nonce = [0; 13];
    ccm_nonce.copy_from_slice(&nonce[3..]);

    (session_key, ccm_nonce)
}

fn data_pdu(session_key: &[u8; 16], nonce: &[u8; 13], tamper: bool) -> Pdu {
    let mut ciphertext =
        ccm_encrypt(session_key, nonce, &credentials().to_bytes());
    assert_eq!(33, ciphertext.len());
    if tamper {
        ciphertext[3] ^= 0x10;
    }

    let mut data = EncryptedData {
        data: [0; 25],
        mic: [0; 8],
    };
    data.data.copy_from_slice(&ciphertext[..25]);
    data.mic.copy_from_slice(&ciphertext[25..]);
    Pdu::Data(data)
}

#[test]
fn end_to_end() {
    let mut device = device();
    let mut provisioner = Provisioner::new();
    let (session_key, nonce) = handshake(&mut device, &mut provisioner);

    let replies = exchange(&mut device, &data_pdu(&session_key, &nonce, false));
    assert_eq!(vec![Pdu::Complete], replies);
    assert_eq!(ProvisioningState::Complete, device.engine().state());

    let (delivered, device_key) = device.events().provisioned.unwrap();
    assert_eq!(credentials(), delivered);
    assert_eq!(0x0001, delivered.unicast_address);
    assert_eq!(
        k1(&provisioner.dhkey, &provisioner.provisioning_salt, b"prdk"),
        device_key
    );

    assert!(!device.timer().armed);
    assert!(device.bearer().closed.is_empty());
}

#[test]
fn tampered_data() {
    let mut device = device();
    let mut provisioner = Provisioner::new();
    let (session_key, nonce) = handshake(&mut device, &mut provisioner);

    let replies = exchange(&mut device, &data_pdu(&session_key, &nonce, true));
    assert_eq!(vec![Pdu::Failed(ErrorCode::DecryptionFailed)], replies);
    assert_eq!(
        vec![ProvisioningState::Failed(FailureReason::Local(
            ErrorCode::DecryptionFailed
        ))],
        device.events().ended
    );
    assert!(device.events().provisioned.is_none());
    assert_eq!(vec![(LINK, CloseReason::Fail)], device.bearer().closed);
    assert!(!device.timer().armed);

    // Listening again with a fresh key pair
    assert_eq!(ProvisioningState::AwaitInvite, device.engine().state());
    let mut provisioner = Provisioner::new();
    let (session_key, nonce) = handshake(&mut device, &mut provisioner);
    let replies = exchange(&mut device, &data_pdu(&session_key, &nonce, false));
    assert_eq!(vec![Pdu::Complete], replies);
}

#[test]
fn wrong_length_is_rejected() {
    let mut device = device();
    let mut packet = Pdu::Invite {
        attention_duration: 0,
    }
    .encode();
    packet.push(0x00);

    device.handle_packet(PacketKind::ProvisioningData, LINK, &packet);
    device.run_until_idle();
    assert_eq!(
        vec![Pdu::Failed(ErrorCode::InvalidFormat)],
        device.bearer().inbox
    );
    assert_eq!(vec![(LINK, CloseReason::Fail)], device.bearer().closed);
}

#[test]
fn retry_after_timeout() {
    let mut device = device();
    exchange(
        &mut device,
        &Pdu::Invite {
            attention_duration: 0,
        },
    );
    device.handle_timeout();
    device.run_until_idle();
    assert_eq!(vec![ProvisioningState::TimedOut], device.events().ended);
    assert_eq!(vec![(LINK, CloseReason::Timeout)], device.bearer().closed);

    // The provisioner's retry runs a fresh session
    let mut provisioner = Provisioner::new();
    let (session_key, nonce) = handshake(&mut device, &mut provisioner);
    exchange(&mut device, &data_pdu(&session_key, &nonce, false));
    assert_eq!(ProvisioningState::Complete, device.engine().state());
}

#[test]
fn restart_mid_session() {
    let mut device = device();
    exchange(
        &mut device,
        &Pdu::Invite {
            attention_duration: 0,
        },
    );
    device.restart();
    device.run_until_idle();
    assert!(!device.timer().armed);
    assert!(device.events().ended.is_empty());

    let mut provisioner = Provisioner::new();
    let (session_key, nonce) = handshake(&mut device, &mut provisioner);
    exchange(&mut device, &data_pdu(&session_key, &nonce, false));
    assert_eq!(ProvisioningState::Complete, device.engine().state());
}
