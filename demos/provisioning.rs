use std::time::Duration;

use p256::SecretKey;
use rand_core::OsRng;
use tracing_subscriber::EnvFilter;

use mesh_provisioning::{
    crypto::{aes_cmac, ccm_encrypt, ecdh, public_key_bytes, SoftwareCrypto},
    device::{
        Bearer, PacketKind, ProvisioningDevice, ProvisioningEvents,
        TimerService,
    },
    engine::CloseReason,
    kdf::{k1, s1, session_nonce},
    pdu::{EncryptedData, Pdu, Start},
    DeviceKey, NetworkCredentials, ProvisioningConfig,
};

/// Collects what the device sends, standing in for PB-ADV.
#[derive(Default)]
struct Loopback {
    outbox: Vec<Vec<u8>>,
}

impl Bearer for Loopback {
    fn init(&mut self, device_uuid: &[u8; 16]) {
        println!("Beaconing as {}", hex::encode(device_uuid));
    }

    fn send_pdu(&mut self, pdu: &[u8]) {
        self.outbox.push(pdu.to_vec());
    }

    fn close_link(&mut self, link_id: u16, reason: CloseReason) {
        println!("Closing link {} with reason {:?}", link_id, reason);
    }
}

struct NoTimer;

impl TimerService for NoTimer {
    fn arm(&mut self, _timeout: Duration) {}

    fn cancel(&mut self) {}
}

#[derive(Default)]
struct Display {
    digit: u8,
}

impl ProvisioningEvents for Display {
    fn provisioned(
        &mut self,
        credentials: &NetworkCredentials,
        device_key: &DeviceKey,
    ) {
        println!(
            "Provisioned as {:#06x} with device key {}",
            credentials.unicast_address,
            hex::encode(device_key)
        );
    }

    fn output_oob(&mut self, _action: u8, value: u8) {
        println!("Displaying {}", value);
        self.digit = value;
    }
}

type Device = ProvisioningDevice<Loopback, SoftwareCrypto, NoTimer, Display>;

/// Delivers a PDU to the device and returns its last reply.
fn send(device: &mut Device, pdu: Pdu) -> Option<Pdu> {
    device.handle_packet(PacketKind::ProvisioningData, 1, &pdu.encode());
    device.run_until_idle();
    device
        .bearer()
        .outbox
        .last()
        .map(|bytes| Pdu::decode(bytes).unwrap())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Device -----------------------------------------------------------------

    let mut device = ProvisioningDevice::new(
        ProvisioningConfig::default(),
        Loopback::default(),
        SoftwareCrypto::new(),
        NoTimer,
        Display::default(),
    );
    device.init(&[0xDD; 16]);
    device.run_until_idle();

    // Provisioner ------------------------------------------------------------

    let secret = SecretKey::random(&mut OsRng);
    let public = public_key_bytes(&secret);
    let mut inputs = vec![0x00];

    let invite = Pdu::Invite {
        attention_duration: 0,
    };
    let capabilities = match send(&mut device, invite) {
        Some(Pdu::Capabilities(capabilities)) => capabilities,
        other => panic!("Expected Capabilities, got {:?}", other),
    };
    inputs.extend_from_slice(&capabilities.to_bytes());

    // Ask for a single digit, shown as a number
    let start = Start {
        algorithm: 0,
        public_key_type: 0,
        auth_method: 2,
        auth_action: 3,
        auth_size: 1,
    };
    send(&mut device, Pdu::Start(start));
    inputs.extend_from_slice(&start.to_bytes());

    let device_public = match send(&mut device, Pdu::PublicKey(public)) {
        Some(Pdu::PublicKey(key)) => key,
        other => panic!("Expected PublicKey, got {:?}", other),
    };
    inputs.extend_from_slice(&public);
    inputs.extend_from_slice(&device_public);
    let dhkey = ecdh(&secret, &device_public).unwrap();

    let confirmation_salt = s1(&inputs);
    let confirmation_key = k1(&dhkey, &confirmation_salt, b"prck");
    let random = [0x42; 16];

    let device_confirmation =
        match send(&mut device, Pdu::Confirmation([0; 16])) {
            Some(Pdu::Confirmation(value)) => value,
            other => panic!("Expected Confirmation, got {:?}", other),
        };
    // The user types in what the device displays
    let mut auth_value = [0; 16];
    auth_value[15] = device.events().digit;

    let device_random = match send(&mut device, Pdu::Random(random)) {
        Some(Pdu::Random(value)) => value,
        other => panic!("Expected Random, got {:?}", other),
    };
    let mut message = device_random.to_vec();
    message.extend_from_slice(&auth_value);
    assert_eq!(aes_cmac(&confirmation_key, &message), device_confirmation);
    println!("Device confirmation verified");

    let mut salt_input = confirmation_salt.to_vec();
    salt_input.extend_from_slice(&random);
    salt_input.extend_from_slice(&device_random);
    let provisioning_salt = s1(&salt_input);
    let session_key = k1(&dhkey, &provisioning_salt, b"prsk");
    let nonce = session_nonce(k1(&dhkey, &provisioning_salt, b"prsn"));
    let mut ccm_nonce = [0; 13];
    ccm_nonce.copy_from_slice(&nonce[3..]);

    let credentials = NetworkCredentials {
        network_key: [0x7D; 16],
        key_index: 0,
        flags: 0,
        iv_index: 0x1234_5678,
        unicast_address: 0x0B0C,
    };
    let plaintext = credentials.to_bytes();
    let ciphertext =
        ccm_encrypt(&session_key, &ccm_nonce, &plaintext).unwrap();
    let mut data = EncryptedData {
        data: [0; 25],
        mic: [0; 8],
    };
    data.data.copy_from_slice(&ciphertext[..25]);
    data.mic.copy_from_slice(&ciphertext[25..]);

    match send(&mut device, Pdu::Data(data)) {
        Some(Pdu::Complete) => println!("Provisioning complete"),
        other => panic!("Expected Complete, got {:?}", other),
    }
}
