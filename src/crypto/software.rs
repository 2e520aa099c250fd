use aes::Aes128;
use alloc::vec::Vec;
use ccm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    consts::{U13, U8},
    Ccm,
};
use cmac::{Cmac, Mac};
use p256::{elliptic_curve::sec1::ToEncodedPoint, PublicKey, SecretKey};
use rand_core::{CryptoRng, OsRng, RngCore};

use super::{
    CryptoCompletion, CryptoError, CryptoProvider, CryptoRequest,
    CryptoResponse, CryptoTicket, DHKEY_LEN, KEY_LEN, MAC_LEN, NONCE_LEN,
    PUBLIC_KEY_LEN,
};

/// A [`CryptoProvider`] doing all work in software, completing every request
/// as soon as it's submitted.
pub struct SoftwareCrypto<R = OsRng> {
    rng: R,
    fixed_secret: Option<SecretKey>,
    secret: Option<SecretKey>,
    completion: Option<CryptoCompletion>,
}

impl SoftwareCrypto<OsRng> {
    /// Creates a provider drawing randomness from the operating system.
    pub fn new() -> SoftwareCrypto<OsRng> {
        SoftwareCrypto::with_rng(OsRng)
    }
}

impl Default for SoftwareCrypto<OsRng> {
    fn default() -> Self {
        SoftwareCrypto::new()
    }
}

impl<R: CryptoRng + RngCore> SoftwareCrypto<R> {
    /// Creates a provider drawing randomness from `rng`.
    pub fn with_rng(rng: R) -> SoftwareCrypto<R> {
        SoftwareCrypto {
            rng,
            fixed_secret: None,
            secret: None,
            completion: None,
        }
    }

    /// Makes every `GenerateKeyPair` request use `secret` instead of
    /// generating a fresh key.
    ///
    /// Only useful for reproducing test vectors.
    pub fn with_secret_key(mut self, secret: SecretKey) -> SoftwareCrypto<R> {
        self.fixed_secret = Some(secret);
        self
    }

    /// Performs a request synchronously.
    pub fn perform(
        &mut self,
        request: CryptoRequest,
    ) -> Result<CryptoResponse, CryptoError> {
        Ok(match request {
            CryptoRequest::GenerateKeyPair => {
                let secret = match &self.fixed_secret {
                    Some(secret) => secret.clone(),
                    None => SecretKey::random(&mut self.rng),
                };
                let public = public_key_bytes(&secret);
                self.secret = Some(secret);
                CryptoResponse::KeyPair { public }
            }
            CryptoRequest::SharedSecret { remote_public } => {
                let secret =
                    self.secret.as_ref().ok_or(CryptoError::NoKeyPair)?;
                CryptoResponse::SharedSecret(ecdh(secret, &remote_public)?)
            }
            CryptoRequest::Mac { key, message } => {
                CryptoResponse::Mac(aes_cmac(&key, &message))
            }
            CryptoRequest::MacZeroKey { message } => {
                CryptoResponse::Mac(aes_cmac(&[0; KEY_LEN], &message))
            }
            CryptoRequest::AuthDecrypt {
                key,
                nonce,
                ciphertext,
            } => CryptoResponse::Plaintext(ccm_decrypt(
                &key,
                &nonce,
                &ciphertext,
            )?),
            CryptoRequest::RandomBytes { len } => {
                let mut bytes = vec![0; len];
                self.rng.try_fill_bytes(&mut bytes)?;
                CryptoResponse::Random(bytes)
            }
        })
    }
}

impl<R: CryptoRng + RngCore> CryptoProvider for SoftwareCrypto<R> {
    fn submit(
        &mut self,
        ticket: CryptoTicket,
        request: CryptoRequest,
    ) -> Result<(), CryptoError> {
        if self.completion.is_some() {
            return Err(CryptoError::Busy);
        }
        let result = self.perform(request);
        self.completion = Some(CryptoCompletion { ticket, result });

        Ok(())
    }

    fn poll_completion(&mut self) -> Option<CryptoCompletion> {
        self.completion.take()
    }

    fn cancel(&mut self) {
        self.completion = None;
    }
}

/// Returns the AES-CMAC of `message` under `key`.
pub fn aes_cmac(key: &[u8; KEY_LEN], message: &[u8]) -> [u8; MAC_LEN] {
    let mut mac = <Cmac<Aes128> as Mac>::new(GenericArray::from_slice(key));
    mac.update(message);
    let mut tag = [0; MAC_LEN];
    tag.copy_from_slice(&mac.finalize().into_bytes());

    tag
}

/// Decrypts and authenticates `ciphertext`, the MIC being its last 8 bytes.
pub fn ccm_decrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let ccm: Ccm<Aes128, U8, U13> = Ccm::new(GenericArray::from_slice(key));
    let plaintext = ccm.decrypt(
        GenericArray::from_slice(nonce),
        Payload {
            msg: ciphertext,
            aad: &[],
        },
    )?;

    Ok(plaintext)
}

/// Encrypts `plaintext`, appending the 8 byte MIC.
pub fn ccm_encrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let ccm: Ccm<Aes128, U8, U13> = Ccm::new(GenericArray::from_slice(key));
    let ciphertext = ccm.encrypt(
        GenericArray::from_slice(nonce),
        Payload {
            msg: plaintext,
            aad: &[],
        },
    )?;

    Ok(ciphertext)
}

/// Returns the public key of `secret` as X followed by Y.
pub fn public_key_bytes(secret: &SecretKey) -> [u8; PUBLIC_KEY_LEN] {
    let point = secret.public_key().to_encoded_point(false);
    let mut public = [0; PUBLIC_KEY_LEN];
    // Skip the SEC1 tag
    public.copy_from_slice(&point.as_bytes()[1..]);

    public
}

/// Returns the X coordinate of the shared point.
pub fn ecdh(
    secret: &SecretKey,
    remote_public: &[u8; PUBLIC_KEY_LEN],
) -> Result<[u8; DHKEY_LEN], CryptoError> {
    let mut sec1 = [0; PUBLIC_KEY_LEN + 1];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(remote_public);
    let public = PublicKey::from_sec1_bytes(&sec1)?;

    let shared = p256::ecdh::diffie_hellman(
        secret.to_nonzero_scalar(),
        public.as_affine(),
    );
    let mut dhkey = [0; DHKEY_LEN];
    dhkey.copy_from_slice(shared.raw_secret_bytes());

    Ok(dhkey)
}
