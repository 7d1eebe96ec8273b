//! Key material: ed25519 family seeds and classic addresses.
//!
//! Seeds carry 16 bytes of entropy behind the three-byte `sEd` version
//! prefix, base58-encoded with the ripple alphabet and a double-SHA256
//! checksum. The signing key is the SHA-512 half of the entropy; account
//! ids are RIPEMD160(SHA256(0xED || verifying key)).

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use rand::RngCore;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Version prefix for ed25519 family seeds ("sEd...").
const SEED_PREFIX: [u8; 3] = [0x01, 0xE1, 0x4B];
/// Version byte for classic account addresses ("r...").
const ACCOUNT_PREFIX: u8 = 0x00;
/// Key-type marker prepended to the raw verifying key.
const ED25519_MARKER: u8 = 0xED;

/// Signing identity derived from a family seed.
pub struct Keypair {
    signing: SigningKey,
    seed: String,
}

impl Keypair {
    /// Fresh random identity.
    pub fn generate() -> Self {
        let mut entropy = Zeroizing::new([0u8; 16]);
        rand::thread_rng().fill_bytes(&mut entropy[..]);
        let seed = encode_seed(&entropy);
        Self { signing: signing_key(&entropy), seed }
    }

    /// Rebuild the identity from an encoded `sEd...` seed.
    pub fn from_seed(seed: &str) -> Result<Self> {
        let entropy = decode_seed(seed)?;
        Ok(Self { signing: signing_key(&entropy), seed: seed.to_string() })
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Uppercase hex of the marker byte plus the raw verifying key.
    pub fn public_key_hex(&self) -> String {
        let mut bytes = vec![ED25519_MARKER];
        bytes.extend_from_slice(self.signing.verifying_key().as_bytes());
        hex::encode_upper(bytes)
    }

    /// Classic address ("r...") for this identity.
    pub fn address(&self) -> String {
        let mut prefixed = vec![ED25519_MARKER];
        prefixed.extend_from_slice(self.signing.verifying_key().as_bytes());
        let account_id = Ripemd160::digest(Sha256::digest(&prefixed));

        let mut payload = vec![ACCOUNT_PREFIX];
        payload.extend_from_slice(&account_id);
        base58check_encode(&payload)
    }

    /// Detached signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }

    /// Verify a detached signature made by this identity.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.signing.verifying_key().verify(message, signature).is_ok()
    }
}

fn signing_key(entropy: &[u8; 16]) -> SigningKey {
    let secret = Zeroizing::new(sha512_half(entropy));
    SigningKey::from_bytes(&secret)
}

/// First 32 bytes of SHA-512.
pub fn sha512_half(data: &[u8]) -> [u8; 32] {
    let digest = Sha512::digest(data);
    let mut half = [0u8; 32];
    half.copy_from_slice(&digest[..32]);
    half
}

fn encode_seed(entropy: &[u8; 16]) -> String {
    let mut payload = SEED_PREFIX.to_vec();
    payload.extend_from_slice(entropy);
    base58check_encode(&payload)
}

fn decode_seed(seed: &str) -> Result<Zeroizing<[u8; 16]>> {
    let payload = base58check_decode(seed)?;
    let entropy = payload
        .strip_prefix(&SEED_PREFIX[..])
        .filter(|rest| rest.len() == 16)
        .ok_or_else(|| Error::Keys("not an ed25519 family seed".into()))?;
    let mut out = Zeroizing::new([0u8; 16]);
    out.copy_from_slice(entropy);
    Ok(out)
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(Sha256::digest(payload));
    let mut check = [0u8; 4];
    check.copy_from_slice(&digest[..4]);
    check
}

fn base58check_encode(payload: &[u8]) -> String {
    let mut bytes = payload.to_vec();
    bytes.extend_from_slice(&checksum(payload));
    bs58::encode(bytes).with_alphabet(bs58::Alphabet::RIPPLE).into_string()
}

fn base58check_decode(encoded: &str) -> Result<Vec<u8>> {
    let bytes = bs58::decode(encoded)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_vec()
        .map_err(|e| Error::Keys(format!("base58: {}", e)))?;
    if bytes.len() < 5 {
        return Err(Error::Keys("truncated".into()));
    }
    let (payload, check) = bytes.split_at(bytes.len() - 4);
    if checksum(payload) != check {
        return Err(Error::Keys("checksum mismatch".into()));
    }
    Ok(payload.to_vec())
}
