//! EIP-191 (`personal_sign`) signature verification.

use alloy_primitives::{eip191_hash_message, hex, Address, Signature, U256};
use k256::ecdsa::SigningKey;

/// Checks that a signature over a message came from a claimed address.
///
/// Implementations never error: anything malformed is simply not a match.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, message: &str, signature: &str, claimed: Address) -> bool;
}

/// Recovers the signer of an EIP-191 personal message and compares addresses.
#[derive(Debug, Default, Clone, Copy)]
pub struct Eip191Verifier;

impl SignatureVerifier for Eip191Verifier {
    fn verify(&self, message: &str, signature: &str, claimed: Address) -> bool {
        match recover_signer(message, signature) {
            Some(signer) => signer == claimed,
            None => false,
        }
    }
}

/// Recover the address that produced `signature` over `message`.
///
/// # Arguments
/// * `message` - The exact text that was signed
/// * `signature` - Hex-encoded 65-byte `r || s || v` signature, `0x` optional
///
/// # Returns
/// * `Some(address)` if a public key could be recovered
/// * `None` if the signature is malformed or recovery fails
pub fn recover_signer(message: &str, signature: &str) -> Option<Address> {
    let bytes = hex::decode(signature.trim()).ok()?;
    if bytes.len() != 65 {
        return None;
    }

    let signature = Signature::from_raw(&bytes).ok()?;
    signature.recover_address_from_msg(message.as_bytes()).ok()
}

/// Sign `message` the way a wallet's `personal_sign` would.
///
/// Returns the `0x`-prefixed hex of the 65-byte signature.
pub fn sign_message(key: &SigningKey, message: &str) -> Result<String, k256::ecdsa::Error> {
    let hash = eip191_hash_message(message.as_bytes());
    let (sig, recovery_id) = key.sign_prehash_recoverable(hash.as_slice())?;
    let (r, s) = sig.split_bytes();
    let signature = Signature::new(
        U256::from_be_slice(&r),
        U256::from_be_slice(&s),
        recovery_id.is_y_odd(),
    );
    Ok(hex::encode_prefixed(signature.as_bytes()))
}

/// Generate a fresh secp256k1 signing key.
pub fn generate_signing_key() -> SigningKey {
    loop {
        let mut seed = zeroize::Zeroizing::new([0u8; 32]);
        rand::fill(&mut seed[..]);
        // Rejects zero and values above the curve order
        if let Ok(key) = SigningKey::from_slice(&seed[..]) {
            return key;
        }
    }
}

/// Address controlled by a signing key.
pub fn address_of(key: &SigningKey) -> Address {
    Address::from_private_key(key)
}
