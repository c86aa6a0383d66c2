//! RSA key pair generation
//!
//! Every certificate and signing request in this crate is backed by an RSA key
//! produced here. Output is fresh randomness on every call.

use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::Rsa;
use tracing::debug;

use crate::error::{CertError, Result};

/// RSA modulus sizes accepted by [`generate_rsa_keypair`]
pub const SUPPORTED_KEY_SIZES: [u32; 4] = [2048, 3072, 4096, 8192];

/// An RSA private key together with its modulus size.
///
/// The public half is always derivable from the private key, so only the
/// private key is held.
#[derive(Clone)]
pub struct KeyPair {
    private_key: PKey<Private>,
    bits: u32,
}

impl KeyPair {
    /// Wrap a key that was loaded rather than generated.
    pub fn from_private_key(private_key: PKey<Private>) -> Self {
        let bits = private_key.bits();
        Self { private_key, bits }
    }

    pub fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }

    /// The public half as a standalone key.
    pub fn public_key(&self) -> Result<PKey<Public>> {
        let der = self
            .private_key
            .public_key_to_der()
            .map_err(|e| CertError::signing(format!("Failed to encode public key: {}", e)))?;
        PKey::public_key_from_der(&der)
            .map_err(|e| CertError::signing(format!("Failed to decode public key: {}", e)))
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn into_private_key(self) -> PKey<Private> {
        self.private_key
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.bits)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Generate a fresh RSA key pair of `bits` bits.
///
/// # Errors
/// `KeySizeError` when `bits` is not one of [`SUPPORTED_KEY_SIZES`] or OpenSSL
/// refuses the size.
pub fn generate_rsa_keypair(bits: u32) -> Result<KeyPair> {
    if !SUPPORTED_KEY_SIZES.contains(&bits) {
        return Err(CertError::KeySizeError(bits));
    }

    debug!(bits, "generating RSA key pair");
    let rsa = Rsa::generate(bits).map_err(|_| CertError::KeySizeError(bits))?;
    let private_key = PKey::from_rsa(rsa)
        .map_err(|e| CertError::signing(format!("Failed to create private key: {}", e)))?;

    Ok(KeyPair { private_key, bits })
}
