//! Pluggable field-level encryption seam.
//!
//! Key management lives outside this crate; the codec only needs the two
//! transform hooks. An encrypted attribute whose mapper has no cipher
//! configured fails fast instead of persisting plaintext.

use tablemap_core::Result;

/// Encrypts and decrypts individual attribute values at rest.
///
/// Injected per mapper instance. Implementations are expected to be cheap
/// to call per attribute (e.g. envelope encryption with a cached data key).
pub trait FieldCipher: Send + Sync {
    fn encrypt_field(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    fn decrypt_field(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}
