// Password-based derivation of the header-decryption keys.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;
use zeroize::Zeroizing;

/// Salt length as stored in the header.
pub const SALT_SIZE: usize = 64;
/// Two 32-byte XTS keys.
pub const DERIVED_KEY_SIZE: usize = 64;
/// Fixed iteration count of the supported format (SHA-512, no PIM).
pub const PBKDF2_ITERATIONS: u32 = 500_000;

/// Derives the header key material from the password and the volume salt.
///
/// Deterministic; a wrong password produces key material that makes the
/// magic and checksum gates fail downstream, there is nothing to detect
/// here. The first 32 bytes are the data key, the last 32 the tweak key.
pub fn derive_header_keys(
    password: &[u8],
    salt: &[u8; SALT_SIZE],
) -> Zeroizing<[u8; DERIVED_KEY_SIZE]> {
    let mut key_material = Zeroizing::new([0u8; DERIVED_KEY_SIZE]);
    pbkdf2_hmac::<Sha512>(password, salt, PBKDF2_ITERATIONS, &mut key_material[..]);
    key_material
}
