use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// 32 random bytes, hex encoded. Used for refresh and password-reset tokens.
pub fn generate_opaque_token() -> String {
    hex::encode(random_bytes::<32>())
}

/// 32 random bytes, URL-safe base64 without padding. Used as SSO state.
pub fn generate_state() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<32>())
}
