//! Session token generation

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use session_shared::constants::{SESSION_TOKEN_BYTES, SESSION_TOKEN_LEN};

/// 32 bytes from the thread-local CSPRNG, URL-safe base64 without padding.
///
/// No uniqueness check is made here; collisions are caught by the
/// create-only cache write.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// True when `token` could have come from [`generate_session_token`].
pub fn is_well_formed(token: &str) -> bool {
    if token.len() != SESSION_TOKEN_LEN {
        return false;
    }
    URL_SAFE_NO_PAD
        .decode(token)
        .map(|bytes| bytes.len() == SESSION_TOKEN_BYTES)
        .unwrap_or(false)
}
