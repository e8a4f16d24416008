use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Number of random bytes backing a session or refresh token.
pub const TOKEN_BYTES: usize = 32;

/// Generates a URL-safe random token from the OS entropy source. OsRng is a
/// CSPRNG; these tokens gate authentication and must not come from a
/// general-purpose generator.
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_url_safe_and_distinct() {
        let a = generate_secure_token();
        let b = generate_secure_token();
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        // 32 bytes -> 43 base64 characters without padding
        assert_eq!(a.len(), 43);
    }
}
