//! Short-lived request tokens tied to an action and a user.
//!
//! A token is valid during the 12 hour window it was issued in and the one
//! after it.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Action name of the public download endpoint.
pub const FILE_NONCE_ACTION: &str = "erifl_nonce";

/// Action name of the bulk edit endpoint.
pub const BULK_EDIT_NONCE_ACTION: &str = "erifl_bulk_edit_nonce";

const TICK_SECS: i64 = 12 * 60 * 60;
const TOKEN_BYTES: usize = 5;

/// Issues and checks tokens with a site secret.
#[derive(Clone)]
pub struct Nonces {
    secret: String,
}

impl std::fmt::Debug for Nonces {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nonces").finish_non_exhaustive()
    }
}

impl Nonces {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// Token for `action` and `user_id`, valid from now.
    #[must_use]
    pub fn create(&self, action: &str, user_id: i64) -> String {
        self.create_at(action, user_id, Utc::now().timestamp())
    }

    /// Token as issued at unix time `now`.
    #[must_use]
    pub fn create_at(&self, action: &str, user_id: i64, now: i64) -> String {
        self.mac(tick(now), action, user_id).map_or_else(String::new, |mac| {
            hex::encode(&mac.finalize().into_bytes()[..TOKEN_BYTES])
        })
    }

    /// Whether `token` was issued for `action` and `user_id` in the current
    /// or the previous window.
    #[must_use]
    pub fn verify(&self, token: &str, action: &str, user_id: i64) -> bool {
        self.verify_at(token, action, user_id, Utc::now().timestamp())
    }

    /// [`Nonces::verify`] evaluated at unix time `now`.
    #[must_use]
    pub fn verify_at(&self, token: &str, action: &str, user_id: i64, now: i64) -> bool {
        let Ok(tag) = hex::decode(token.trim()) else {
            return false;
        };
        if tag.len() != TOKEN_BYTES {
            return false;
        }
        let current = tick(now);
        [current, current - 1].into_iter().any(|t| {
            self.mac(t, action, user_id)
                .is_some_and(|mac| mac.verify_truncated_left(&tag).is_ok())
        })
    }

    fn mac(&self, tick: i64, action: &str, user_id: i64) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(format!("{tick}|{action}|{user_id}").as_bytes());
        Some(mac)
    }
}

fn tick(now: i64) -> i64 {
    (now + TICK_SECS - 1).div_euclid(TICK_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_729_000_000;

    #[test]
    fn test_token_verifies_for_same_action_and_user() {
        let nonces = Nonces::new("secret");
        let token = nonces.create_at(FILE_NONCE_ACTION, 0, NOW);
        assert_eq!(token.len(), 10);
        assert!(nonces.verify_at(&token, FILE_NONCE_ACTION, 0, NOW));
        assert!(!nonces.verify_at(&token, BULK_EDIT_NONCE_ACTION, 0, NOW));
        assert!(!nonces.verify_at(&token, FILE_NONCE_ACTION, 5, NOW));
        assert!(!Nonces::new("other").verify_at(&token, FILE_NONCE_ACTION, 0, NOW));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let nonces = Nonces::new("secret");
        let token = nonces.create_at(FILE_NONCE_ACTION, 0, NOW);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(nonces.verify_at(&format!(" {token} "), FILE_NONCE_ACTION, 0, NOW));
        assert!(!nonces.verify_at(&token[..8], FILE_NONCE_ACTION, 0, NOW));
        assert!(!nonces.verify_at("zzzzzzzzzz", FILE_NONCE_ACTION, 0, NOW));
        assert!(!nonces.verify_at("", FILE_NONCE_ACTION, 0, NOW));
    }

    #[test]
    fn test_token_expires_after_two_windows() {
        let nonces = Nonces::new("secret");
        let token = nonces.create_at(FILE_NONCE_ACTION, 1, NOW);
        assert!(nonces.verify_at(&token, FILE_NONCE_ACTION, 1, NOW + TICK_SECS));
        assert!(!nonces.verify_at(&token, FILE_NONCE_ACTION, 1, NOW + 2 * TICK_SECS));
    }
}
