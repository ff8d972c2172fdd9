//! Razorpay payment signature: `hex(HMAC-SHA256(key_secret, "<order_id>|<payment_id>"))`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &[u8], order_id: &str, payment_id: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    Some(mac)
}

/// Compute the signature the gateway would attach to this order/payment pair.
#[cfg(test)]
pub fn expected_signature(secret: &[u8], order_id: &str, payment_id: &str) -> String {
    let mac = mac_for(secret, order_id, payment_id).unwrap();
    hex::encode(mac.finalize().into_bytes())
}

/// Check a callback signature in constant time.
///
/// The gateway sends lowercase hex; anything else, including the uppercase
/// spelling of the right MAC, is rejected.
pub fn verify_signature(secret: &[u8], order_id: &str, payment_id: &str, signature: &str) -> bool {
    if !signature
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return false;
    }
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };
    mac_for(secret, order_id, payment_id)
        .is_some_and(|mac| mac.verify_slice(&provided).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"rzp_test_secret";

    #[test]
    fn signs_pipe_joined_ids() {
        let direct = {
            let mut mac = HmacSha256::new_from_slice(b"Jefe").unwrap();
            mac.update(b"order_abc|pay_123");
            hex::encode(mac.finalize().into_bytes())
        };
        assert_eq!(expected_signature(b"Jefe", "order_abc", "pay_123"), direct);
        assert_eq!(direct.len(), 64);
    }

    #[test]
    fn accepts_exact_signature() {
        let sig = expected_signature(SECRET, "order_abc", "pay_123");
        assert!(verify_signature(SECRET, "order_abc", "pay_123", &sig));
    }

    #[test]
    fn rejects_uppercase_hex() {
        let sig = expected_signature(SECRET, "order_abc", "pay_123").to_uppercase();
        assert!(!verify_signature(SECRET, "order_abc", "pay_123", &sig));
    }

    #[test]
    fn rejects_every_single_character_mutation() {
        let sig = expected_signature(SECRET, "order_abc", "pay_123");
        let alphabet = b"0123456789abcdefABCDEFxz ";
        for i in 0..sig.len() {
            for &c in alphabet {
                let mut bytes = sig.clone().into_bytes();
                if bytes[i] == c {
                    continue;
                }
                bytes[i] = c;
                let mutated = String::from_utf8(bytes).unwrap();
                assert!(
                    !verify_signature(SECRET, "order_abc", "pay_123", &mutated),
                    "mutation {:?} at {i} accepted",
                    c as char
                );
            }
        }
    }

    #[test]
    fn rejects_truncated_extended_and_non_hex() {
        let sig = expected_signature(SECRET, "order_abc", "pay_123");
        assert!(!verify_signature(SECRET, "order_abc", "pay_123", &sig[..62]));
        assert!(!verify_signature(
            SECRET,
            "order_abc",
            "pay_123",
            &format!("{sig}00")
        ));
        assert!(!verify_signature(SECRET, "order_abc", "pay_123", "zz"));
        assert!(!verify_signature(SECRET, "order_abc", "pay_123", ""));
    }

    #[test]
    fn rejects_other_secret_or_swapped_ids() {
        let sig = expected_signature(SECRET, "order_abc", "pay_123");
        assert!(!verify_signature(b"other", "order_abc", "pay_123", &sig));
        assert!(!verify_signature(SECRET, "pay_123", "order_abc", &sig));
        assert!(!verify_signature(SECRET, "order_abc", "pay_124", &sig));
    }
}
