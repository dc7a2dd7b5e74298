//! Placeholder ids for optimistically rendered messages.
//!
//! The backend assigns the real `message_id`; until then a locally sent
//! message needs a stable, time-sortable key for the render sink. Format is
//! a 26-character Crockford-base32 ULID: 48 bits of millisecond timestamp
//! followed by 80 bits of randomness.

use rand::Rng;

const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Generate a new placeholder id.
pub fn generate() -> String {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    let mut rng = rand::thread_rng();
    let rand_hi: u16 = rng.r#gen();
    let rand_lo: u64 = rng.r#gen();

    let mut buf = [0u8; 26];

    let mut ts = now_ms;
    for slot in buf[..10].iter_mut().rev() {
        *slot = ALPHABET[(ts & 0x1f) as usize];
        ts >>= 5;
    }

    let mut random = ((rand_hi as u128) << 64) | rand_lo as u128;
    for slot in buf[10..].iter_mut().rev() {
        *slot = ALPHABET[(random & 0x1f) as usize];
        random >>= 5;
    }

    buf.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_and_uniqueness() {
        let a = generate();
        let b = generate();
        assert_eq!(a.len(), 26);
        assert_eq!(b.len(), 26);
        assert_ne!(a, b);
    }

    #[test]
    fn charset_is_crockford() {
        for c in generate().chars() {
            assert!(
                c.is_ascii_digit()
                    || (c.is_ascii_uppercase() && !matches!(c, 'I' | 'L' | 'O' | 'U')),
                "invalid Crockford char: {c}"
            );
        }
    }

    #[test]
    fn ids_sort_chronologically() {
        let a = generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = generate();
        assert!(a < b, "expected {a} < {b}");
    }
}
