//! Masking, per RFC 6455 §5.3.
//!
//! All frames sent from a client to a server must be masked by a four-byte
//! value, usually random. Each byte of the payload is XOR'd with the
//! corresponding byte (modulo 4) of the mask; applying the same XOR a second
//! time with the same key recovers the original payload.

use rand::Rng;

pub fn generate_mask_key() -> [u8; 4] {
    rand::thread_rng().gen::<[u8; 4]>()
}

/// XORs `payload` in place against `key`, cycling the key every 4 bytes.
/// Applying this twice with the same key is the identity transform.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Same as [`apply_mask`] but returns a new buffer, leaving `payload` untouched.
pub fn masked_copy(payload: &[u8], key: [u8; 4]) -> Vec<u8> {
    payload
        .iter()
        .enumerate()
        .map(|(i, &byte)| byte ^ key[i % 4])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking_is_an_involution() {
        let key = [0x12, 0x34, 0x56, 0x78];
        let original = b"Hello! Vapor rules the most".to_vec();

        let mut round_tripped = original.clone();
        apply_mask(&mut round_tripped, key);
        apply_mask(&mut round_tripped, key);

        assert_eq!(round_tripped, original);
    }

    #[test]
    fn masked_copy_matches_in_place_mask() {
        let key = [1, 2, 3, 4];
        let payload = b"payload bytes".to_vec();

        let copy = masked_copy(&payload, key);

        let mut in_place = payload.clone();
        apply_mask(&mut in_place, key);

        assert_eq!(copy, in_place);
    }

    #[test]
    fn empty_payload_is_unaffected() {
        let mut payload: Vec<u8> = Vec::new();
        apply_mask(&mut payload, [9, 9, 9, 9]);
        assert!(payload.is_empty());
    }

    #[test]
    fn mask_keys_are_not_trivially_repeated() {
        let a = generate_mask_key();
        let b = generate_mask_key();
        // Statistically near-certain with a 32-bit random key; guards against a
        // degenerate all-zero or hardcoded mask generator.
        assert_ne!(a, b);
    }
}
