//! Metadata record decryption.
//!
//! A record payload is two independently encrypted sections: a fixed
//! 16-byte head and a variable tail. Both are decoded by the same five
//! passes, whose only parameter is the section length:
//!
//! 1. the lead byte is inverted;
//! 2. the rest is XORed with a key stream that rotates right by 5 or 7;
//! 3. adjacent pairs are swapped and XORed with `0xAA`/`0x55`;
//! 4. the rest is XORed with a key stream that rotates left by 11 or 17;
//! 5. mirrored pairs are swapped and XORed with `0x0F`/`0xF0`.
//!
//! The rotate amounts are picked by a mask derived from the section length
//! that is consumed one bit per byte and reloaded when it runs out. The
//! constants were recovered from the game binary and must stay bit-exact.

use crate::error::{Result, VdrvError};

/// Length of the first encrypted section.
pub const HEAD_SECTION_LEN: usize = 0x10;

/// Key substituted whenever the rolling key wraps to zero.
const KEY_FALLBACK: u32 = 0x5A3C_96E7;

/// Decrypt one record payload in place.
///
/// The payload must hold the 16-byte head section plus at least one byte of
/// tail section.
pub fn decrypt_entry(payload: &mut [u8]) -> Result<()> {
    if payload.len() < HEAD_SECTION_LEN {
        return Err(VdrvError::out_of_range(
            0,
            HEAD_SECTION_LEN as u64,
            payload.len() as u64,
        ));
    }

    let (head, tail) = payload.split_at_mut(HEAD_SECTION_LEN);
    decrypt_section(head)?;
    decrypt_section(tail)
}

/// Decrypt one section in place. An empty section is rejected.
pub fn decrypt_section(section: &mut [u8]) -> Result<()> {
    let Some((lead, block)) = section.split_first_mut() else {
        return Err(VdrvError::out_of_range(0, 1, 0));
    };

    *lead = !*lead;

    if block.is_empty() {
        return Ok(());
    }

    let block_len = block.len() as u32;

    xor_key_stream(block, !block_len, !block_len, |key, mask| {
        let rotate = if mask & 1 != 0 { 7 } else { 5 };
        key.rotate_right(rotate)
    });

    for pair in block.chunks_exact_mut(2) {
        let (first, second) = (pair[0], pair[1]);
        pair[0] = second ^ 0xAA;
        pair[1] = first ^ 0x55;
    }

    xor_key_stream(block, block_len, block_len, |key, mask| {
        let rotate = if mask & 1 != 0 { 17 } else { 11 };
        key.rotate_left(rotate)
    });

    let last = block.len() - 1;
    for i in 0..block.len() / 2 {
        let (left, right) = (block[i], block[last - i]);
        block[i] = right ^ 0x0F;
        block[last - i] = left ^ 0xF0;
    }

    Ok(())
}

/// XOR `block` with a rolling key that starts at zero.
///
/// After each byte the key is rotated by `rotate(key, mask)`, incremented,
/// and replaced by [`KEY_FALLBACK`] if it became zero. The mask shifts right
/// once per byte and is reloaded with `reload` when it reaches zero.
fn xor_key_stream(block: &mut [u8], seed: u32, reload: u32, rotate: impl Fn(u32, u32) -> u32) {
    let mut key: u32 = 0;
    let mut mask = seed;

    for byte in block.iter_mut() {
        *byte ^= key as u8;

        let rotated = rotate(key, mask);

        mask >>= 1;
        if mask == 0 {
            mask = reload;
        }

        key = rotated.wrapping_add(1);
        if key == 0 {
            key = KEY_FALLBACK;
        }
    }
}

/// Inverse of [`decrypt_section`], used to build synthetic archives in tests.
#[cfg(test)]
pub(crate) fn encrypt_section(section: &mut [u8]) {
    let Some((lead, block)) = section.split_first_mut() else {
        return;
    };

    if !block.is_empty() {
        let block_len = block.len() as u32;

        let last = block.len() - 1;
        for i in 0..block.len() / 2 {
            let (left, right) = (block[i], block[last - i]);
            block[i] = right ^ 0xF0;
            block[last - i] = left ^ 0x0F;
        }

        xor_key_stream(block, block_len, block_len, |key, mask| {
            key.rotate_left(if mask & 1 != 0 { 17 } else { 11 })
        });

        for pair in block.chunks_exact_mut(2) {
            let (first, second) = (pair[0], pair[1]);
            pair[0] = second ^ 0x55;
            pair[1] = first ^ 0xAA;
        }

        xor_key_stream(block, !block_len, !block_len, |key, mask| {
            key.rotate_right(if mask & 1 != 0 { 7 } else { 5 })
        });
    }

    *lead = !*lead;
}

#[cfg(test)]
pub(crate) fn encrypt_entry(payload: &mut [u8]) {
    let (head, tail) = payload.split_at_mut(HEAD_SECTION_LEN);
    encrypt_section(head);
    encrypt_section(tail);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decrypted(input: &[u8]) -> Vec<u8> {
        let mut buf = input.to_vec();
        decrypt_section(&mut buf).unwrap();
        buf
    }

    #[test]
    fn single_byte_section_only_flips_lead() {
        assert_eq!(decrypted(&[0x00]), [0xFF]);
        assert_eq!(decrypted(&[0x5A]), [0xA5]);
    }

    #[test]
    fn two_byte_section_has_no_pairs() {
        // Both key streams start at zero, so the second byte is untouched.
        assert_eq!(decrypted(&[0x00, 0x00]), [0xFF, 0x00]);
        assert_eq!(decrypted(&[0x0F, 0x3C]), [0xF0, 0x3C]);
    }

    #[test]
    fn three_byte_section_golden() {
        assert_eq!(decrypted(&[0x00, 0x00, 0x00]), [0xFF, 0x5B, 0x5B]);
    }

    #[test]
    fn head_section_golden() {
        let zeros = [0u8; 16];
        assert_eq!(
            decrypted(&zeros),
            [
                0xff, 0x49, 0x16, 0xe3, 0x9e, 0xc2, 0x1e, 0xe1, 0x09, 0x0c, 0xb1, 0x5e, 0xa1,
                0x5a, 0xa4, 0x5b,
            ]
        );

        let ramp: Vec<u8> = (0..16).collect();
        assert_eq!(
            decrypted(&ramp),
            [
                0xff, 0x46, 0x1b, 0xed, 0x95, 0xce, 0x17, 0xeb, 0x0e, 0x04, 0xb4, 0x58, 0xa2,
                0x5e, 0xa5, 0x59,
            ]
        );
    }

    #[test]
    fn entry_decrypts_sections_independently() {
        let mut payload: Vec<u8> = (0..24).collect();
        decrypt_entry(&mut payload).unwrap();
        assert_eq!(
            payload,
            [
                0xff, 0x46, 0x1b, 0xed, 0x95, 0xce, 0x17, 0xeb, 0x0e, 0x04, 0xb4, 0x58, 0xa2,
                0x5e, 0xa5, 0x59, 0xef, 0x4e, 0x5b, 0xb7, 0x42, 0x4e, 0xb5, 0x49,
            ]
        );
    }

    #[test]
    fn decryption_is_deterministic() {
        let input: Vec<u8> = (0..97u8).map(|b| b.wrapping_mul(37)).collect();
        let mut a = input.clone();
        let mut b = input;
        decrypt_entry(&mut a).unwrap();
        decrypt_entry(&mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn short_payloads_are_rejected() {
        let mut short = [0u8; 15];
        assert!(matches!(
            decrypt_entry(&mut short),
            Err(VdrvError::OutOfRange { .. })
        ));

        // Exactly 16 bytes leaves an empty tail section.
        let mut head_only = [0u8; 16];
        assert!(matches!(
            decrypt_entry(&mut head_only),
            Err(VdrvError::OutOfRange { .. })
        ));

        assert!(decrypt_section(&mut []).is_err());
    }

    #[test]
    fn encrypt_section_inverts_decrypt() {
        for len in [1usize, 2, 3, 4, 16, 17, 31, 64, 255] {
            let plain: Vec<u8> = (0..len).map(|i| (i * 131 + 7) as u8).collect();
            let mut buf = plain.clone();
            encrypt_section(&mut buf);
            decrypt_section(&mut buf).unwrap();
            assert_eq!(buf, plain, "section length {len}");
        }
    }
}
