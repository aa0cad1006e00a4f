// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Utilities to make working with raw register words less terrible.

use crate::Error;

/// Return a mask with `width` bits set, starting at bit `pos`.
///
/// The range must fit in a 64-bit word.
pub const fn bit_mask(pos: u8, width: u8) -> Result<u64, Error> {
    if width == 0 || pos as u32 + width as u32 > 64 {
        return Err(Error::BitOutOfRange);
    }
    let ones = if width == 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    };
    Ok(ones << pos)
}

/// Extract `width` bits starting at `pos` from a word, shifted down to bit 0.
pub fn extract_bits(word: u64, pos: u8, width: u8) -> Result<u64, Error> {
    let mask = bit_mask(pos, width)?;
    Ok((word & mask) >> pos)
}

/// Place `value` into `width` bits starting at `pos`.
///
/// Fails if the value does not fit in the bit range.
pub fn insert_bits(value: u64, pos: u8, width: u8) -> Result<u64, Error> {
    let mask = bit_mask(pos, width)?;
    if (value << pos) >> pos != value || (value << pos) & !mask != 0 {
        return Err(Error::BitOutOfRange);
    }
    Ok(value << pos)
}

/// Assemble a word from up to 8 bytes with the given byte order.
pub fn word_from_bytes(buf: &[u8], big_endian: bool) -> u64 {
    let fold = |acc: u64, byte: &u8| (acc << 8) | u64::from(*byte);
    if big_endian {
        buf.iter().fold(0, fold)
    } else {
        buf.iter().rev().fold(0, fold)
    }
}

/// Split the low `width` bytes of a word into bytes with the given order.
///
/// Widths beyond 8 bytes are padded with zeros.
pub fn word_to_bytes(word: u64, width: usize, big_endian: bool) -> Vec<u8> {
    let be = word.to_be_bytes();
    let mut out = vec![0; width.saturating_sub(be.len())];
    out.extend_from_slice(&be[be.len() - width.min(be.len())..]);
    if !big_endian {
        out.reverse();
    }
    out
}

/// Format raw bytes as dash-separated hex, like an OUI.
pub fn format_hex(buf: &[u8]) -> String {
    buf.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::bit_mask;
    use super::extract_bits;
    use super::format_hex;
    use super::insert_bits;
    use super::word_from_bytes;
    use super::word_to_bytes;

    #[test]
    fn test_bit_mask() {
        assert_eq!(bit_mask(0, 6).unwrap(), 0b0011_1111);
        assert_eq!(bit_mask(5, 3).unwrap(), 0b1110_0000);
        assert_eq!(bit_mask(0, 64).unwrap(), u64::MAX);
        assert!(bit_mask(60, 5).is_err());
        assert!(bit_mask(0, 0).is_err());
    }

    #[test]
    fn test_extract_and_insert_bits() {
        assert_eq!(extract_bits(0b1100_0011, 6, 2).unwrap(), 0b11);
        assert_eq!(extract_bits(0b1100_0011, 0, 6).unwrap(), 0b11);
        assert_eq!(insert_bits(0b101, 5, 3).unwrap(), 0b1010_0000);
        assert!(insert_bits(0b1000, 5, 3).is_err());
    }

    #[test]
    fn test_word_bytes() {
        assert_eq!(word_from_bytes(&[0x12, 0x34], true), 0x1234);
        assert_eq!(word_from_bytes(&[0x12, 0x34], false), 0x3412);
        assert_eq!(word_to_bytes(0x1234, 2, true), vec![0x12, 0x34]);
        assert_eq!(word_to_bytes(0x1234, 2, false), vec![0x34, 0x12]);
        assert_eq!(word_to_bytes(0xaabb_ccdd, 3, true), vec![0xbb, 0xcc, 0xdd]);
        assert_eq!(word_to_bytes(0x1234, 0, true), Vec::<u8>::new());
        assert_eq!(
            word_to_bytes(0x1234, 10, true),
            vec![0, 0, 0, 0, 0, 0, 0, 0, 0x12, 0x34]
        );
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xa8, 0x40, 0x25]), "a8-40-25");
        assert_eq!(format_hex(&[]), "");
    }
}
