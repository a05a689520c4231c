//! Byte-order packing and hashing helpers.
//!
//! Everything the interpreter reads from a program image or writes into the
//! arena is big-endian. Builders append through [`SerializeField`]; readers
//! decode fixed-width values from a slice and return `None` on truncation.

use alloc::string::String;
use alloc::vec::Vec;
use sha2::{Digest, Sha256};

/// A value that knows how to append itself to a byte image.
pub trait SerializeField {
    fn serialize_field(&self, buf: &mut Vec<u8>);
}

impl SerializeField for u8 {
    fn serialize_field(&self, buf: &mut Vec<u8>) {
        buf.push(*self);
    }
}

impl SerializeField for u16 {
    fn serialize_field(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl SerializeField for i32 {
    fn serialize_field(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl SerializeField for u32 {
    fn serialize_field(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl SerializeField for i64 {
    fn serialize_field(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl SerializeField for [u8] {
    fn serialize_field(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }
}

impl<const N: usize> SerializeField for [u8; N] {
    fn serialize_field(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }
}

fn take<const N: usize>(bytes: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    bytes.get(offset..end)?.try_into().ok()
}

pub fn read_u16_be(bytes: &[u8], offset: usize) -> Option<u16> {
    take::<2>(bytes, offset).map(u16::from_be_bytes)
}

pub fn read_i32_be(bytes: &[u8], offset: usize) -> Option<i32> {
    take::<4>(bytes, offset).map(i32::from_be_bytes)
}

pub fn read_i64_be(bytes: &[u8], offset: usize) -> Option<i64> {
    take::<8>(bytes, offset).map(i64::from_be_bytes)
}

pub fn make_short(b1: u8, b0: u8) -> i16 {
    i16::from_be_bytes([b1, b0])
}

pub fn make_int(b3: u8, b2: u8, b1: u8, b0: u8) -> i32 {
    i32::from_be_bytes([b3, b2, b1, b0])
}

pub fn make_long(bytes: [u8; 8]) -> i64 {
    i64::from_be_bytes(bytes)
}

/// Top byte of a 32-bit word.
pub fn first_byte(value: u32) -> u8 {
    (value >> 24) as u8
}

/// Low three bytes of a 32-bit word, big-endian.
pub fn int24(value: u32) -> [u8; 3] {
    let [_, a, b, c] = value.to_be_bytes();
    [a, b, c]
}

pub fn concatenate(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

pub fn to_hex(data: &[u8]) -> String {
    hex::encode(data)
}

pub fn from_hex(text: &str) -> Option<Vec<u8>> {
    hex::decode(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn packs_big_endian() {
        let mut buf = Vec::new();
        0x0102_0304u32.serialize_field(&mut buf);
        7u16.serialize_field(&mut buf);
        assert_eq!(buf, vec![1, 2, 3, 4, 0, 7]);
        assert_eq!(read_i32_be(&buf, 0), Some(0x0102_0304));
        assert_eq!(read_u16_be(&buf, 4), Some(7));
        assert_eq!(read_u16_be(&buf, 5), None);
    }

    #[test]
    fn splits_tagged_words() {
        let word = 0xAB12_3456u32;
        assert_eq!(first_byte(word), 0xAB);
        assert_eq!(int24(word), [0x12, 0x34, 0x56]);
    }

    #[test]
    fn make_helpers_sign_extend() {
        assert_eq!(make_short(0xff, 0xfe), -2);
        assert_eq!(make_int(0x80, 0, 0, 0), i32::MIN);
        assert_eq!(make_long([0, 0, 0, 0, 0, 0, 1, 0]), 256);
    }

    #[test]
    fn hex_and_hash() {
        assert_eq!(to_hex(&[0xde, 0xad]), "dead");
        assert_eq!(from_hex("dead"), Some(vec![0xde, 0xad]));
        assert_eq!(from_hex("zz"), None);
        assert_eq!(
            to_hex(&sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(concatenate(&[b"ab", b"", b"c"]), b"abc".to_vec());
    }
}
