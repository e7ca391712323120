//! Serializable Bloom filter over 32-byte change hashes, using
//! Dillinger-Manolios triple hashing for probe derivation.

use crate::bitstream::{Decoder, Encoder};
use crate::error::DecodingError;
use crate::op::ChangeHash;

const BITS_PER_ENTRY: u32 = 10;
const NUM_PROBES: u32 = 7;

#[derive(Debug, Clone, Default)]
pub struct BloomFilter {
    num_entries: u32,
    num_bits_per_entry: u32,
    num_probes: u32,
    bits: Vec<u8>,
}

impl BloomFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_hashes<'a>(hashes: impl Iterator<Item = &'a ChangeHash>) -> Self {
        let hashes: Vec<&ChangeHash> = hashes.collect();
        let num_entries = hashes.len() as u32;
        if num_entries == 0 {
            return Self::default();
        }
        let num_bits_per_entry = BITS_PER_ENTRY;
        let num_probes = NUM_PROBES;
        let num_bits = (num_entries * num_bits_per_entry) as usize;
        let num_bytes = (num_bits + 7) / 8;
        let mut filter = BloomFilter {
            num_entries,
            num_bits_per_entry,
            num_probes,
            bits: vec![0u8; num_bytes],
        };
        for hash in hashes {
            filter.add_hash(hash);
        }
        filter
    }

    fn get_probes(&self, hash: &ChangeHash) -> Vec<u32> {
        let m = self.bits.len() as u64 * 8;
        let b = &hash.0;
        let mut x = u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as u64;
        let mut y = u32::from_le_bytes([b[4], b[5], b[6], b[7]]) as u64;
        let z = u32::from_le_bytes([b[8], b[9], b[10], b[11]]) as u64;

        let mut probes = Vec::with_capacity(self.num_probes as usize);
        probes.push((x % m) as u32);
        for _ in 1..self.num_probes {
            x = (x + y) % m;
            y = (y + z) % m;
            probes.push(x as u32);
        }
        probes
    }

    fn set_bit(&mut self, index: u32) {
        let byte = (index / 8) as usize;
        let bit = index % 8;
        self.bits[byte] |= 1 << bit;
    }

    fn get_bit(&self, index: u32) -> bool {
        let byte = (index / 8) as usize;
        let bit = index % 8;
        self.bits[byte] & (1 << bit) != 0
    }

    pub fn add_hash(&mut self, hash: &ChangeHash) {
        for probe in self.get_probes(hash) {
            self.set_bit(probe);
        }
    }

    pub fn contains_hash(&self, hash: &ChangeHash) -> bool {
        if self.num_entries == 0 {
            return false;
        }
        self.get_probes(hash).into_iter().all(|p| self.get_bit(p))
    }

    pub fn into_bytes(self) -> Vec<u8> {
        if self.num_entries == 0 {
            return Vec::new();
        }
        let mut out = Encoder::new();
        out.append_uint(self.num_entries as u64);
        out.append_uint(self.num_bits_per_entry as u64);
        out.append_uint(self.num_probes as u64);
        out.append_raw(&self.bits);
        out.into_bytes()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.clone().into_bytes()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, DecodingError> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        let mut d = Decoder::new(bytes);
        let num_entries = d.read_uint32()?;
        let num_bits_per_entry = d.read_uint32()?;
        let num_probes = d.read_uint32()?;
        let num_bits = (num_entries * num_bits_per_entry) as usize;
        let num_bytes = (num_bits + 7) / 8;
        let bits = d.read_raw(num_bytes)?.to_vec();
        Ok(BloomFilter {
            num_entries,
            num_bits_per_entry,
            num_probes,
            bits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> ChangeHash {
        ChangeHash([byte; 32])
    }

    #[test]
    fn empty_filter_contains_nothing() {
        let filter = BloomFilter::new();
        assert!(!filter.contains_hash(&hash(1)));
        assert_eq!(filter.clone().into_bytes(), Vec::<u8>::new());
    }

    #[test]
    fn filter_contains_added_hashes() {
        let hashes = vec![hash(1), hash(2), hash(3)];
        let filter = BloomFilter::from_hashes(hashes.iter());
        for h in &hashes {
            assert!(filter.contains_hash(h));
        }
    }

    #[test]
    fn filter_roundtrips_through_bytes() {
        let hashes = vec![hash(5), hash(6)];
        let filter = BloomFilter::from_hashes(hashes.iter());
        let bytes = filter.to_bytes();
        let parsed = BloomFilter::parse(&bytes).unwrap();
        for h in &hashes {
            assert!(parsed.contains_hash(h));
        }
    }

    #[test]
    fn empty_bytes_roundtrip_to_empty_filter() {
        let filter = BloomFilter::new();
        let bytes = filter.into_bytes();
        assert!(bytes.is_empty());
        let parsed = BloomFilter::parse(&bytes).unwrap();
        assert!(!parsed.contains_hash(&hash(1)));
    }
}
