use std::fmt;

use recall_core::tokenize::normalize_query;

pub(crate) type Key = [u8; 32];

/// Identity of a cache entry: the hash of the normalized query text plus the
/// semantic bucket its embedding falls into.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    key: Key,
    bucket: u32,
}

impl Fingerprint {
    pub(crate) fn new(query: &str, normalized_embedding: &[f32], bucket_bits: u32) -> Self {
        Self { key: query_key(query), bucket: bucket_of(normalized_embedding, bucket_bits) }
    }

    pub(crate) fn from_parts(key: Key, bucket: u32) -> Self {
        Self { key, bucket }
    }

    pub(crate) fn key(&self) -> &Key {
        &self.key
    }

    pub fn bucket(&self) -> u32 {
        self.bucket
    }

    pub fn key_hex(&self) -> String {
        self.key.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({}..@{})", &self.key_hex()[..12], self.bucket)
    }
}

pub(crate) fn query_key(query: &str) -> Key {
    *blake3::hash(normalize_query(query).as_bytes()).as_bytes()
}

/// Coarse sign quantization: bit `i` is set when the `i`-th evenly strided
/// component is positive.
pub(crate) fn bucket_of(v: &[f32], bits: u32) -> u32 {
    if bits == 0 || v.is_empty() {
        return 0;
    }
    let mut bucket = 0u32;
    for i in 0..bits {
        let idx = i as usize * v.len() / bits as usize;
        if v[idx] > 0.0 {
            bucket |= 1 << i;
        }
    }
    bucket
}

/// Every other bucket within Hamming distance `radius` of `bucket`, nearest
/// first. `bits` must be at most 16.
pub(crate) fn neighbours(bucket: u32, bits: u32, radius: u32) -> Vec<u32> {
    let limit = 1u32 << bits;
    let mut out = Vec::new();
    for distance in 1..=radius.min(bits) {
        // walk every `bits`-wide mask with `distance` bits set, in increasing order
        let mut mask = (1u32 << distance) - 1;
        while mask < limit {
            out.push(bucket ^ mask);
            let low = mask & mask.wrapping_neg();
            let ripple = mask + low;
            mask = (((ripple ^ mask) >> 2) / low) | ripple;
        }
    }
    out
}
