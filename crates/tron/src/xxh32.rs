//! Seeded xxHash32, used to derive map key slots.
//!
//! The 32-bit output is consumed 4 bits per trie level, rightward: depth 0
//! uses bits 0..3. Verified against the canonical sanity test vectors.

const PRIME1: u32 = 0x9E37_79B1;
const PRIME2: u32 = 0x85EB_CA77;
const PRIME3: u32 = 0xC2B2_AE3D;
const PRIME4: u32 = 0x27D4_EB2F;
const PRIME5: u32 = 0x1656_67B1;

#[inline]
fn round(acc: u32, lane: u32) -> u32 {
    acc.wrapping_add(lane.wrapping_mul(PRIME2))
        .rotate_left(13)
        .wrapping_mul(PRIME1)
}

#[inline]
fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// Compute xxHash32 of `data` with the given seed.
#[must_use]
pub fn xxh32(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut tail = data;

    let mut h = if len >= 16 {
        let mut acc = [
            seed.wrapping_add(PRIME1).wrapping_add(PRIME2),
            seed.wrapping_add(PRIME2),
            seed,
            seed.wrapping_sub(PRIME1),
        ];
        let mut blocks = data.chunks_exact(16);
        for block in blocks.by_ref() {
            acc[0] = round(acc[0], read_u32(&block[0..4]));
            acc[1] = round(acc[1], read_u32(&block[4..8]));
            acc[2] = round(acc[2], read_u32(&block[8..12]));
            acc[3] = round(acc[3], read_u32(&block[12..16]));
        }
        tail = blocks.remainder();
        acc[0]
            .rotate_left(1)
            .wrapping_add(acc[1].rotate_left(7))
            .wrapping_add(acc[2].rotate_left(12))
            .wrapping_add(acc[3].rotate_left(18))
    } else {
        seed.wrapping_add(PRIME5)
    };

    h = h.wrapping_add(len as u32);

    let mut words = tail.chunks_exact(4);
    for word in words.by_ref() {
        h = h.wrapping_add(read_u32(word).wrapping_mul(PRIME3));
        h = h.rotate_left(17).wrapping_mul(PRIME4);
    }
    for &byte in words.remainder() {
        h = h.wrapping_add(u32::from(byte).wrapping_mul(PRIME5));
        h = h.rotate_left(11).wrapping_mul(PRIME1);
    }

    // avalanche
    h ^= h >> 15;
    h = h.wrapping_mul(PRIME2);
    h ^= h >> 13;
    h = h.wrapping_mul(PRIME3);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn empty_input_anchors() {
        assert_eq!(xxh32(&[], 0), 0x02CC_5D05);
        assert_eq!(xxh32(&[], 0x9E37_79B1), 0x36B7_8AE7);
    }

    /// Deterministic buffer from the upstream sanity vector generator.
    fn sanity_buffer(len: usize) -> Vec<u8> {
        const PRIME32: u64 = 2_654_435_761;
        const PRIME64: u64 = 11_400_714_785_074_694_797;
        let mut byte_gen = PRIME32;
        (0..len)
            .map(|_| {
                let b = (byte_gen >> 56) as u8;
                byte_gen = byte_gen.wrapping_mul(PRIME64);
                b
            })
            .collect()
    }

    #[derive(Deserialize)]
    struct TestVectors {
        arrays: Arrays,
    }

    #[derive(Deserialize)]
    struct Arrays {
        #[serde(rename = "XSUM_XXH32_testdata")]
        xxh32_testdata: Vec<TestCase>,
    }

    #[derive(Deserialize)]
    struct TestCase {
        len: usize,
        seed: String,
        result: String,
    }

    fn parse_hex(s: &str) -> u32 {
        u32::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16).unwrap()
    }

    #[test]
    fn sanity_vectors() {
        let json = include_str!("../testdata/xxhash_sanity_test_vectors.json");
        let vectors: TestVectors = serde_json::from_str(json).unwrap();
        assert!(!vectors.arrays.xxh32_testdata.is_empty());

        let max_len = vectors
            .arrays
            .xxh32_testdata
            .iter()
            .map(|c| c.len)
            .max()
            .unwrap();
        let buffer = sanity_buffer(max_len);

        for case in &vectors.arrays.xxh32_testdata {
            let seed = parse_hex(&case.seed);
            let expected = parse_hex(&case.result);
            assert_eq!(
                xxh32(&buffer[..case.len], seed),
                expected,
                "failed for len={}, seed={seed:#X}",
                case.len
            );
        }
    }
}
