//! Seeded 64-bit mixing hash.
//!
//! One hash serves two masters: the buffer pool's extendible-hashing
//! directory (which indexes by the low `global_depth` bits, so the low bits
//! must be well mixed) and the Bloom filter's double-hashed probe sequence
//! (which needs two independent seeds per key).

const PRIME64_1: u64 = 11400714785074694791;
const PRIME64_2: u64 = 14029467366897019727;
const PRIME64_3: u64 = 1609587929392839161;
const PRIME64_4: u64 = 9650029242287828579;
const PRIME64_5: u64 = 2870177450012600261;

/// Golden-ratio constant separating the filter's two probe seeds.
pub const SEED_ALT: u64 = 0x9e3779b97f4a7c15;

/// Hashes `data` with the given seed. xxHash64-style: 8-byte lanes, a
/// 4-byte tail lane, byte tail, then a final avalanche.
pub fn hash64(data: &[u8], seed: u64) -> u64 {
    let mut hash = seed
        .wrapping_add(PRIME64_5)
        .wrapping_add(data.len() as u64);

    let mut chunks = data.chunks_exact(8);
    for chunk in chunks.by_ref() {
        let mut lane = u64::from_ne_bytes(chunk.try_into().unwrap());
        lane = lane.wrapping_mul(PRIME64_2);
        lane = lane.rotate_left(31);
        lane = lane.wrapping_mul(PRIME64_1);
        hash ^= lane;
        hash = hash
            .rotate_left(27)
            .wrapping_mul(PRIME64_1)
            .wrapping_add(PRIME64_4);
    }

    let mut rest = chunks.remainder();
    if rest.len() >= 4 {
        let lane = u32::from_ne_bytes(rest[..4].try_into().unwrap());
        hash ^= u64::from(lane).wrapping_mul(PRIME64_1);
        hash = hash
            .rotate_left(23)
            .wrapping_mul(PRIME64_2)
            .wrapping_add(PRIME64_3);
        rest = &rest[4..];
    }

    for &byte in rest {
        hash ^= u64::from(byte).wrapping_mul(PRIME64_5);
        hash = hash.rotate_left(11).wrapping_mul(PRIME64_1);
    }

    hash ^= hash >> 33;
    hash = hash.wrapping_mul(PRIME64_2);
    hash ^= hash >> 29;
    hash = hash.wrapping_mul(PRIME64_3);
    hash ^= hash >> 32;

    hash
}
