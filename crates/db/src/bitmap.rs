//! History bitmap chunking.
//!
//! History indices store, per key, the set of block numbers at which the
//! key changed. The set is kept as Roaring64 bitmaps split into chunks
//! whose serialized form stays below [`BITMAP_CHUNK_LIMIT`] bytes, each
//! chunk keyed by `history_key ‖ be_u64(suffix)` where `suffix` is the
//! highest block in the chunk. The open-ended tail chunk uses `u64::MAX`
//! so it always sorts last for its key.

use std::{io, ops::Bound};

use roaring::RoaringTreemap;

/// Upper bound in bytes on the serialized size of a single history chunk.
pub const BITMAP_CHUNK_LIMIT: u64 = 1950;

/// Builds a chunk index key: `key ‖ be_u64(suffix)`.
pub fn chunk_key(key: &[u8], suffix: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 8);
    out.extend_from_slice(key);
    out.extend_from_slice(&suffix.to_be_bytes());
    out
}

/// Serializes a bitmap to its portable Roaring64 byte form.
pub fn serialize(bitmap: &RoaringTreemap) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(bitmap.serialized_size());
    bitmap.serialize_into(&mut bytes)?;
    Ok(bytes)
}

/// Deserializes a bitmap from its portable Roaring64 byte form.
pub fn deserialize(bytes: &[u8]) -> io::Result<RoaringTreemap> {
    RoaringTreemap::deserialize_from(bytes)
}

/// Returns the smallest element of `bitmap` strictly greater than `cap`.
pub fn seek_above(bitmap: &RoaringTreemap, cap: u64) -> Option<u64> {
    bitmap.iter().find(|value| *value > cap)
}

/// Extracts the longest prefix of `bitmap` (its smallest elements) that
/// serializes within `size_limit` bytes, removing those elements from the
/// input.
///
/// Repeatedly cutting until the input is empty partitions the original set
/// into chunks that concatenate back to it. Every chunk fits the limit,
/// except the unavoidable case of a single element whose own serialized
/// form exceeds it.
pub fn cut_left(bitmap: &mut RoaringTreemap, size_limit: u64) -> RoaringTreemap {
    if bitmap.is_empty() {
        return RoaringTreemap::new()
    }

    if bitmap.serialized_size() as u64 <= size_limit {
        return std::mem::take(bitmap)
    }

    let min = bitmap.min().expect("bitmap is not empty");
    let max = bitmap.max().expect("bitmap is not empty");

    // Largest cut point in [min, max] whose prefix still fits. `lo` always
    // holds a candidate: the singleton prefix at `min` is the floor.
    let mut lo = min;
    let mut hi = max;
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if prefix_size(bitmap, mid) <= size_limit {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    let mut chunk = bitmap.clone();
    chunk.remove_range((Bound::Excluded(lo), Bound::Unbounded));
    bitmap.remove_range(..=lo);
    chunk
}

/// Serialized size of the subset of `bitmap` with elements `<= upto`.
fn prefix_size(bitmap: &RoaringTreemap, upto: u64) -> u64 {
    let mut prefix = bitmap.clone();
    prefix.remove_range((Bound::Excluded(upto), Bound::Unbounded));
    prefix.serialized_size() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bitmap_of(values: impl IntoIterator<Item = u64>) -> RoaringTreemap {
        values.into_iter().collect()
    }

    #[test]
    fn cut_left_returns_whole_bitmap_when_it_fits() {
        let mut bitmap = bitmap_of([100, 200, 300]);
        let chunk = cut_left(&mut bitmap, BITMAP_CHUNK_LIMIT);
        assert_eq!(chunk, bitmap_of([100, 200, 300]));
        // the input must be emptied, or re-chunking loops forever
        assert!(bitmap.is_empty());
    }

    #[test]
    fn cut_left_partitions_into_bounded_chunks() {
        let original = bitmap_of((0..40_000).map(|i| i * 3));
        assert!(original.serialized_size() as u64 > BITMAP_CHUNK_LIMIT);

        let mut rest = original.clone();
        let mut chunks = Vec::new();
        while !rest.is_empty() {
            chunks.push(cut_left(&mut rest, BITMAP_CHUNK_LIMIT));
        }
        assert!(chunks.len() >= 2);

        let mut reassembled = RoaringTreemap::new();
        let mut previous_max = None;
        for chunk in &chunks {
            assert!(chunk.serialized_size() as u64 <= BITMAP_CHUNK_LIMIT);
            // chunks are disjoint contiguous runs in ascending order
            if let Some(previous) = previous_max {
                assert!(chunk.min().unwrap() > previous);
            }
            previous_max = chunk.max();
            reassembled |= chunk.clone();
        }
        assert_eq!(reassembled, original);
    }

    #[test]
    fn seek_above_finds_next_element() {
        let bitmap = bitmap_of([1, 5, 100, 10_000_000_000]);
        assert_eq!(seek_above(&bitmap, 0), Some(1));
        assert_eq!(seek_above(&bitmap, 1), Some(5));
        assert_eq!(seek_above(&bitmap, 99), Some(100));
        assert_eq!(seek_above(&bitmap, 100), Some(10_000_000_000));
        assert_eq!(seek_above(&bitmap, 10_000_000_000), None);
        assert_eq!(seek_above(&RoaringTreemap::new(), 0), None);
    }

    #[test]
    fn serialization_roundtrip() {
        let bitmap = bitmap_of([0, 1, 2, 1 << 40, u64::MAX - 1]);
        let bytes = serialize(&bitmap).unwrap();
        assert_eq!(deserialize(&bytes).unwrap(), bitmap);
    }

    #[test]
    fn chunk_key_appends_suffix() {
        assert_eq!(chunk_key(b"k", 1), [b"k".as_slice(), &1u64.to_be_bytes()].concat());
        assert_eq!(&chunk_key(b"k", u64::MAX)[1..], &[0xFF; 8][..]);
    }

    proptest! {
        #[test]
        fn cut_left_reassembles_any_set(
            values in proptest::collection::btree_set(0u64..1_000_000, 1..3_000),
            limit in 64u64..4_096,
        ) {
            let original: RoaringTreemap = values.iter().copied().collect();
            let mut rest = original.clone();
            let mut reassembled = RoaringTreemap::new();
            while !rest.is_empty() {
                let before = rest.len();
                let chunk = cut_left(&mut rest, limit);
                prop_assert!(!chunk.is_empty());
                prop_assert!(rest.len() < before);
                if chunk.len() > 1 {
                    prop_assert!(chunk.serialized_size() as u64 <= limit);
                }
                reassembled |= chunk;
            }
            prop_assert_eq!(reassembled, original);
        }
    }
}
