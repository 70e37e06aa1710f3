// permute.rs — keyed Fisher–Yates shuffle and its inverse.
//
// The packer permutes a mesh's flattened face-index list with a Fisher–Yates
// pass whose swap targets come from a keyed generator (see rng.rs). Because
// the target sequence is a pure function of (length, key), the permutation
// can be undone by replaying the identical swaps in reverse order — no
// inverse table is ever materialised.
//
// Layout of the exchange sequence: element 0 is the draw made at
// i = len - 1, element len - 2 the draw made at i = 1. Both directions
// index it as exchanges[len - 1 - i] so they pair the same operands.

use crate::rng::DotnetRng;

/// The swap-target sequence for a keyed permutation of `len` elements.
///
/// Draws `n = rng.next_below(i + 1)` for `i` from `len - 1` down to `1`,
/// in that order. Every entry at position `p` lies in `[0, len - 1 - p]`.
/// Lengths 0 and 1 have no swaps and return an empty sequence.
pub fn exchange_sequence(len: usize, key: i32) -> Vec<usize> {
    if len < 2 {
        return Vec::new();
    }
    let mut rng = DotnetRng::new(key);
    let mut exchanges = Vec::with_capacity(len - 1);
    for i in (1..len).rev() {
        exchanges.push(rng.next_below(i as i32 + 1) as usize);
    }
    exchanges
}

/// Apply the keyed permutation in place: descending `i`, swap
/// `arr[i] <-> arr[exchanges[len - 1 - i]]`.
pub fn shuffle<T>(arr: &mut [T], key: i32) {
    let len = arr.len();
    let exchanges = exchange_sequence(len, key);
    for i in (1..len).rev() {
        arr.swap(i, exchanges[len - 1 - i]);
    }
}

/// Undo the keyed permutation in place: the same swaps as [`shuffle`],
/// replayed in ascending `i` order. `deshuffle(shuffle(a, k), k) == a`
/// for every array and key.
pub fn deshuffle<T>(arr: &mut [T], key: i32) {
    let len = arr.len();
    let exchanges = exchange_sequence(len, key);
    for i in 1..len {
        arr.swap(i, exchanges[len - 1 - i]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_sequence_matches_reference() {
        // Generated by the packer's generator for (10, 1337).
        assert_eq!(exchange_sequence(10, 1337), [2, 1, 2, 6, 5, 4, 3, 0, 0]);
        assert_eq!(exchange_sequence(8, 42), [5, 0, 0, 2, 0, 0, 1]);
    }

    #[test]
    fn exchange_sequence_is_deterministic() {
        assert_eq!(exchange_sequence(257, 9001), exchange_sequence(257, 9001));
    }

    #[test]
    fn exchange_sequence_bounds() {
        for &(len, key) in &[(2usize, 0), (17, 1337), (100, -5), (1588, 1337)] {
            let ex = exchange_sequence(len, key);
            assert_eq!(ex.len(), len - 1);
            for (p, &n) in ex.iter().enumerate() {
                assert!(n <= len - 1 - p, "exchange {n} at {p} exceeds {}", len - 1 - p);
            }
        }
    }

    #[test]
    fn degenerate_lengths_are_empty() {
        assert!(exchange_sequence(0, 1337).is_empty());
        assert!(exchange_sequence(1, 1337).is_empty());
    }

    #[test]
    fn shuffle_matches_reference() {
        let mut arr: Vec<u32> = (0..10).collect();
        shuffle(&mut arr, 1337);
        assert_eq!(arr, [8, 7, 0, 3, 4, 5, 6, 9, 1, 2]);
    }

    #[test]
    fn deshuffle_inverts_shuffle() {
        for &(len, key) in &[(1usize, 7), (2, 0), (33, -1234), (500, 1337)] {
            let original: Vec<usize> = (0..len).collect();
            let mut arr = original.clone();
            shuffle(&mut arr, key);
            deshuffle(&mut arr, key);
            assert_eq!(arr, original, "inverse failed for len {len} key {key}");
        }
    }

    #[test]
    fn inverse_holds_with_duplicate_elements() {
        let original = vec![3u8, 3, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5];
        let mut arr = original.clone();
        shuffle(&mut arr, 271828);
        deshuffle(&mut arr, 271828);
        assert_eq!(arr, original);
    }

    #[test]
    fn empty_and_single_are_untouched() {
        let mut empty: Vec<u32> = Vec::new();
        shuffle(&mut empty, 1);
        deshuffle(&mut empty, 1);
        assert!(empty.is_empty());

        let mut single = vec![42u32];
        shuffle(&mut single, 1);
        assert_eq!(single, [42]);
    }

    #[test]
    fn key_1337_full_asset_permutation() {
        // The shipped asset: 1588 flattened indices, key 1337.
        let identity: Vec<u32> = (0..1588).collect();
        let mut arr = identity.clone();
        shuffle(&mut arr, 1337);

        // Non-trivial permutation…
        assert_ne!(arr, identity);
        assert_eq!(&arr[..10], &[292, 616, 701, 397, 920, 348, 1324, 1275, 1429, 1119]);

        // …and a bijection: every value appears exactly once.
        let mut sorted = arr.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, identity);

        deshuffle(&mut arr, 1337);
        assert_eq!(arr, identity);
    }

    #[test]
    fn different_keys_disagree() {
        let mut a: Vec<u32> = (0..64).collect();
        let mut b = a.clone();
        shuffle(&mut a, 1);
        shuffle(&mut b, 2);
        assert_ne!(a, b);
    }
}
