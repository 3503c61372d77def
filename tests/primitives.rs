use proptest::prelude::*;
use trellis::{DynamicBitset, ParallelRuntime};

fn runtime() -> ParallelRuntime {
    ParallelRuntime::new(4).unwrap()
}

fn bitset_from(indices: &[usize], len: usize) -> DynamicBitset {
    let bits = DynamicBitset::new(len);
    for &i in indices {
        bits.set(i);
    }
    bits
}

proptest! {
    /// `offsets` is strictly ascending and counts agree with `count`.
    #[test]
    fn prop_offsets_are_sorted_and_counted(indices in prop::collection::btree_set(0usize..2048, 0..256)) {
        let rt = runtime();
        let indices: Vec<usize> = indices.into_iter().collect();
        let bits = bitset_from(&indices, 2048);

        let offsets = bits.offsets(&rt);
        prop_assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(offsets.len(), bits.count(&rt));
        let expect: Vec<u64> = indices.iter().map(|&i| i as u64).collect();
        prop_assert_eq!(offsets, expect);
    }

    /// Offsets of a union equal the sorted union of offsets.
    #[test]
    fn prop_union_offsets_match_set_union(
        a in prop::collection::btree_set(0usize..1024, 0..128),
        b in prop::collection::btree_set(0usize..1024, 0..128),
    ) {
        let rt = runtime();
        let left = bitset_from(&a.iter().copied().collect::<Vec<_>>(), 1024);
        let right = bitset_from(&b.iter().copied().collect::<Vec<_>>(), 1024);
        let union = DynamicBitset::new(1024);
        union.assign_or(&left, &right, &rt);

        let expect: Vec<u64> = a.union(&b).map(|&i| i as u64).collect();
        prop_assert_eq!(union.offsets(&rt), expect);
    }

    /// The blocked parallel prefix sum agrees with a serial scan.
    #[test]
    fn prop_prefix_sum_matches_serial(values in prop::collection::vec(0u64..1000, 0..20_000)) {
        let rt = runtime();
        let mut data = values.clone();
        rt.prefix_sum(&mut data);

        let mut expect = values;
        let mut acc = 0u64;
        for v in expect.iter_mut() {
            acc += *v;
            *v = acc;
        }
        prop_assert_eq!(data, expect);
    }
}
