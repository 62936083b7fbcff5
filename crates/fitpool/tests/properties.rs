//! Property tests: occupancy accounting, disjointness, coalescing and the
//! best-fit choice under random allocate/free sequences.

use fitpool::{BlockMap, MemoryPool};
use fitpool_test_utils::LiveSet;
use proptest::prelude::*;

type Pool = MemoryPool<16>;

#[derive(Clone, Debug)]
enum Op {
    Alloc(usize),
    Free(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..1500).prop_map(Op::Alloc),
        2 => any::<usize>().prop_map(Op::Free),
    ]
}

/// Size of the smallest free span that can hold `adjusted` bytes.
fn best_fit_size(map: &BlockMap, adjusted: usize) -> Option<usize> {
    map.spans()
        .iter()
        .filter(|s| s.free && s.size >= adjusted)
        .map(|s| s.size)
        .min()
}

fn no_adjacent_free(map: &BlockMap) -> bool {
    map.spans().windows(2).all(|w| !(w[0].free && w[1].free))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn accounting_and_layout_invariants(
        capacity in 2048usize..32 * 1024,
        ops in proptest::collection::vec(arb_op(), 1..300),
    ) {
        let pool = Pool::with_capacity(capacity).unwrap();
        let mut live = LiveSet::new(&pool);

        for op in ops {
            match op {
                Op::Alloc(size) => {
                    let before = pool.block_map();
                    let expected = best_fit_size(&before, size + Pool::OVERHEAD);
                    let alloc = live.allocate(size).unwrap();
                    match pool.offset_of(alloc.ptr.as_ptr()) {
                        Some(offset) => {
                            let span = before
                                .spans()
                                .iter()
                                .find(|s| s.offset <= offset && offset < s.offset + s.size)
                                .copied();
                            prop_assert_eq!(span.map(|s| s.size), expected);
                        }
                        None => prop_assert_eq!(expected, None),
                    }
                }
                Op::Free(i) => {
                    if let Some(result) = live.release_at(i) {
                        prop_assert!(result.is_ok());
                        prop_assert!(no_adjacent_free(&pool.block_map()));
                    }
                }
            }

            let report = pool.report();
            prop_assert_eq!(report.used_bytes, live.pooled_bytes());
            prop_assert!(report.used_bytes <= capacity);
            prop_assert!(pool.check().is_ok(), "{:?}", pool.check());
        }

        live.assert_disjoint();
        live.assert_all_intact();
        live.release_all().unwrap();
        prop_assert_eq!(pool.block_map().len(), 1);
        prop_assert_eq!(pool.report().largest_free, capacity);
    }

    #[test]
    fn round_trip_is_identity(
        warmup in proptest::collection::vec(1usize..400, 0..20),
        size in 1usize..4000,
    ) {
        let pool = Pool::with_capacity(16 * 1024).unwrap();
        let mut live = LiveSet::new(&pool);
        for s in warmup {
            live.allocate(s).unwrap();
        }
        let before = pool.block_map();
        let p = pool.allocate(size).unwrap();
        unsafe { pool.free(p.as_ptr()).unwrap() };
        prop_assert_eq!(pool.block_map(), before);
        live.release_all().unwrap();
    }
}
