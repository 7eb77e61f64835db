//! Property tests for region placement
//!
//! Any mix of small and large requests yields disjoint regions; small regions
//! always lie inside a block, word-aligned ones on a word boundary.

use std::ops::Range;

use nebula_region::config::WORD_ALIGNMENT;
use nebula_region::prelude::*;
use nebula_region::utils::is_aligned;
use proptest::prelude::*;

fn request() -> impl Strategy<Value = (usize, Alignment)> {
    (
        0usize..600,
        prop_oneof![Just(Alignment::Word), Just(Alignment::Unaligned)],
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn regions_are_disjoint_and_inside_blocks(
        block_size in prop_oneof![Just(64usize), Just(256), Just(1024)],
        requests in proptest::collection::vec(request(), 1..200),
    ) {
        let pool = SpinPool::new(PoolConfig::default().with_block_size(block_size)).unwrap();

        let mut spans: Vec<Range<usize>> = Vec::new();
        for (size, align) in requests {
            let region = pool.allocate(size, align).unwrap();
            prop_assert_eq!(region.len(), size);
            prop_assert_eq!(region.is_large(), size > pool.threshold());

            if !region.is_large() {
                let span = region.span();
                let blocks = pool.block_spans();
                prop_assert!(
                    blocks.iter().any(|block| block.start <= span.start && span.end <= block.end)
                );
                if align == Alignment::Word {
                    prop_assert!(is_aligned(span.start, WORD_ALIGNMENT));
                }
            }
            if !region.is_empty() {
                spans.push(region.span());
            }
        }

        spans.sort_by_key(|span| span.start);
        for pair in spans.windows(2) {
            prop_assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn reset_restores_first_block(
        sizes in proptest::collection::vec(1usize..300, 1..100),
    ) {
        let pool = SpinPool::with_block_size(512).unwrap();
        for size in &sizes {
            let _ = pool.alloc(*size).unwrap();
        }
        let blocks_before = pool.stats().blocks;

        pool.reset();

        let stats = pool.stats();
        prop_assert_eq!(stats.blocks, blocks_before);
        prop_assert_eq!(stats.small_used, 0);
        prop_assert_eq!(stats.large_live, 0);
        prop_assert_eq!(pool.alloc(sizes[0]).unwrap().addr(), pool.block_spans()[0].start);
    }
}
