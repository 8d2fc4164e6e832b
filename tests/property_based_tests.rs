mod common;

use common::*;
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use marker_sweep::processor::CancellationFlag;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: a run commits ceil(M / B) chunks, all full except possibly the last
    #[test]
    fn chunk_count_matches_ceiling(
        records in 0usize..400,
        batch_size in 1usize..60,
        fetch_size in 1usize..60,
    ) {
        let store = seeded_store(records);
        let processor = processor_for(Arc::new(store.clone()), batch_size, fetch_size);

        let summary = tokio_test::block_on(processor.run(Uuid::new_v4(), &CancellationFlag::new()))
            .unwrap();

        let sizes = store.committed_write_sizes();
        prop_assert_eq!(sizes.len(), records.div_ceil(batch_size));
        prop_assert_eq!(sizes.iter().sum::<usize>(), records);
        if let Some((last, full)) = sizes.split_last() {
            prop_assert!(full.iter().all(|&size| size == batch_size));
            prop_assert!(*last >= 1 && *last <= batch_size);
        }
        prop_assert_eq!(summary.records_committed as usize, records);
        prop_assert_eq!(eligible_count(&store), 0);
    }

    /// Property: client-side buffering never exceeds one chunk plus one page
    #[test]
    fn buffered_records_never_exceed_chunk_plus_page(
        records in 0usize..400,
        batch_size in 1usize..60,
        fetch_size in 1usize..60,
    ) {
        let store = seeded_store(records);
        let processor = processor_for(Arc::new(store.clone()), batch_size, fetch_size);

        let summary = tokio_test::block_on(processor.run(Uuid::new_v4(), &CancellationFlag::new()))
            .unwrap();

        prop_assert!(summary.peak_buffered <= batch_size + fetch_size);
        prop_assert!(store.largest_page() <= fetch_size);
    }
}
