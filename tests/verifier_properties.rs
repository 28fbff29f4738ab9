use proptest::prelude::*;
use seqcheck::{Event, Verifier};
use std::collections::BTreeSet;

/// A shuffled run of `1..=n` with `extra` redeliveries spliced in at
/// arbitrary positions.
fn redelivered_stream() -> impl Strategy<Value = (u64, Vec<u64>, usize)> {
    (1u64..80).prop_flat_map(|n| {
        let serials = Just((1..=n).collect::<Vec<u64>>()).prop_shuffle();
        let extras = prop::collection::vec((1..=n, any::<usize>()), 0..20);
        (Just(n), serials, extras).prop_map(|(n, mut stream, extras)| {
            let count = extras.len();
            for (serial, at) in extras {
                let at = at % (stream.len() + 1);
                stream.insert(at, serial);
            }
            (n, stream, count)
        })
    })
}

proptest! {
    #[test]
    fn any_arrival_order_reaches_full_prefix(case in redelivered_stream()) {
        let (n, stream, extra) = case;
        let verifier = Verifier::new();
        for serial in stream {
            verifier.observe(Event::generated(serial).into_processed());
        }
        let status = verifier.status();
        prop_assert_eq!(status.last_contiguous_serial, n);
        prop_assert_eq!(status.pending_out_of_order, 0);
        prop_assert_eq!(status.duplicates.len(), extra);
        prop_assert!(!status.unprocessed_detected);
    }

    #[test]
    fn boundary_never_passes_a_missing_serial(n in 2u64..60, missing_seed in any::<u64>()) {
        let missing = 1 + missing_seed % n;
        let verifier = Verifier::new();
        for serial in (1..=n).rev().filter(|s| *s != missing) {
            verifier.observe(Event::generated(serial).into_processed());
        }
        let status = verifier.status();
        prop_assert_eq!(status.last_contiguous_serial, missing - 1);
        prop_assert_eq!(status.pending_out_of_order as u64, n - missing);
    }
}

proptest! {
    #[test]
    fn arbitrary_multiset_matches_reference_model(stream in prop::collection::vec(1u64..40, 0..120)) {
        let verifier = Verifier::new();
        for serial in &stream {
            verifier.observe(Event::generated(*serial).into_processed());
        }

        let distinct: BTreeSet<u64> = stream.iter().copied().collect();
        let contiguous = (1..).take_while(|serial| distinct.contains(serial)).last().unwrap_or(0);
        let above = distinct.iter().filter(|serial| **serial > contiguous).count();

        let status = verifier.status();
        prop_assert_eq!(status.last_contiguous_serial, contiguous);
        prop_assert_eq!(status.duplicates.len(), stream.len() - distinct.len());
        prop_assert_eq!(status.pending_out_of_order, above);
    }
}
