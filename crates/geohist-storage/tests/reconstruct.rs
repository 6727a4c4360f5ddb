use std::ops::Range;

use geohist_entity::{Coordinate, EntityKind, Timestamp, Version, VersionedEntity};
use geohist_storage::{ContributionKind, contributions, reconstruct, version_at};
use proptest::prelude::*;

fn arb_history() -> impl Strategy<Value = VersionedEntity> {
    prop::collection::btree_set(0u64..10_000, 1..40).prop_flat_map(|times| {
        let len = times.len();
        (Just(times), prop::collection::vec(any::<bool>(), len)).prop_map(|(times, visible)| {
            let versions = times
                .into_iter()
                .zip(visible)
                .zip(1..)
                .map(|((t, visible), v)| {
                    let t = Timestamp::from_secs(t);
                    if visible {
                        Version::node(v, t, Coordinate::new(i32::try_from(v).unwrap(), 0))
                    } else {
                        Version::deleted(v, t)
                    }
                })
                .collect();
            VersionedEntity::new(EntityKind::Node, 1, versions).unwrap()
        })
    })
}

fn arb_queries() -> impl Strategy<Value = Vec<Timestamp>> {
    prop::collection::vec((0u64..11_000).prop_map(Timestamp::from_secs), 0..60)
}

proptest! {
    #[test]
    fn test_merge_agrees_with_lookup(entity in arb_history(), queries in arb_queries()) {
        let merged = reconstruct(entity.newest_first(), &queries);
        for at in &queries {
            prop_assert_eq!(merged.get(at).copied(), version_at(&entity, *at));
        }
        prop_assert!(merged.keys().all(|at| queries.contains(at)));
    }

    #[test]
    fn test_reconstruction_is_idempotent(entity in arb_history(), queries in arb_queries()) {
        let once = reconstruct(entity.newest_first(), &queries);
        let mut reversed = queries.clone();
        reversed.reverse();
        prop_assert_eq!(&once, &reconstruct(entity.newest_first(), &reversed));
        prop_assert_eq!(once, reconstruct(entity.newest_first(), &queries));
    }

    #[test]
    fn test_contributions_partition_history(entity in arb_history(), split in 0u64..11_000) {
        let split = Timestamp::from_secs(split);
        let all = |range: Range<Timestamp>| contributions(&entity, range).count();
        let total = all(Timestamp::from_secs(0)..Timestamp::from_secs(u64::MAX));
        prop_assert_eq!(total, entity.versions().len());
        prop_assert_eq!(
            all(Timestamp::from_secs(0)..split) + all(split..Timestamp::from_secs(u64::MAX)),
            total
        );

        let first = contributions(&entity, Timestamp::from_secs(0)..Timestamp::from_secs(u64::MAX))
            .next()
            .unwrap();
        prop_assert!(
            first.kind == ContributionKind::CREATION || first.kind == ContributionKind::DELETION
        );
    }
}
