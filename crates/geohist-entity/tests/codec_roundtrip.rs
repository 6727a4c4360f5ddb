//! Property tests: any valid history survives encode and decode unchanged.

use geohist_codes::{Code, CodeSpace, CodeTable};
use geohist_entity::{
    Coordinate, EncodedBlock, EntityKind, Member, Tag, Timestamp, Version, VersionedEntity,
};
use proptest::prelude::*;

const KEYS: usize = 6;
const VALUES: usize = 10;
const ROLES: usize = 3;

fn code_table() -> CodeTable {
    let codes = CodeTable::new();
    for i in 0..KEYS {
        codes.resolve_one(CodeSpace::Key, &format!("key{i}")).unwrap();
    }
    for i in 0..VALUES {
        codes.resolve_one(CodeSpace::Value, &format!("value{i}")).unwrap();
    }
    for i in 0..ROLES {
        codes.resolve_one(CodeSpace::Role, &format!("role{i}")).unwrap();
    }
    codes
}

fn arb_kind() -> impl Strategy<Value = EntityKind> {
    prop_oneof![
        Just(EntityKind::Node),
        Just(EntityKind::Way),
        Just(EntityKind::Relation),
    ]
}

fn arb_tags() -> impl Strategy<Value = Vec<Tag>> {
    prop::collection::vec((0..KEYS as u32, 0..VALUES as u32), 0..5).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(k, v)| Tag::new(Code::from_raw(k), Code::from_raw(v)))
            .collect()
    })
}

fn arb_member() -> impl Strategy<Value = Member> {
    (arb_kind(), any::<i64>(), 0..ROLES as u32)
        .prop_map(|(kind, id, role)| Member::new(kind, id, Code::from_raw(role)))
}

/// Raw ingredients of one version; the kind decides which payload is used.
#[derive(Debug, Clone)]
struct Step {
    ts_gap: u64,
    version_gap: u32,
    visible: bool,
    changeset: i64,
    user: u32,
    tags: Vec<Tag>,
    coordinate: Coordinate,
    way_nodes: Vec<i64>,
    members: Vec<Member>,
}

fn arb_step() -> impl Strategy<Value = Step> {
    (
        (1..100_000u64, 1..50u32, prop::bool::weighted(0.8)),
        (prop_oneof![Just(0i64), any::<i64>()], prop_oneof![Just(0u32), any::<u32>()]),
        arb_tags(),
        (any::<i32>(), any::<i32>()),
        prop::collection::vec(any::<i64>(), 0..8),
        prop::collection::vec(arb_member(), 0..6),
    )
        .prop_map(
            |((ts_gap, version_gap, visible), (changeset, user), tags, (lon, lat), way_nodes, members)| Step {
                ts_gap,
                version_gap,
                visible,
                changeset,
                user,
                tags,
                coordinate: Coordinate::new(lon, lat),
                way_nodes,
                members,
            },
        )
}

fn arb_history() -> impl Strategy<Value = VersionedEntity> {
    (
        arb_kind(),
        any::<i64>(),
        0..u64::MAX / 2,
        prop::collection::vec(arb_step(), 1..12),
    )
        .prop_map(|(kind, id, start, steps)| {
            let mut timestamp = start;
            let mut number = 0u32;
            let versions = steps
                .into_iter()
                .map(|step| {
                    timestamp += step.ts_gap;
                    number += step.version_gap;
                    let ts = Timestamp::from_secs(timestamp);
                    let version = if !step.visible {
                        Version::deleted(number, ts)
                    } else {
                        match kind {
                            EntityKind::Node => Version::node(number, ts, step.coordinate),
                            EntityKind::Way => Version::way(number, ts, step.way_nodes),
                            EntityKind::Relation => Version::relation(number, ts, step.members),
                        }
                        .with_tags(step.tags)
                    };
                    version.with_changeset(step.changeset).with_user(step.user)
                })
                .collect();
            VersionedEntity::new(kind, id, versions).unwrap()
        })
}

proptest! {
    #[test]
    fn test_decode_inverts_encode(history in arb_history()) {
        let codes = code_table();
        let block = history.encode(&codes).unwrap();
        prop_assert_eq!(block.kind(), history.kind());
        prop_assert_eq!(block.id(), history.id());
        prop_assert_eq!(block.decode(&codes).unwrap(), history);
    }

    #[test]
    fn test_stored_bytes_reload(history in arb_history()) {
        let codes = code_table();
        let block = history.encode(&codes).unwrap();
        let reloaded = EncodedBlock::from_bytes(block.as_bytes().to_vec()).unwrap();
        prop_assert_eq!(reloaded.header(), block.header());
        prop_assert_eq!(reloaded.decode(&codes).unwrap(), history);
    }

    #[test]
    fn test_arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let codes = code_table();
        if let Ok(block) = EncodedBlock::from_bytes(bytes) {
            let _ = block.decode(&codes);
        }
    }
}
