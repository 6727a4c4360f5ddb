use geohist_codes::{CodeSpace, CodeTable};
use geohist_entity::{
    Coordinate, EntityKind, Geometry, GeometryError, Tag, Timestamp, Version, VersionedEntity,
};
use geohist_filter::{Filter, FilterBuilder, GeometryFailure, GeometryTypes};
use proptest::prelude::*;

const KEYS: [&str; 3] = ["highway", "building", "name"];
const VALUES: [&str; 3] = ["yes", "primary", "residential"];

fn codes() -> CodeTable {
    let codes = CodeTable::new();
    codes.resolve(CodeSpace::Key, &KEYS).unwrap();
    codes.resolve(CodeSpace::Value, &VALUES).unwrap();
    codes
}

#[derive(Clone, Debug)]
enum Shape {
    Exists(usize),
    Equals(usize, usize),
    In(usize, Vec<usize>),
    Kind(u8),
    Types(u8),
    Area(f64, f64),
    Constant(bool),
    And(Box<Shape>, Box<Shape>),
    Or(Box<Shape>, Box<Shape>),
    Not(Box<Shape>),
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        (0..KEYS.len()).prop_map(Shape::Exists),
        (0..KEYS.len(), 0..VALUES.len()).prop_map(|(k, v)| Shape::Equals(k, v)),
        (0..KEYS.len(), prop::collection::vec(0..VALUES.len(), 1..3))
            .prop_map(|(k, vs)| Shape::In(k, vs)),
        (0u8..3).prop_map(Shape::Kind),
        (1u8..16).prop_map(Shape::Types),
        (0.0..1e6f64, 0.0..1e6f64).prop_map(|(a, b)| Shape::Area(a.min(b), a.max(b))),
        any::<bool>().prop_map(Shape::Constant),
    ];
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Shape::And(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Shape::Or(Box::new(a), Box::new(b))),
            inner.prop_map(|a| Shape::Not(Box::new(a))),
        ]
    })
}

fn compile(shape: &Shape, b: &FilterBuilder<'_>) -> Filter {
    match shape {
        Shape::Exists(k) => b.tag_exists(KEYS[*k]).unwrap(),
        Shape::Equals(k, v) => b.tag_equals(KEYS[*k], VALUES[*v]).unwrap(),
        Shape::In(k, vs) => {
            let values: Vec<&str> = vs.iter().map(|v| VALUES[*v]).collect();
            b.tag_in(KEYS[*k], &values).unwrap()
        }
        Shape::Kind(raw) => Filter::kind(EntityKind::from_raw(*raw).unwrap()),
        Shape::Types(bits) => Filter::geometry_types(GeometryTypes::from_bits_truncate(*bits)),
        Shape::Area(min, max) => Filter::area(*min, *max).unwrap(),
        Shape::Constant(value) => Filter::constant(*value),
        Shape::And(a, c) => compile(a, b) & compile(c, b),
        Shape::Or(a, c) => compile(a, b) | compile(c, b),
        Shape::Not(a) => !compile(a, b),
    }
}

fn way(codes: &CodeTable, tags: &[(usize, usize)]) -> Version {
    let tags = tags.iter().map(|&(k, v)| {
        Tag::new(
            codes.code(CodeSpace::Key, KEYS[k]).unwrap(),
            codes.code(CodeSpace::Value, VALUES[v]).unwrap(),
        )
    });
    Version::way(1, Timestamp::from_secs(1), [1, 2, 3, 4, 1]).with_tags(tags)
}

/// A visible way with `tags`, or a deletion.
fn version(codes: &CodeTable, tags: &[(usize, usize)], visible: bool) -> Version {
    if visible {
        way(codes, tags)
    } else {
        Version::deleted(1, Timestamp::from_secs(1))
    }
}

fn dedup_keys(mut tags: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    tags.sort_unstable();
    tags.dedup_by_key(|t| t.0);
    tags
}

fn square() -> Result<Geometry, GeometryError> {
    Geometry::polygon(vec![
        Coordinate::new(0, 0),
        Coordinate::new(2_000, 0),
        Coordinate::new(2_000, 2_000),
        Coordinate::new(0, 2_000),
        Coordinate::new(0, 0),
    ])
}

proptest! {
    #[test]
    fn test_negation_complements_with_geometry(
        shape in arb_shape(),
        tags in prop::collection::vec((0..KEYS.len(), 0..VALUES.len()), 0..3),
    ) {
        let codes = codes();
        let b = FilterBuilder::new(&codes);
        let filter = compile(&shape, &b);
        let mut tags = tags;
        tags.sort_unstable();
        tags.dedup_by_key(|t| t.0);
        let version = way(&codes, &tags);

        let plain = filter
            .apply_with_geometry(EntityKind::Way, &version, GeometryFailure::Strict, square)
            .unwrap();
        let negated = filter
            .negate()
            .apply_with_geometry(EntityKind::Way, &version, GeometryFailure::Strict, square)
            .unwrap();
        prop_assert_ne!(plain, negated);
    }

    #[test]
    fn test_negation_law_holds_for_deleted_versions(
        shape in arb_shape(),
        tags in prop::collection::vec((0..KEYS.len(), 0..VALUES.len()), 0..3),
        visible in any::<bool>(),
        kind in 0u8..3,
    ) {
        let codes = codes();
        let b = FilterBuilder::new(&codes);
        let filter = compile(&shape, &b);
        let kind = EntityKind::from_raw(kind).unwrap();
        let version = version(&codes, &dedup_keys(tags), visible);

        let plain = filter
            .apply_with_geometry(kind, &version, GeometryFailure::Strict, square)
            .unwrap();
        let negated = filter
            .negate()
            .apply_with_geometry(kind, &version, GeometryFailure::Strict, square)
            .unwrap();
        prop_assert_eq!(negated, !plain);

        if !filter.needs_geometry() {
            prop_assert_eq!(
                filter.negate().apply_version(kind, &version),
                !filter.apply_version(kind, &version)
            );
        }
    }

    #[test]
    fn test_negation_law_on_latest_version(
        shape in arb_shape(),
        tags in prop::collection::vec((0..KEYS.len(), 0..VALUES.len()), 0..3),
        deleted in any::<bool>(),
    ) {
        let codes = codes();
        let b = FilterBuilder::new(&codes);
        let filter = compile(&shape, &b);
        let mut versions = vec![way(&codes, &dedup_keys(tags))];
        if deleted {
            versions.push(Version::deleted(2, Timestamp::from_secs(2)));
        }
        let entity = VersionedEntity::new(EntityKind::Way, 7, versions).unwrap();
        // Geometry leaves pass both ways without a geometry.
        if !filter.needs_geometry() {
            prop_assert_eq!(filter.negate().apply_current(&entity), !filter.apply_current(&entity));
        }
    }

    #[test]
    fn test_double_negation_and_display(shape in arb_shape()) {
        let codes = codes();
        let b = FilterBuilder::new(&codes);
        let filter = compile(&shape, &b);
        let twice = filter.negate().negate();
        prop_assert_eq!(twice.to_string(), filter.to_string());
        prop_assert_eq!(twice, filter);
    }

    #[test]
    fn test_geometry_free_is_superset(shape in arb_shape()) {
        let codes = codes();
        let b = FilterBuilder::new(&codes);
        let filter = compile(&shape, &b);
        let version = way(&codes, &[(0, 1)]);
        let exact = filter
            .apply_with_geometry(EntityKind::Way, &version, GeometryFailure::Strict, square)
            .unwrap();
        if exact {
            prop_assert!(filter.apply_version(EntityKind::Way, &version));
        }
    }
}
