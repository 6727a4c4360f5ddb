//! Building entity geometry at a point in time.
//!
//! Only nodes carry coordinates. A way's shape at `T` is its member list at
//! `T` with each member node's own position at `T`, so resolving it takes
//! one node history per member.

use std::sync::Arc;

use geohist_codes::CodeTable;
use geohist_entity::{
    Coordinate, EntityKind, EntityRef, Geometry, GeometryError, Timestamp, Version,
    VersionedEntity,
};
use hashbrown::HashMap;
use tracing::trace;

use crate::reconstruct::version_at;
use crate::{BlockSource, StorageError};

/// Decoded histories kept before the cache is dropped and refilled.
const CACHE_LIMIT: usize = 1 << 16;

/// Resolves geometries, caching the member histories it decodes.
pub struct GeometryResolver<'a, B: ?Sized> {
    blocks: &'a B,
    codes: &'a CodeTable,
    cache: HashMap<EntityRef, Option<Arc<VersionedEntity>>>,
}

impl<'a, B: BlockSource + ?Sized> GeometryResolver<'a, B> {
    pub fn new(blocks: &'a B, codes: &'a CodeTable) -> Self {
        Self {
            blocks,
            codes,
            cache: HashMap::new(),
        }
    }

    /// Geometry of `version`, an `entity` version in effect at `at`.
    pub fn geometry(
        &mut self,
        kind: EntityKind,
        version: &Version,
        at: Timestamp,
    ) -> Result<Geometry, GeometryError> {
        if !version.visible {
            return Err(GeometryError::Deleted);
        }
        match kind {
            EntityKind::Node => version
                .coordinate()
                .map(Geometry::Point)
                .ok_or(GeometryError::Unsupported("node version without coordinates")),
            EntityKind::Way => {
                let points = self.way_points(version, at)?;
                Geometry::from_way_coordinates(points)
            }
            EntityKind::Relation => self.relation(version, at),
        }
    }

    fn way_points(&mut self, version: &Version, at: Timestamp) -> Result<Vec<Coordinate>, GeometryError> {
        version
            .members()
            .iter()
            .map(|member| self.node_at(member.id, at))
            .collect()
    }

    /// Nodes and ways of the relation, each as it was at `at`. Members that
    /// cannot be resolved and nested relations are left out.
    fn relation(&mut self, version: &Version, at: Timestamp) -> Result<Geometry, GeometryError> {
        let mut parts = Vec::with_capacity(version.members().len());
        for member in version.members() {
            let part = match member.kind {
                EntityKind::Node => self.node_at(member.id, at).map(Geometry::Point),
                EntityKind::Way => self.way_at(member.id, at),
                EntityKind::Relation => continue,
            };
            match part {
                Ok(geometry) => parts.push(geometry),
                Err(GeometryError::Source(reason)) => return Err(GeometryError::Source(reason)),
                Err(err) => trace!(member = %member.entity(), %err, "skipping relation member"),
            }
        }
        if parts.is_empty() {
            return Err(GeometryError::Unsupported("relation has no resolvable members"));
        }
        Ok(Geometry::Collection(parts))
    }

    fn way_at(&mut self, id: i64, at: Timestamp) -> Result<Geometry, GeometryError> {
        let entity = EntityRef::way(id);
        let way = self.history(entity)?.ok_or(GeometryError::MissingMember(entity))?;
        let version = version_at(&way, at)
            .filter(|v| v.visible)
            .ok_or(GeometryError::MissingMember(entity))?;
        let points = self.way_points(version, at)?;
        Geometry::from_way_coordinates(points)
    }

    fn node_at(&mut self, id: i64, at: Timestamp) -> Result<Coordinate, GeometryError> {
        let entity = EntityRef::node(id);
        self.history(entity)?
            .and_then(|node| version_at(&node, at).and_then(Version::coordinate))
            .ok_or(GeometryError::MissingMember(entity))
    }

    /// The decoded history of `entity`, `None` when storage has no block.
    fn history(&mut self, entity: EntityRef) -> Result<Option<Arc<VersionedEntity>>, GeometryError> {
        if let Some(cached) = self.cache.get(&entity) {
            return Ok(cached.clone());
        }
        let decoded = match self.blocks.get_block(entity) {
            Ok(block) => {
                let history = block
                    .decode(self.codes)
                    .map_err(|err| GeometryError::Source(format!("{entity}: {err}")))?;
                Some(Arc::new(history))
            }
            Err(StorageError::NotFound(_)) => None,
            Err(err) => return Err(GeometryError::Source(err.to_string())),
        };
        if self.cache.len() >= CACHE_LIMIT {
            self.cache.clear();
        }
        self.cache.insert(entity, decoded.clone());
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use geohist_entity::{GeometryKind, Member};

    use super::*;
    use crate::MemoryBlockSource;

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn store(codes: &CodeTable, entities: Vec<VersionedEntity>) -> MemoryBlockSource {
        let blocks = MemoryBlockSource::new();
        for entity in entities {
            blocks.insert(entity.encode(codes).unwrap());
        }
        blocks
    }

    fn node(id: i64, history: &[(u64, i32, i32)]) -> VersionedEntity {
        let versions = history
            .iter()
            .zip(1..)
            .map(|(&(t, lon, lat), v)| Version::node(v, ts(t), Coordinate::new(lon, lat)))
            .collect();
        VersionedEntity::new(EntityKind::Node, id, versions).unwrap()
    }

    #[test]
    fn test_way_uses_member_positions_at_time() {
        let codes = CodeTable::new();
        let blocks = store(
            &codes,
            vec![
                node(1, &[(10, 0, 0)]),
                node(2, &[(10, 1_000, 0), (30, 2_000, 0)]),
                VersionedEntity::new(EntityKind::Way, 7, vec![Version::way(1, ts(20), [1, 2])])
                    .unwrap(),
            ],
        );
        let mut resolver = GeometryResolver::new(&blocks, &codes);
        let way = Version::way(1, ts(20), [1, 2]);

        let early = resolver.geometry(EntityKind::Way, &way, ts(25)).unwrap();
        let late = resolver.geometry(EntityKind::Way, &way, ts(35)).unwrap();
        assert_eq!(early, Geometry::LineString(vec![Coordinate::new(0, 0), Coordinate::new(1_000, 0)]));
        assert!(late.length_m() > early.length_m());
    }

    #[test]
    fn test_closed_way_is_polygon() {
        let codes = CodeTable::new();
        let blocks = store(
            &codes,
            vec![
                node(1, &[(1, 0, 0)]),
                node(2, &[(1, 1_000, 0)]),
                node(3, &[(1, 1_000, 1_000)]),
            ],
        );
        let mut resolver = GeometryResolver::new(&blocks, &codes);
        let way = Version::way(1, ts(5), [1, 2, 3, 1]);
        let geometry = resolver.geometry(EntityKind::Way, &way, ts(5)).unwrap();
        assert_eq!(geometry.kind(), GeometryKind::Polygon);
        assert!(geometry.area_m2() > 0.0);
    }

    #[test]
    fn test_missing_member_fails_way() {
        let codes = CodeTable::new();
        let blocks = store(&codes, vec![node(1, &[(1, 0, 0)])]);
        let mut resolver = GeometryResolver::new(&blocks, &codes);
        let way = Version::way(1, ts(5), [1, 2]);
        assert_eq!(
            resolver.geometry(EntityKind::Way, &way, ts(5)),
            Err(GeometryError::MissingMember(EntityRef::node(2)))
        );
        // Node 1 did not exist yet at t0.
        assert_eq!(
            resolver.geometry(EntityKind::Way, &Version::way(1, ts(0), [1, 1]), ts(0)),
            Err(GeometryError::MissingMember(EntityRef::node(1)))
        );
    }

    #[test]
    fn test_relation_collects_resolvable_members() {
        let codes = CodeTable::new();
        let blocks = store(
            &codes,
            vec![
                node(1, &[(1, 0, 0)]),
                node(2, &[(1, 500, 500)]),
                VersionedEntity::new(EntityKind::Way, 3, vec![Version::way(1, ts(1), [1, 2])])
                    .unwrap(),
            ],
        );
        let mut resolver = GeometryResolver::new(&blocks, &codes);
        let role = codes.resolve_one(geohist_codes::CodeSpace::Role, "outer").unwrap();
        let relation = Version::relation(
            1,
            ts(2),
            [
                Member::new(EntityKind::Way, 3, role),
                Member::new(EntityKind::Node, 99, role),
                Member::new(EntityKind::Relation, 4, role),
                Member::new(EntityKind::Node, 1, role),
            ],
        );
        let Geometry::Collection(parts) = resolver.geometry(EntityKind::Relation, &relation, ts(2)).unwrap() else {
            panic!("relation geometry is a collection");
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], Geometry::Point(Coordinate::new(0, 0)));
    }

    #[test]
    fn test_deleted_version_has_no_geometry() {
        let codes = CodeTable::new();
        let blocks = MemoryBlockSource::new();
        let mut resolver = GeometryResolver::new(&blocks, &codes);
        assert_eq!(
            resolver.geometry(EntityKind::Node, &Version::deleted(2, ts(1)), ts(1)),
            Err(GeometryError::Deleted)
        );
    }
}
