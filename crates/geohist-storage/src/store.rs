//! Writing and reading a set of entity histories.
//!
//! [`HistoryWriter`] takes complete histories, computes each entity's
//! bounds across its whole history and files the entity under the deepest
//! [`XyGrid`] cell enclosing those bounds. Per entity kind it writes two
//! [`PagedLongIndex`]es: entity id to cell, and position in cell order to
//! entity id, the latter addressed through a [`CellDirectory`].
//! [`HistoryStore`] reads them back.

use std::collections::BTreeMap;
use std::sync::Arc;

use geohist_codes::CodeTable;
use geohist_entity::{
    BlockError, BoundingBox, EncodedBlock, EntityKind, EntityRef, Timestamp, Version,
    VersionedEntity,
};
use geohist_index::{
    ABSENT, CellDirectory, CellId, GridConfig, IndexBuilder, IndexError, IndexMeta,
    MemoryPageSource, PageSource, PagedLongIndex, XyGrid,
};
use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::reconstruct::version_at;
use crate::{
    BlockSource, GeohistConfig, MemoryBlockSource, QueryConfig, StorageError, StorageResult,
};

/// Index metadata for each entity kind. This plus the pages and blocks is
/// everything needed to reopen a store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Grid the entities were filed with.
    pub grid: GridConfig,
    pub nodes: KindManifest,
    pub ways: KindManifest,
    pub relations: KindManifest,
}

/// The two indexes of one entity kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindManifest {
    /// Entity id to raw cell.
    pub by_id: IndexMeta,
    /// Position in `(cell, id)` order to entity id.
    pub by_cell: IndexMeta,
    pub cells: CellDirectory,
}

impl KindManifest {
    const fn id_index(kind: EntityKind) -> u32 {
        kind.as_raw() as u32
    }

    const fn cell_index(kind: EntityKind) -> u32 {
        3 + kind.as_raw() as u32
    }
}

impl Manifest {
    #[must_use]
    pub const fn index(&self, kind: EntityKind) -> &KindManifest {
        match kind {
            EntityKind::Node => &self.nodes,
            EntityKind::Way => &self.ways,
            EntityKind::Relation => &self.relations,
        }
    }
}

/// Output of [`HistoryWriter::finish`], held in memory.
pub struct Dataset {
    pub blocks: Arc<MemoryBlockSource>,
    pub pages: Arc<MemoryPageSource>,
    pub manifest: Manifest,
}

impl Dataset {
    pub fn open(
        &self,
        codes: Arc<CodeTable>,
        config: &GeohistConfig,
    ) -> StorageResult<HistoryStore<Arc<MemoryBlockSource>, Arc<MemoryPageSource>>> {
        HistoryStore::open(
            codes,
            Arc::clone(&self.blocks),
            Arc::clone(&self.pages),
            &self.manifest,
            config,
        )
    }
}

/// Collects histories and writes them out in one pass.
pub struct HistoryWriter {
    codes: Arc<CodeTable>,
    config: GeohistConfig,
    grid: XyGrid,
    entities: [BTreeMap<i64, VersionedEntity>; 3],
}

impl HistoryWriter {
    pub fn new(codes: Arc<CodeTable>, config: GeohistConfig) -> StorageResult<Self> {
        config.index.validate()?;
        let grid = XyGrid::new(&config.grid)?;
        Ok(Self {
            codes,
            config,
            grid,
            entities: Default::default(),
        })
    }

    pub fn add(&mut self, entity: VersionedEntity) -> StorageResult<()> {
        let at = entity.entity();
        if entity.id() < 0 {
            return Err(StorageError::NegativeId(at));
        }
        let slot = &mut self.entities[usize::from(entity.kind().as_raw())];
        if slot.contains_key(&entity.id()) {
            return Err(StorageError::Duplicate(at));
        }
        slot.insert(entity.id(), entity);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.iter().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.iter().all(BTreeMap::is_empty)
    }

    pub fn finish(self) -> StorageResult<Dataset> {
        let [nodes, ways, relations] = &self.entities;
        let bounds = Bounds::compute(nodes, ways, relations);
        let blocks = Arc::new(MemoryBlockSource::new());
        let pages = Arc::new(MemoryPageSource::new());

        let manifest = Manifest {
            grid: self.config.grid.clone(),
            nodes: self.write_kind(EntityKind::Node, nodes, &bounds, &blocks, &pages)?,
            ways: self.write_kind(EntityKind::Way, ways, &bounds, &blocks, &pages)?,
            relations: self.write_kind(EntityKind::Relation, relations, &bounds, &blocks, &pages)?,
        };
        Ok(Dataset {
            blocks,
            pages,
            manifest,
        })
    }

    fn write_kind(
        &self,
        kind: EntityKind,
        entities: &BTreeMap<i64, VersionedEntity>,
        bounds: &Bounds,
        blocks: &MemoryBlockSource,
        pages: &MemoryPageSource,
    ) -> StorageResult<KindManifest> {
        let encoded: Vec<EncodedBlock> = entities
            .par_iter()
            .map(|(&id, entity)| {
                geohist_entity::encode_with_bounds(entity, bounds.get(kind, id), &self.codes)
                    .map_err(|source| StorageError::Encode {
                        entity: entity.entity(),
                        source,
                    })
            })
            .collect::<StorageResult<_>>()?;

        // Blocks come out in id order.
        let mut placed: Vec<(CellId, i64)> = Vec::with_capacity(encoded.len());
        for block in &encoded {
            if block.id() < 0 {
                return Err(StorageError::NegativeId(block.entity()));
            }
            if let Some(b) = block.bounding_box() {
                placed.push((self.grid.enclosing_cell(&b), block.id()));
            }
        }
        let unplaced = encoded.len() - placed.len();

        let mut by_id = IndexBuilder::new(KindManifest::id_index(kind), self.config.index.clone());
        by_id.extend(placed.iter().map(|&(cell, id)| (id as u64, cell.as_raw())))?;
        let by_id = by_id.build()?;

        placed.sort_unstable_by_key(|&(cell, id)| (cell.as_raw(), id));
        let cells = CellDirectory::from_sorted(placed.iter().map(|&(cell, _)| cell))?;
        let mut by_cell = IndexBuilder::new(KindManifest::cell_index(kind), self.config.index.clone());
        by_cell.extend((0u64..).zip(placed.iter().map(|&(_, id)| id)))?;
        let by_cell = by_cell.build()?;

        pages.store(&by_id);
        pages.store(&by_cell);
        info!(
            %kind,
            entities = encoded.len(),
            block_bytes = encoded.iter().map(EncodedBlock::len).sum::<usize>(),
            index_pages = by_id.meta.pages.len() + by_cell.meta.pages.len(),
            cells = cells.runs().len(),
            unplaced,
            "wrote entity histories"
        );
        for block in encoded {
            blocks.insert(block);
        }
        Ok(KindManifest {
            by_id: by_id.meta,
            by_cell: by_cell.meta,
            cells,
        })
    }
}

/// History-wide bounds per entity. A way covers every position of every
/// node it ever referenced; a relation the union of its members.
struct Bounds {
    nodes: HashMap<i64, BoundingBox>,
    ways: HashMap<i64, BoundingBox>,
    relations: HashMap<i64, Option<BoundingBox>>,
}

impl Bounds {
    fn compute(
        nodes: &BTreeMap<i64, VersionedEntity>,
        ways: &BTreeMap<i64, VersionedEntity>,
        relations: &BTreeMap<i64, VersionedEntity>,
    ) -> Self {
        let nodes: HashMap<i64, BoundingBox> = nodes
            .iter()
            .filter_map(|(&id, node)| Some((id, node.node_bounds()?)))
            .collect();

        let ways = ways
            .iter()
            .filter_map(|(&id, way)| {
                let b = members_of(way)
                    .filter_map(|member| nodes.get(&member.id).copied())
                    .reduce(BoundingBox::union)?;
                Some((id, b))
            })
            .collect();

        let mut bounds = Self {
            nodes,
            ways,
            relations: HashMap::new(),
        };
        let mut visiting = HashSet::new();
        for &id in relations.keys() {
            bounds.relation(id, relations, &mut visiting);
        }
        bounds
    }

    /// Depth-first over nested relations; a cycle contributes nothing.
    fn relation(
        &mut self,
        id: i64,
        relations: &BTreeMap<i64, VersionedEntity>,
        visiting: &mut HashSet<i64>,
    ) -> Option<BoundingBox> {
        if let Some(&done) = self.relations.get(&id) {
            return done;
        }
        let relation = relations.get(&id)?;
        if !visiting.insert(id) {
            return None;
        }
        let mut acc: Option<BoundingBox> = None;
        for member in members_of(relation) {
            let b = match member.kind {
                EntityKind::Node => self.nodes.get(&member.id).copied(),
                EntityKind::Way => self.ways.get(&member.id).copied(),
                EntityKind::Relation => self.relation(member.id, relations, visiting),
            };
            if let Some(b) = b {
                acc = Some(acc.map_or(b, |a| a.union(b)));
            }
        }
        visiting.remove(&id);
        self.relations.insert(id, acc);
        acc
    }

    fn get(&self, kind: EntityKind, id: i64) -> Option<BoundingBox> {
        match kind {
            EntityKind::Node => self.nodes.get(&id).copied(),
            EntityKind::Way => self.ways.get(&id).copied(),
            EntityKind::Relation => self.relations.get(&id).copied().flatten(),
        }
    }
}

fn members_of(entity: &VersionedEntity) -> impl Iterator<Item = &geohist_entity::Member> {
    entity.versions().iter().flat_map(Version::members)
}

/// Opened indexes of one entity kind.
pub(crate) struct KindIndex<P> {
    pub(crate) by_id: PagedLongIndex<P>,
    pub(crate) by_cell: PagedLongIndex<P>,
    pub(crate) cells: CellDirectory,
}

/// Read access to stored histories.
pub struct HistoryStore<B, P> {
    pub(crate) codes: Arc<CodeTable>,
    pub(crate) blocks: B,
    pub(crate) indexes: [KindIndex<P>; 3],
    pub(crate) grid: XyGrid,
    pub(crate) config: QueryConfig,
}

impl<B: BlockSource, P: PageSource + Clone> HistoryStore<B, P> {
    pub fn open(
        codes: Arc<CodeTable>,
        blocks: B,
        pages: P,
        manifest: &Manifest,
        config: &GeohistConfig,
    ) -> StorageResult<Self> {
        let open = |kind| -> StorageResult<KindIndex<P>> {
            let meta = manifest.index(kind);
            meta.cells.validate()?;
            if meta.cells.len() != meta.by_cell.entries {
                return Err(IndexError::Directory("cell directory and cell index disagree").into());
            }
            let cache = config.index.cache_pages;
            Ok(KindIndex {
                by_id: PagedLongIndex::open(meta.by_id.clone(), pages.clone(), cache)?,
                by_cell: PagedLongIndex::open(meta.by_cell.clone(), pages.clone(), cache)?,
                cells: meta.cells.clone(),
            })
        };
        let indexes = [
            open(EntityKind::Node)?,
            open(EntityKind::Way)?,
            open(EntityKind::Relation)?,
        ];
        debug!(
            nodes = manifest.nodes.by_id.entries,
            ways = manifest.ways.by_id.entries,
            relations = manifest.relations.by_id.entries,
            "opened history store"
        );
        Ok(Self {
            codes,
            blocks,
            indexes,
            grid: XyGrid::new(&manifest.grid)?,
            config: config.query,
        })
    }
}

impl<B: BlockSource, P: PageSource> HistoryStore<B, P> {
    #[must_use]
    pub fn codes(&self) -> &CodeTable {
        &self.codes
    }

    #[must_use]
    pub const fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub(crate) const fn index(&self, kind: EntityKind) -> &KindIndex<P> {
        &self.indexes[kind.as_raw() as usize]
    }

    /// The complete decoded history of `entity`.
    pub fn history(&self, entity: EntityRef) -> StorageResult<VersionedEntity> {
        self.blocks
            .get_block(entity)?
            .decode(&self.codes)
            .map_err(|source: BlockError| StorageError::Block { entity, source })
    }

    /// The version in effect at `at`; `None` if the entity did not exist yet.
    pub fn version_at(&self, entity: EntityRef, at: Timestamp) -> StorageResult<Option<Version>> {
        let history = self.history(entity)?;
        Ok(version_at(&history, at).cloned())
    }

    /// The grid cell the entity is indexed under, `None` if it has no
    /// geometry or is not stored.
    pub fn cell(&self, entity: EntityRef) -> StorageResult<Option<CellId>> {
        let Ok(key) = u64::try_from(entity.id) else {
            return Ok(None);
        };
        let raw = self.index(entity.kind).by_id.get(key)?;
        if raw == ABSENT {
            return Ok(None);
        }
        Ok(CellId::from_raw(raw))
    }
}
