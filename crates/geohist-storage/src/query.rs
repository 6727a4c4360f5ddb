//! Area and time queries.
//!
//! Candidates come from the per-kind cell directories: only the runs of
//! cells intersecting the area are read from the cell-ordered index, then
//! each entity's block bounds are tested. Each candidate is decoded once,
//! projected onto every query timestamp and filtered. Deleted versions
//! never match.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use geohist_entity::{
    BlockError, BoundingBox, EntityKind, EntityRef, Timestamp, Version, VersionedEntity,
};
use geohist_filter::Filter;
use geohist_index::{IndexError, IndexResult, PageSource};
use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::geometry::GeometryResolver;
use crate::reconstruct::reconstruct;
use crate::{BlockSource, HistoryStore, QueryError, QueryResult, TimestampSeries};

#[derive(Clone, Debug)]
pub struct Query {
    pub area: BoundingBox,
    /// Ascending, without duplicates.
    timestamps: Vec<Timestamp>,
    pub filter: Filter,
}

impl Query {
    pub fn new(area: BoundingBox, timestamps: impl IntoIterator<Item = Timestamp>, filter: Filter) -> Self {
        let mut timestamps: Vec<_> = timestamps.into_iter().collect();
        timestamps.sort_unstable();
        timestamps.dedup();
        Self {
            area,
            timestamps,
            filter,
        }
    }

    #[must_use]
    pub fn snapshot(area: BoundingBox, at: Timestamp, filter: Filter) -> Self {
        Self::new(area, [at], filter)
    }

    #[must_use]
    pub fn series(area: BoundingBox, series: &TimestampSeries, filter: Filter) -> Self {
        Self::new(area, series.iter(), filter)
    }

    #[must_use]
    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }
}

/// One entity at one query timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRow {
    pub entity: EntityRef,
    pub timestamp: Timestamp,
    /// `None` if the entity did not exist yet.
    pub version: Option<Version>,
    pub matches: bool,
}

/// Whether a query saw every candidate. Cleared when an entity had to be
/// skipped or failed; shared between a stream and its clones.
#[derive(Clone, Debug)]
pub struct Completeness(Arc<AtomicBool>);

impl Completeness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn mark_incomplete(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Kind, position in the cell-ordered index, and the id stored there.
type Candidate = IndexResult<(EntityKind, u64, i64)>;

impl<B: BlockSource, P: PageSource> HistoryStore<B, P> {
    /// Stream rows for `query`. Dropping the stream cancels it.
    pub fn query(&self, query: Query) -> QueryStream<'_, B, P> {
        debug!(
            area = ?query.area,
            timestamps = query.timestamps.len(),
            filter = %query.filter,
            "starting query"
        );
        QueryStream {
            store: self,
            candidates: Box::new(self.candidates(query.area)),
            resolver: GeometryResolver::new(&self.blocks, &self.codes),
            query,
            pending: VecDeque::new(),
            completeness: Completeness::new(),
            rows: 0,
            finished: false,
        }
    }

    /// Evaluate `query` across the rayon pool. Rows keep the order
    /// [`query`](Self::query) would yield them in.
    pub fn par_collect(&self, query: &Query) -> QueryOutput {
        let completeness = Completeness::new();
        let candidates: Vec<Candidate> = self.candidates(query.area).collect();
        let rows: Vec<QueryResult<QueryRow>> = candidates
            .into_par_iter()
            .map_init(
                || GeometryResolver::new(&self.blocks, &self.codes),
                |resolver, candidate| self.evaluate(query, candidate, resolver, &completeness),
            )
            .flatten_iter()
            .collect();
        let complete = completeness.is_complete();
        info!(rows = rows.len(), complete, "parallel query finished");
        QueryOutput { rows, complete }
    }

    fn candidates(&self, area: BoundingBox) -> impl Iterator<Item = Candidate> + '_ {
        [EntityKind::Node, EntityKind::Way, EntityKind::Relation]
            .into_iter()
            .flat_map(move |kind| {
                let index = self.index(kind);
                let runs = index.cells.runs_intersecting(&self.grid, &area);
                trace!(%kind, runs = runs.len(), "cells intersecting query area");
                runs.into_iter()
                    .flat_map(|run| run.positions())
                    .map(move |position| index.by_cell.get(position).map(|id| (kind, position, id)))
            })
    }

    fn evaluate(
        &self,
        query: &Query,
        candidate: Candidate,
        resolver: &mut GeometryResolver<'_, B>,
        completeness: &Completeness,
    ) -> Vec<QueryResult<QueryRow>> {
        match self.load(query, candidate) {
            Ok(Some(history)) => self.project(query, &history, resolver, completeness),
            Ok(None) => Vec::new(),
            Err(Skip::Excluded) => {
                completeness.mark_incomplete();
                Vec::new()
            }
            Err(Skip::Failed(err)) => {
                completeness.mark_incomplete();
                vec![Err(err)]
            }
        }
    }

    /// The candidate's history if it may lie in the query area.
    fn load(&self, query: &Query, candidate: Candidate) -> Result<Option<VersionedEntity>, Skip> {
        let (kind, position, id) = candidate.map_err(|err| {
            warn!(%err, "index page unreadable");
            Skip::Failed(err.into())
        })?;
        if id < 0 {
            warn!(%kind, position, "cell index position holds no entity");
            return Err(Skip::Failed(
                IndexError::Directory("cell index position holds no entity").into(),
            ));
        }
        let entity = EntityRef::new(kind, id);
        let inconsistent = |entity: EntityRef, reason: String| {
            warn!(%entity, %reason, "index inconsistency");
            Skip::Failed(QueryError::Inconsistent { entity, reason })
        };

        let block = self
            .blocks
            .get_block(entity)
            .map_err(|err| inconsistent(entity, err.to_string()))?;
        if block.entity() != entity {
            return Err(inconsistent(entity, format!("block holds {}", block.entity())));
        }
        if !block.bounding_box().is_some_and(|b| b.intersects(&query.area)) {
            return Ok(None);
        }

        match block.decode(&self.codes) {
            Ok(history) => Ok(Some(history)),
            Err(BlockError::Code(err)) => {
                warn!(%entity, %err, "excluding entity with unresolvable codes");
                Err(Skip::Excluded)
            }
            Err(BlockError::Decode(source)) => {
                warn!(%entity, %source, "block failed to decode");
                Err(Skip::Failed(QueryError::Decode { entity, source }))
            }
        }
    }

    /// One row per query timestamp.
    fn project(
        &self,
        query: &Query,
        history: &VersionedEntity,
        resolver: &mut GeometryResolver<'_, B>,
        completeness: &Completeness,
    ) -> Vec<QueryResult<QueryRow>> {
        let (kind, entity) = (history.kind(), history.entity());
        let versions = reconstruct(history.newest_first(), &query.timestamps);
        let exact = self.config.exact_geometry && query.filter.needs_geometry();
        let mut rows = Vec::new();
        for &at in &query.timestamps {
            let version = versions.get(&at).copied();
            let matches = match version {
                None => Ok(false),
                Some(v) if !v.visible => Ok(false),
                Some(v) if exact => query.filter.apply_with_geometry(
                    kind,
                    v,
                    self.config.geometry_failure,
                    || resolver.geometry(kind, v, at),
                ),
                Some(v) => Ok(query.filter.apply_version(kind, v)),
            };
            match matches {
                Ok(false) if self.config.only_matches => {}
                Ok(matches) => rows.push(Ok(QueryRow {
                    entity,
                    timestamp: at,
                    version: version.cloned(),
                    matches,
                })),
                Err(source) => {
                    completeness.mark_incomplete();
                    rows.push(Err(QueryError::Filter { entity, source }));
                }
            }
        }
        rows
    }
}

/// Why a candidate produced no history.
enum Skip {
    /// Left out without an item.
    Excluded,
    Failed(QueryError),
}

/// Rows collected by [`HistoryStore::par_collect`].
#[derive(Debug)]
pub struct QueryOutput {
    pub rows: Vec<QueryResult<QueryRow>>,
    pub complete: bool,
}

/// Lazy, forward-only stream of query rows.
///
/// Per-entity failures are yielded as `Err` items and the stream goes on.
/// Entities that are skipped without an item (unresolvable codes) clear the
/// [`Completeness`] flag instead.
pub struct QueryStream<'s, B, P> {
    store: &'s HistoryStore<B, P>,
    candidates: Box<dyn Iterator<Item = Candidate> + 's>,
    resolver: GeometryResolver<'s, B>,
    query: Query,
    pending: VecDeque<QueryResult<QueryRow>>,
    completeness: Completeness,
    rows: usize,
    finished: bool,
}

impl<B: BlockSource, P: PageSource> QueryStream<'_, B, P> {
    /// A handle that outlives the stream.
    #[must_use]
    pub fn completeness(&self) -> Completeness {
        self.completeness.clone()
    }

    /// `false` once anything has been skipped or failed so far.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completeness.is_complete()
    }
}

impl<B: BlockSource, P: PageSource> Iterator for QueryStream<'_, B, P> {
    type Item = QueryResult<QueryRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                self.rows += 1;
                return Some(item);
            }
            if self.finished {
                return None;
            }
            let Some(candidate) = self.candidates.next() else {
                self.finished = true;
                info!(
                    rows = self.rows,
                    complete = self.completeness.is_complete(),
                    "query finished"
                );
                return None;
            };
            let store = self.store;
            let rows = store.evaluate(&self.query, candidate, &mut self.resolver, &self.completeness);
            self.pending.extend(rows);
        }
    }
}

#[cfg(test)]
mod tests {
    use geohist_codes::{CodeSpace, CodeTable};
    use geohist_entity::{Coordinate, Tag, VersionedEntity};
    use geohist_filter::FilterBuilder;

    use super::*;
    use crate::{GeohistConfig, HistoryWriter};

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn world() -> BoundingBox {
        BoundingBox::from_degrees(-180.0, -90.0, 180.0, 90.0).unwrap()
    }

    #[test]
    fn test_snapshot_rows_per_timestamp() {
        let codes = Arc::new(CodeTable::new());
        let key = codes.resolve_one(CodeSpace::Key, "amenity").unwrap();
        let value = codes.resolve_one(CodeSpace::Value, "cafe").unwrap();

        let mut writer = HistoryWriter::new(Arc::clone(&codes), GeohistConfig::default()).unwrap();
        writer
            .add(
                VersionedEntity::new(
                    EntityKind::Node,
                    1,
                    vec![
                        Version::node(1, ts(100), Coordinate::new(10, 10)),
                        Version::node(2, ts(200), Coordinate::new(10, 10))
                            .with_tags([Tag::new(key, value)]),
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        let dataset = writer.finish().unwrap();
        let store = dataset.open(Arc::clone(&codes), &GeohistConfig::default()).unwrap();

        let filter = FilterBuilder::new(&codes).tag_equals("amenity", "cafe").unwrap();
        let query = Query::new(world(), [ts(250), ts(50), ts(150)], filter);
        let rows: Vec<QueryRow> = store.query(query).map(Result::unwrap).collect();

        let summary: Vec<_> = rows
            .iter()
            .map(|r| (r.timestamp, r.version.as_ref().map(|v| v.version), r.matches))
            .collect();
        assert_eq!(
            summary,
            vec![(ts(50), None, false), (ts(150), Some(1), false), (ts(250), Some(2), true)]
        );
    }

    #[test]
    fn test_completeness_handle_outlives_stream() {
        let codes = Arc::new(CodeTable::new());
        let writer = HistoryWriter::new(Arc::clone(&codes), GeohistConfig::default()).unwrap();
        let dataset = writer.finish().unwrap();
        let store = dataset.open(codes, &GeohistConfig::default()).unwrap();

        let stream = store.query(Query::snapshot(world(), ts(1), Filter::constant(true)));
        let handle = stream.completeness();
        assert_eq!(stream.count(), 0);
        assert!(handle.is_complete());
    }
}
