//! Filter evaluation against entity versions.

use geohist_entity::{EntityKind, Geometry, GeometryError, Version, VersionedEntity};
use serde::{Deserialize, Serialize};

use crate::{Filter, FilterError, Predicate};

/// What a geometry predicate evaluates to when the geometry cannot be built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryFailure {
    /// The predicate is false.
    #[default]
    NoMatch,
    /// Evaluation stops with [`FilterError::Geometry`].
    Strict,
}

/// Builds the geometry on first use, at most once.
struct LazyGeometry<F> {
    supplier: Option<F>,
    built: Option<Result<Geometry, GeometryError>>,
}

impl<F: FnOnce() -> Result<Geometry, GeometryError>> LazyGeometry<F> {
    const fn new(supplier: F) -> Self {
        Self {
            supplier: Some(supplier),
            built: None,
        }
    }

    fn get(&mut self) -> &Result<Geometry, GeometryError> {
        let supplier = &mut self.supplier;
        self.built.get_or_insert_with(|| match supplier.take() {
            Some(build) => build(),
            None => Err(GeometryError::Unsupported("geometry supplier already consumed")),
        })
    }
}

struct Eval<'a, F> {
    kind: EntityKind,
    version: &'a Version,
    geometry: Option<LazyGeometry<F>>,
    on_failure: GeometryFailure,
}

impl<F: FnOnce() -> Result<Geometry, GeometryError>> Eval<'_, F> {
    fn eval(&mut self, filter: &Filter) -> Result<bool, FilterError> {
        match filter {
            Filter::Leaf(predicate) => self.leaf(predicate),
            Filter::And(a, b) => Ok(self.eval(a)? && self.eval(b)?),
            Filter::Or(a, b) => Ok(self.eval(a)? || self.eval(b)?),
        }
    }

    fn leaf(&mut self, predicate: &Predicate) -> Result<bool, FilterError> {
        if let Some(result) = predicate.matches_version(self.kind, self.version) {
            return Ok(result);
        }
        // Without geometry the answer is a superset: geometry leaves pass.
        let Some(lazy) = self.geometry.as_mut() else {
            return Ok(true);
        };
        match lazy.get() {
            Ok(geometry) => Ok(predicate.matches_geometry(geometry)),
            Err(err) => match self.on_failure {
                GeometryFailure::NoMatch => Ok(false),
                GeometryFailure::Strict => Err(FilterError::Geometry(err.clone())),
            },
        }
    }
}

type NoGeometry = fn() -> Result<Geometry, GeometryError>;

impl Filter {
    /// Evaluate against one version of an entity of `kind`, treating
    /// geometry predicates as satisfied. A deleted version is evaluated as
    /// an untagged version of its kind; callers that only want live
    /// entities check [`Version::visible`] first.
    #[must_use]
    pub fn apply_version(&self, kind: EntityKind, version: &Version) -> bool {
        let mut eval: Eval<'_, NoGeometry> = Eval {
            kind,
            version,
            geometry: None,
            on_failure: GeometryFailure::NoMatch,
        };
        eval.eval(self).unwrap_or(false)
    }

    /// Evaluate against the latest version.
    #[must_use]
    pub fn apply_current(&self, entity: &VersionedEntity) -> bool {
        self.apply_version(entity.kind(), entity.latest())
    }

    /// Whether any visible version in the history matches.
    #[must_use]
    pub fn apply_any_version(&self, entity: &VersionedEntity) -> bool {
        entity
            .newest_first()
            .filter(|version| version.visible)
            .any(|version| self.apply_version(entity.kind(), version))
    }

    /// Exact evaluation. `geometry` is called at most once, and only when a
    /// geometry predicate is reached.
    pub fn apply_with_geometry<F>(
        &self,
        kind: EntityKind,
        version: &Version,
        on_failure: GeometryFailure,
        geometry: F,
    ) -> Result<bool, FilterError>
    where
        F: FnOnce() -> Result<Geometry, GeometryError>,
    {
        Eval {
            kind,
            version,
            geometry: Some(LazyGeometry::new(geometry)),
            on_failure,
        }
        .eval(self)
    }
}
