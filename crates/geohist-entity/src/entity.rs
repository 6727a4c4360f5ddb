//! Entity identifiers, versions and histories.

use std::fmt;

use geohist_codes::Code;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{BoundingBox, Coordinate, HistoryError};

/// Seconds since the Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const MIN: Timestamp = Timestamp(0);
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    #[inline]
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    #[inline]
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three kinds of map entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntityKind {
    Node = 0,
    Way = 1,
    Relation = 2,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Node, EntityKind::Way, EntityKind::Relation];

    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Node),
            1 => Some(Self::Way),
            2 => Some(Self::Relation),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed entity identity. Ids are only unique within a kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityRef {
    #[must_use]
    pub const fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }

    #[must_use]
    pub const fn node(id: i64) -> Self {
        Self::new(EntityKind::Node, id)
    }

    #[must_use]
    pub const fn way(id: i64) -> Self {
        Self::new(EntityKind::Way, id)
    }

    #[must_use]
    pub const fn relation(id: i64) -> Self {
        Self::new(EntityKind::Relation, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// A `(key, value)` tag in code form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: Code,
    pub value: Code,
}

impl Tag {
    #[must_use]
    pub const fn new(key: Code, value: Code) -> Self {
        Self { key, value }
    }
}

/// A way node reference or relation member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub kind: EntityKind,
    pub role: Code,
}

impl Member {
    #[must_use]
    pub const fn new(kind: EntityKind, id: i64, role: Code) -> Self {
        Self { id, kind, role }
    }

    /// A way's node reference: node kind, no role.
    #[must_use]
    pub const fn way_node(id: i64) -> Self {
        Self::new(EntityKind::Node, id, Code::from_raw(0))
    }

    #[must_use]
    pub const fn entity(&self) -> EntityRef {
        EntityRef::new(self.kind, self.id)
    }
}

/// Type-specific content of a version.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Payload {
    /// Deleted versions carry nothing.
    #[default]
    Empty,
    Node(Coordinate),
    Members(Vec<Member>),
}

/// One published state of an entity, valid from `timestamp` until the next
/// version supersedes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    pub version: u32,
    pub timestamp: Timestamp,
    pub changeset: i64,
    pub user: u32,
    pub visible: bool,
    pub tags: SmallVec<[Tag; 4]>,
    pub payload: Payload,
}

impl Version {
    #[must_use]
    pub fn node(version: u32, timestamp: Timestamp, coordinate: Coordinate) -> Self {
        Self::visible(version, timestamp, Payload::Node(coordinate))
    }

    #[must_use]
    pub fn way(version: u32, timestamp: Timestamp, nodes: impl IntoIterator<Item = i64>) -> Self {
        let members = nodes.into_iter().map(Member::way_node).collect();
        Self::visible(version, timestamp, Payload::Members(members))
    }

    #[must_use]
    pub fn relation(
        version: u32,
        timestamp: Timestamp,
        members: impl IntoIterator<Item = Member>,
    ) -> Self {
        Self::visible(
            version,
            timestamp,
            Payload::Members(members.into_iter().collect()),
        )
    }

    /// A deletion.
    #[must_use]
    pub fn deleted(version: u32, timestamp: Timestamp) -> Self {
        Self {
            version,
            timestamp,
            changeset: 0,
            user: 0,
            visible: false,
            tags: SmallVec::new(),
            payload: Payload::Empty,
        }
    }

    fn visible(version: u32, timestamp: Timestamp, payload: Payload) -> Self {
        Self {
            visible: true,
            payload,
            ..Self::deleted(version, timestamp)
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_changeset(mut self, changeset: i64) -> Self {
        self.changeset = changeset;
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: u32) -> Self {
        self.user = user;
        self
    }

    #[must_use]
    pub fn coordinate(&self) -> Option<Coordinate> {
        match self.payload {
            Payload::Node(coordinate) => Some(coordinate),
            _ => None,
        }
    }

    #[must_use]
    pub fn members(&self) -> &[Member] {
        match &self.payload {
            Payload::Members(members) => members,
            _ => &[],
        }
    }

    /// Value code of `key`, if the version carries it.
    #[must_use]
    pub fn tag_value(&self, key: Code) -> Option<Code> {
        self.tags.iter().find(|tag| tag.key == key).map(|tag| tag.value)
    }

    #[must_use]
    pub fn has_key(&self, key: Code) -> bool {
        self.tag_value(key).is_some()
    }

    /// Check the version against the kind of entity it belongs to.
    fn validate(&self, kind: EntityKind, index: usize) -> Result<(), HistoryError> {
        if !self.visible {
            if !self.tags.is_empty() || self.payload != Payload::Empty {
                return Err(HistoryError::DeletionWithContent { index });
            }
            return Ok(());
        }
        match (&self.payload, kind) {
            (Payload::Node(_), EntityKind::Node) => Ok(()),
            (Payload::Members(members), EntityKind::Way) => {
                if members
                    .iter()
                    .any(|m| m.kind != EntityKind::Node || m.role != Code::from_raw(0))
                {
                    Err(HistoryError::InvalidWayMember { index })
                } else {
                    Ok(())
                }
            }
            (Payload::Members(_), EntityKind::Relation) => Ok(()),
            _ => Err(HistoryError::PayloadMismatch { index, kind }),
        }
    }
}

/// The complete edit history of one entity, oldest version first.
///
/// Construction validates the history invariants: at least one version,
/// strictly increasing timestamps and version numbers, deletions without
/// content, payloads that match the entity kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedEntity {
    kind: EntityKind,
    id: i64,
    versions: Vec<Version>,
}

impl VersionedEntity {
    pub fn new(kind: EntityKind, id: i64, versions: Vec<Version>) -> Result<Self, HistoryError> {
        if versions.is_empty() {
            return Err(HistoryError::Empty);
        }
        for (index, version) in versions.iter().enumerate() {
            version.validate(kind, index)?;
            if index > 0 {
                let previous = &versions[index - 1];
                if version.timestamp <= previous.timestamp {
                    return Err(HistoryError::TimestampOrder { index });
                }
                if version.version <= previous.version {
                    return Err(HistoryError::VersionOrder { index });
                }
            }
        }
        Ok(Self { kind, id, versions })
    }

    /// For the decoder, which enforces the invariants while reading.
    pub(crate) const fn from_parts_unchecked(
        kind: EntityKind,
        id: i64,
        versions: Vec<Version>,
    ) -> Self {
        Self { kind, id, versions }
    }

    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    #[must_use]
    pub const fn entity(&self) -> EntityRef {
        EntityRef::new(self.kind, self.id)
    }

    /// All versions, oldest first.
    #[must_use]
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// All versions, newest first.
    pub fn newest_first(&self) -> impl ExactSizeIterator<Item = &Version> + DoubleEndedIterator {
        self.versions.iter().rev()
    }

    #[must_use]
    pub fn latest(&self) -> &Version {
        // Non-empty by construction.
        &self.versions[self.versions.len() - 1]
    }

    #[must_use]
    pub fn into_versions(self) -> Vec<Version> {
        self.versions
    }

    /// Box around every coordinate a node ever had. `None` for ways and
    /// relations, whose extent depends on their members.
    #[must_use]
    pub fn node_bounds(&self) -> Option<BoundingBox> {
        self.versions
            .iter()
            .filter_map(Version::coordinate)
            .fold(None, |bounds: Option<BoundingBox>, c| {
                Some(bounds.map_or_else(|| BoundingBox::point(c), |b| b.extended(c)))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_history_must_not_be_empty() {
        assert_eq!(
            VersionedEntity::new(EntityKind::Node, 1, Vec::new()),
            Err(HistoryError::Empty)
        );
    }

    #[test]
    fn test_history_order_is_enforced() {
        let c = Coordinate::new(0, 0);
        let err = VersionedEntity::new(
            EntityKind::Node,
            1,
            vec![Version::node(1, ts(10), c), Version::node(2, ts(10), c)],
        )
        .unwrap_err();
        assert_eq!(err, HistoryError::TimestampOrder { index: 1 });

        let err = VersionedEntity::new(
            EntityKind::Node,
            1,
            vec![Version::node(2, ts(10), c), Version::node(2, ts(11), c)],
        )
        .unwrap_err();
        assert_eq!(err, HistoryError::VersionOrder { index: 1 });
    }

    #[test]
    fn test_payload_must_match_kind() {
        let err = VersionedEntity::new(EntityKind::Way, 7, vec![Version::node(1, ts(1), Coordinate::new(0, 0))])
            .unwrap_err();
        assert_eq!(
            err,
            HistoryError::PayloadMismatch {
                index: 0,
                kind: EntityKind::Way
            }
        );

        let relation_member = Member::new(EntityKind::Way, 3, Code::from_raw(1));
        let err = VersionedEntity::new(
            EntityKind::Way,
            7,
            vec![Version::relation(1, ts(1), [relation_member])],
        )
        .unwrap_err();
        assert_eq!(err, HistoryError::InvalidWayMember { index: 0 });
    }

    #[test]
    fn test_deletion_carries_nothing() {
        let mut deleted = Version::deleted(2, ts(5));
        deleted.tags.push(Tag::new(Code::from_raw(0), Code::from_raw(0)));
        let err = VersionedEntity::new(
            EntityKind::Node,
            1,
            vec![Version::node(1, ts(1), Coordinate::new(0, 0)), deleted],
        )
        .unwrap_err();
        assert_eq!(err, HistoryError::DeletionWithContent { index: 1 });
    }

    #[test]
    fn test_node_bounds_cover_history() {
        let node = VersionedEntity::new(
            EntityKind::Node,
            1,
            vec![
                Version::node(1, ts(1), Coordinate::new(10, 50)),
                Version::deleted(2, ts(2)),
                Version::node(3, ts(3), Coordinate::new(-20, 60)),
            ],
        )
        .unwrap();
        let bounds = node.node_bounds().unwrap();
        assert_eq!(bounds.min, Coordinate::new(-20, 50));
        assert_eq!(bounds.max, Coordinate::new(10, 60));
        assert_eq!(node.latest().version, 3);
        assert_eq!(node.newest_first().next().unwrap().version, 3);
    }

    #[test]
    fn test_entity_ref_display() {
        assert_eq!(EntityRef::way(42).to_string(), "way/42");
        assert_eq!(EntityRef::node(-1).to_string(), "node/-1");
    }
}
