//! Edits that took effect within a time range.

use std::ops::Range;

use bitflags::bitflags;
use geohist_entity::{Timestamp, Version, VersionedEntity};

bitflags! {
    /// What an edit changed, relative to the version before it.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ContributionKind: u8 {
        const CREATION = 1 << 0;
        const DELETION = 1 << 1;
        const TAG_CHANGE = 1 << 2;
        /// Own coordinates or member list changed. Members moving is not
        /// visible here.
        const GEOMETRY_CHANGE = 1 << 3;
        /// Visible again after a deletion.
        const RESTORATION = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Contribution<'a> {
    pub version: &'a Version,
    /// The version this one replaced, if any.
    pub previous: Option<&'a Version>,
    /// Empty for edits that only touched metadata.
    pub kind: ContributionKind,
}

impl ContributionKind {
    fn between(previous: Option<&Version>, last_visible: Option<&Version>, current: &Version) -> Self {
        let Some(previous) = previous else {
            return if current.visible {
                Self::CREATION
            } else {
                Self::DELETION
            };
        };
        match (previous.visible, current.visible) {
            (true, false) => Self::DELETION,
            (false, false) => Self::empty(),
            (was_visible, true) => {
                let mut kind = if was_visible {
                    Self::empty()
                } else {
                    Self::RESTORATION
                };
                // A restoration is compared against what was last seen.
                let Some(before) = last_visible else {
                    return kind;
                };
                if before.tags != current.tags {
                    kind |= Self::TAG_CHANGE;
                }
                if before.payload != current.payload {
                    kind |= Self::GEOMETRY_CHANGE;
                }
                kind
            }
        }
    }
}

/// Every version of `entity` whose timestamp lies in `range`, oldest first.
pub fn contributions(
    entity: &VersionedEntity,
    range: Range<Timestamp>,
) -> impl Iterator<Item = Contribution<'_>> {
    let mut previous: Option<&Version> = None;
    let mut last_visible: Option<&Version> = None;
    entity.versions().iter().filter_map(move |version| {
        let kind = ContributionKind::between(previous, last_visible, version);
        let contribution = Contribution {
            version,
            previous,
            kind,
        };
        previous = Some(version);
        if version.visible {
            last_visible = Some(version);
        }
        range.contains(&version.timestamp).then_some(contribution)
    })
}
