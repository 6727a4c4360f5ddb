//! Leaf predicates.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use geohist_codes::Code;
use geohist_entity::{EntityKind, Geometry, GeometryKind, Version};
use smallvec::SmallVec;

/// A compiled code together with the string it was compiled from, kept
/// for display.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label {
    pub code: Code,
    pub text: Arc<str>,
}

impl Label {
    #[must_use]
    pub fn new(code: Code, text: impl Into<Arc<str>>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagTest {
    /// The key is present with any value.
    Exists(Label),
    Equals(Label, Label),
    /// The key is present with one of the values.
    In(Label, SmallVec<[Label; 4]>),
}

impl TagTest {
    fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Exists(key) => version.has_key(key.code),
            Self::Equals(key, value) => version.tag_value(key.code) == Some(value.code),
            Self::In(key, values) => version
                .tag_value(key.code)
                .is_some_and(|found| values.iter().any(|v| v.code == found)),
        }
    }
}

bitflags! {
    /// A set of [`GeometryKind`]s.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct GeometryTypes: u8 {
        const POINT = 0b0001;
        const LINE = 0b0010;
        const POLYGON = 0b0100;
        const OTHER = 0b1000;
    }
}

impl GeometryTypes {
    #[must_use]
    pub const fn of(kind: GeometryKind) -> Self {
        match kind {
            GeometryKind::Point => Self::POINT,
            GeometryKind::Line => Self::LINE,
            GeometryKind::Polygon => Self::POLYGON,
            GeometryKind::Other => Self::OTHER,
        }
    }
}

impl fmt::Display for GeometryTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::POINT, GeometryKind::Point),
            (Self::LINE, GeometryKind::Line),
            (Self::POLYGON, GeometryKind::Polygon),
            (Self::OTHER, GeometryKind::Other),
        ];
        let mut first = true;
        for (flag, kind) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                first = false;
                write!(f, "{kind}")?;
            }
        }
        Ok(())
    }
}

/// Tests that need the entity's geometry. Ranges are inclusive.
#[derive(Clone, Debug, PartialEq)]
pub enum GeometryTest {
    Types(GeometryTypes),
    /// Square metres.
    Area { min: f64, max: f64 },
    /// Metres.
    Length { min: f64, max: f64 },
}

impl GeometryTest {
    fn matches(&self, geometry: &Geometry) -> bool {
        match *self {
            Self::Types(types) => types.contains(GeometryTypes::of(geometry.kind())),
            Self::Area { min, max } => (min..=max).contains(&geometry.area_m2()),
            Self::Length { min, max } => (min..=max).contains(&geometry.length_m()),
        }
    }
}

/// A leaf of a filter tree. Every leaf carries its own negation.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Constant(bool),
    Tag { test: TagTest, negated: bool },
    Kind { kind: EntityKind, negated: bool },
    Geometry { test: GeometryTest, negated: bool },
}

impl Predicate {
    /// The complementary leaf.
    #[must_use]
    pub fn negate(&self) -> Self {
        match self {
            Self::Constant(value) => Self::Constant(!value),
            Self::Tag { test, negated } => Self::Tag {
                test: test.clone(),
                negated: !negated,
            },
            Self::Kind { kind, negated } => Self::Kind {
                kind: *kind,
                negated: !negated,
            },
            Self::Geometry { test, negated } => Self::Geometry {
                test: test.clone(),
                negated: !negated,
            },
        }
    }

    #[must_use]
    pub const fn needs_geometry(&self) -> bool {
        matches!(self, Self::Geometry { .. })
    }

    /// Evaluate everything except geometry. `None` for geometry leaves.
    pub(crate) fn matches_version(&self, kind: EntityKind, version: &Version) -> Option<bool> {
        match self {
            Self::Constant(value) => Some(*value),
            Self::Tag { test, negated } => Some(test.matches(version) != *negated),
            Self::Kind {
                kind: wanted,
                negated,
            } => Some((*wanted == kind) != *negated),
            Self::Geometry { .. } => None,
        }
    }

    pub(crate) fn matches_geometry(&self, geometry: &Geometry) -> bool {
        match self {
            Self::Geometry { test, negated } => test.matches(geometry) != *negated,
            _ => false,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => write!(f, "{value}"),
            Self::Tag { test, negated } => {
                let not = if *negated { "!" } else { "" };
                match test {
                    TagTest::Exists(key) => write!(f, "{key}{not}=*"),
                    TagTest::Equals(key, value) => write!(f, "{key}{not}={value}"),
                    TagTest::In(key, values) => {
                        let op = if *negated { "not in" } else { "in" };
                        write!(f, "{key} {op} (")?;
                        for (i, value) in values.iter().enumerate() {
                            if i > 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{value}")?;
                        }
                        f.write_str(")")
                    }
                }
            }
            Self::Kind { kind, negated } => {
                let not = if *negated { "!" } else { "" };
                write!(f, "type{not}:{kind}")
            }
            Self::Geometry { test, negated } => {
                let not = if *negated { "!" } else { "" };
                match test {
                    GeometryTest::Types(types) => write!(f, "geometry{not}:{types}"),
                    GeometryTest::Area { min, max } => write!(f, "area{not}:({min}..{max})"),
                    GeometryTest::Length { min, max } => write!(f, "length{not}:({min}..{max})"),
                }
            }
        }
    }
}
