//! The filter tree.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use geohist_entity::EntityKind;

use crate::{FilterError, FilterResult, GeometryTest, GeometryTypes, Predicate};

/// Boolean combination of [`Predicate`]s, always in negation normal form.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Leaf(Predicate),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
}

impl Filter {
    #[must_use]
    pub const fn constant(value: bool) -> Self {
        Self::Leaf(Predicate::Constant(value))
    }

    #[must_use]
    pub const fn kind(kind: EntityKind) -> Self {
        Self::Leaf(Predicate::Kind {
            kind,
            negated: false,
        })
    }

    #[must_use]
    pub const fn geometry_types(types: GeometryTypes) -> Self {
        Self::Leaf(Predicate::Geometry {
            test: GeometryTest::Types(types),
            negated: false,
        })
    }

    /// Area between `min` and `max` square metres, inclusive.
    pub fn area(min: f64, max: f64) -> FilterResult<Self> {
        check_range(min, max)?;
        Ok(Self::Leaf(Predicate::Geometry {
            test: GeometryTest::Area { min, max },
            negated: false,
        }))
    }

    /// Length (perimeter for polygons) between `min` and `max` metres.
    pub fn length(min: f64, max: f64) -> FilterResult<Self> {
        check_range(min, max)?;
        Ok(Self::Leaf(Predicate::Geometry {
            test: GeometryTest::Length { min, max },
            negated: false,
        }))
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// The complement, by De Morgan down to the leaves.
    #[must_use]
    pub fn negate(&self) -> Self {
        match self {
            Self::Leaf(predicate) => Self::Leaf(predicate.negate()),
            Self::And(a, b) => a.negate().or(b.negate()),
            Self::Or(a, b) => a.negate().and(b.negate()),
        }
    }

    /// Whether any leaf needs the entity's geometry.
    #[must_use]
    pub fn needs_geometry(&self) -> bool {
        match self {
            Self::Leaf(predicate) => predicate.needs_geometry(),
            Self::And(a, b) | Self::Or(a, b) => a.needs_geometry() || b.needs_geometry(),
        }
    }

    /// Leaves in left-to-right order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Self::Leaf(predicate) => out.push(predicate),
                Self::And(a, b) | Self::Or(a, b) => {
                    stack.push(b);
                    stack.push(a);
                }
            }
        }
        out
    }
}

fn check_range(min: f64, max: f64) -> FilterResult<()> {
    if min.is_nan() || max.is_nan() || min > max {
        return Err(FilterError::InvalidRange { min, max });
    }
    Ok(())
}

impl BitAnd for Filter {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl BitOr for Filter {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

impl Not for Filter {
    type Output = Self;

    fn not(self) -> Self {
        self.negate()
    }
}

impl From<Predicate> for Filter {
    fn from(predicate: Predicate) -> Self {
        Self::Leaf(predicate)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(predicate) => write!(f, "{predicate}"),
            Self::And(a, b) => {
                for (i, operand) in [a, b].into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    if matches!(**operand, Self::Or(..)) {
                        write!(f, "({operand})")?;
                    } else {
                        write!(f, "{operand}")?;
                    }
                }
                Ok(())
            }
            Self::Or(a, b) => write!(f, "{a} or {b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds() -> (Filter, Filter, Filter) {
        (
            Filter::kind(EntityKind::Node),
            Filter::kind(EntityKind::Way),
            Filter::kind(EntityKind::Relation),
        )
    }

    #[test]
    fn test_display_parenthesises_or_inside_and() {
        let (n, w, r) = kinds();
        assert_eq!(
            (n.clone() & (w.clone() | r.clone())).to_string(),
            "type:node and (type:way or type:relation)"
        );
        assert_eq!(
            (n.clone() | (w.clone() & r.clone())).to_string(),
            "type:node or type:way and type:relation"
        );
        assert_eq!(
            ((n.clone() | w.clone()) & (w | r)).to_string(),
            "(type:node or type:way) and (type:way or type:relation)"
        );
        assert_eq!((n & Filter::constant(true)).to_string(), "type:node and true");
    }

    #[test]
    fn test_negation_is_de_morgan() {
        let (n, w, r) = kinds();
        let and = n.clone() & w.clone();
        assert_eq!(and.negate(), n.negate() | w.negate());

        let nested = n.clone() & (w.clone() | r.clone());
        assert_eq!(nested.negate(), n.negate() | (w.negate() & r.negate()));
        assert_eq!(
            nested.negate().to_string(),
            "type!:node or type!:way and type!:relation"
        );
    }

    #[test]
    fn test_double_negation_is_identity() {
        let (n, w, r) = kinds();
        let filter = (n | Filter::area(1.0, 5.0).unwrap()) & !(w & r);
        assert_eq!(filter.negate().negate(), filter);
        assert_eq!(!!filter.clone(), filter);
    }

    #[test]
    fn test_ranges_are_checked() {
        assert!(Filter::area(5.0, 1.0).is_err());
        assert!(Filter::length(f64::NAN, 1.0).is_err());
        assert!(Filter::length(0.0, f64::INFINITY).is_ok());
    }

    #[test]
    fn test_needs_geometry_and_leaves() {
        let (n, w, _) = kinds();
        let plain = n.clone() | w.clone();
        assert!(!plain.needs_geometry());
        let with_area = plain & Filter::area(0.0, 1.0).unwrap();
        assert!(with_area.needs_geometry());
        assert_eq!(with_area.leaves().len(), 3);
        assert_eq!(with_area.leaves()[0], &Predicate::Kind { kind: EntityKind::Node, negated: false });
    }
}
