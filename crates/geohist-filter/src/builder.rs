//! Compiling string-level predicates through the code table.

use geohist_codes::{CodeSpace, CodeTable};
use smallvec::SmallVec;

use crate::{Filter, FilterResult, Label, Predicate, TagTest};

/// Turns tag keys and values into coded [`Filter`] leaves.
///
/// Strings are resolved with get-or-create semantics, so a filter on a key
/// nobody has used yet compiles and simply never matches.
pub struct FilterBuilder<'a> {
    codes: &'a CodeTable,
}

impl<'a> FilterBuilder<'a> {
    #[must_use]
    pub const fn new(codes: &'a CodeTable) -> Self {
        Self { codes }
    }

    fn label(&self, space: CodeSpace, text: &str) -> FilterResult<Label> {
        Ok(Label::new(self.codes.resolve_one(space, text)?, text))
    }

    /// `key=*`
    pub fn tag_exists(&self, key: &str) -> FilterResult<Filter> {
        Ok(tag(TagTest::Exists(self.label(CodeSpace::Key, key)?)))
    }

    /// `key=value`
    pub fn tag_equals(&self, key: &str, value: &str) -> FilterResult<Filter> {
        Ok(tag(TagTest::Equals(
            self.label(CodeSpace::Key, key)?,
            self.label(CodeSpace::Value, value)?,
        )))
    }

    /// `key in (values...)`
    pub fn tag_in(&self, key: &str, values: &[&str]) -> FilterResult<Filter> {
        let key = self.label(CodeSpace::Key, key)?;
        let resolved = self.codes.resolve(CodeSpace::Value, values)?;
        let mut labels: SmallVec<[Label; 4]> = SmallVec::with_capacity(values.len());
        for &value in values {
            if labels.iter().any(|l: &Label| &*l.text == value) {
                continue;
            }
            if let Some(&code) = resolved.get(value) {
                labels.push(Label::new(code, value));
            }
        }
        Ok(tag(TagTest::In(key, labels)))
    }
}

fn tag(test: TagTest) -> Filter {
    Filter::Leaf(Predicate::Tag {
        test,
        negated: false,
    })
}
