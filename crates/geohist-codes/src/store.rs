//! Backing store contract for code tables.

use parking_lot::Mutex;

use crate::{Code, CodeEntry, CodeResult, CodeSpace, table::Dict};

/// Persistent side of a [`CodeTable`](crate::CodeTable).
///
/// Implementations must be get-or-create on `batch_resolve`: resolving a
/// string twice, from any process, yields the same code. Lookup of an
/// unknown code answers `None`; it is not an error.
pub trait CodeStore: Send + Sync {
    /// Codes for `strings`, in input order, creating the missing ones.
    fn batch_resolve(&self, space: CodeSpace, strings: &[&str]) -> CodeResult<Vec<Code>>;

    /// Strings for `codes`, in input order.
    fn batch_lookup(&self, space: CodeSpace, codes: &[Code]) -> CodeResult<Vec<Option<String>>>;
}

/// In-process store, shared between tables through an `Arc`.
#[derive(Default)]
pub struct MemoryCodeStore {
    spaces: [Mutex<Dict>; 3],
}

impl MemoryCodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries of a space ordered by code.
    #[must_use]
    pub fn entries(&self, space: CodeSpace) -> Vec<CodeEntry> {
        self.spaces[space.index()].lock().entries()
    }
}

impl CodeStore for MemoryCodeStore {
    fn batch_resolve(&self, space: CodeSpace, strings: &[&str]) -> CodeResult<Vec<Code>> {
        let mut dict = self.spaces[space.index()].lock();
        strings
            .iter()
            .map(|text| dict.get_or_assign(space, text))
            .collect()
    }

    fn batch_lookup(&self, space: CodeSpace, codes: &[Code]) -> CodeResult<Vec<Option<String>>> {
        let dict = self.spaces[space.index()].lock();
        Ok(codes
            .iter()
            .map(|code| dict.text(*code).map(|text| text.to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_is_get_or_create() {
        let store = MemoryCodeStore::new();
        let first = store
            .batch_resolve(CodeSpace::Role, &["outer", "inner"])
            .unwrap();
        let second = store
            .batch_resolve(CodeSpace::Role, &["inner", "outer", "outer"])
            .unwrap();
        assert_eq!(second, vec![first[1], first[0], first[0]]);
        assert_eq!(store.entries(CodeSpace::Role).len(), 2);
        assert!(store.entries(CodeSpace::Key).is_empty());
    }

    #[test]
    fn test_store_lookup_unknown_is_none() {
        let store = MemoryCodeStore::new();
        let codes = store.batch_resolve(CodeSpace::Key, &["name"]).unwrap();
        let found = store
            .batch_lookup(CodeSpace::Key, &[codes[0], Code::from_raw(99)])
            .unwrap();
        assert_eq!(found, vec![Some("name".to_string()), None]);
    }
}
