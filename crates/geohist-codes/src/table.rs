//! The shared, lock-protected code table.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{Code, CodeEntry, CodeError, CodeResult, CodeSpace, CodeStore};

/// One bidirectional dictionary. `Arc<str>` is shared by both directions.
#[derive(Default)]
pub(crate) struct Dict {
    by_text: HashMap<Arc<str>, Code>,
    by_code: HashMap<Code, Arc<str>>,
    next: u64,
}

impl Dict {
    pub(crate) fn get(&self, text: &str) -> Option<Code> {
        self.by_text.get(text).copied()
    }

    pub(crate) fn text(&self, code: Code) -> Option<&Arc<str>> {
        self.by_code.get(&code)
    }

    /// Record a code assigned elsewhere.
    pub(crate) fn insert(&mut self, text: Arc<str>, code: Code) {
        self.next = self.next.max(u64::from(code.as_raw()) + 1);
        self.by_code.insert(code, Arc::clone(&text));
        self.by_text.insert(text, code);
    }

    pub(crate) fn get_or_assign(&mut self, space: CodeSpace, text: &str) -> CodeResult<Code> {
        if let Some(code) = self.get(text) {
            return Ok(code);
        }
        let raw = u32::try_from(self.next).map_err(|_| CodeError::Exhausted(space))?;
        let code = Code::from_raw(raw);
        self.insert(Arc::from(text), code);
        Ok(code)
    }

    pub(crate) fn entries(&self) -> Vec<CodeEntry> {
        let mut entries: Vec<_> = self
            .by_code
            .iter()
            .map(|(code, text)| CodeEntry {
                text: text.to_string(),
                code: *code,
            })
            .collect();
        entries.sort_unstable_by_key(|entry| entry.code);
        entries
    }

    pub(crate) fn len(&self) -> usize {
        self.by_code.len()
    }
}

/// Bidirectional key/value/role interning shared by ingestion and queries.
///
/// Reads take a shared lock; creating codes takes the exclusive lock and
/// re-checks, so racing resolvers of the same string always agree on one
/// code. With a [`CodeStore`] attached the table acts as a cache in front of
/// it, and new codes are persisted before `resolve` returns them.
pub struct CodeTable {
    spaces: [RwLock<Dict>; 3],
    store: Option<Arc<dyn CodeStore>>,
}

impl Default for CodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeTable {
    /// A purely in-memory table. Operations on it never fail.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spaces: Default::default(),
            store: None,
        }
    }

    /// A table backed by `store`.
    #[must_use]
    pub fn with_store(store: Arc<dyn CodeStore>) -> Self {
        Self {
            spaces: Default::default(),
            store: Some(store),
        }
    }

    /// Seed a table from persisted entries, keeping their codes.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (CodeSpace, CodeEntry)>) -> Self {
        let table = Self::new();
        for (space, entry) in entries {
            table.spaces[space.index()]
                .write()
                .insert(Arc::from(entry.text), entry.code);
        }
        table
    }

    /// Batch get-or-create.
    pub fn resolve(
        &self,
        space: CodeSpace,
        strings: &[&str],
    ) -> CodeResult<HashMap<Arc<str>, Code>> {
        let mut resolved = HashMap::with_capacity(strings.len());
        // First-occurrence order, so new codes follow the batch.
        let mut missing: Vec<&str> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        {
            let dict = self.spaces[space.index()].read();
            for &text in strings {
                match dict.by_text.get_key_value(text) {
                    Some((key, code)) => {
                        resolved.insert(Arc::clone(key), *code);
                    }
                    None => {
                        if seen.insert(text) {
                            missing.push(text);
                        }
                    }
                }
            }
        }

        if missing.is_empty() {
            return Ok(resolved);
        }

        let mut dict = self.spaces[space.index()].write();
        // Another writer may have created some of them meanwhile.
        missing.retain(|text| match dict.by_text.get_key_value(*text) {
            Some((key, code)) => {
                resolved.insert(Arc::clone(key), *code);
                false
            }
            None => true,
        });

        match &self.store {
            Some(store) if !missing.is_empty() => {
                let codes = store.batch_resolve(space, &missing)?;
                if codes.len() != missing.len() {
                    return Err(CodeError::BatchMismatch {
                        expected: missing.len(),
                        got: codes.len(),
                    });
                }
                for (text, code) in missing.iter().zip(codes) {
                    let text: Arc<str> = Arc::from(*text);
                    dict.insert(Arc::clone(&text), code);
                    resolved.insert(text, code);
                }
            }
            _ => {
                for text in &missing {
                    let code = dict.get_or_assign(space, text)?;
                    trace!(%space, text, %code, "assigned code");
                    resolved.insert(Arc::from(*text), code);
                }
            }
        }

        if !missing.is_empty() {
            debug!(%space, created = missing.len(), "resolved new codes");
        }
        Ok(resolved)
    }

    /// Single-string convenience over [`resolve`](Self::resolve).
    pub fn resolve_one(&self, space: CodeSpace, text: &str) -> CodeResult<Code> {
        let resolved = self.resolve(space, &[text])?;
        resolved
            .get(text)
            .copied()
            .ok_or(CodeError::BatchMismatch {
                expected: 1,
                got: 0,
            })
    }

    /// Batch reverse lookup. Unknown codes are simply absent from the result.
    pub fn lookup(&self, space: CodeSpace, codes: &[Code]) -> CodeResult<HashMap<Code, Arc<str>>> {
        let mut found = HashMap::with_capacity(codes.len());
        let mut missing = Vec::new();
        {
            let dict = self.spaces[space.index()].read();
            for &code in codes {
                match dict.text(code) {
                    Some(text) => {
                        found.insert(code, Arc::clone(text));
                    }
                    None => missing.push(code),
                }
            }
        }

        let Some(store) = &self.store else {
            return Ok(found);
        };
        if missing.is_empty() {
            return Ok(found);
        }

        missing.sort_unstable();
        missing.dedup();
        let texts = store.batch_lookup(space, &missing)?;
        if texts.len() != missing.len() {
            return Err(CodeError::BatchMismatch {
                expected: missing.len(),
                got: texts.len(),
            });
        }

        let mut dict = self.spaces[space.index()].write();
        for (code, text) in missing.into_iter().zip(texts) {
            if let Some(text) = text {
                let text: Arc<str> = Arc::from(text);
                if dict.text(code).is_none() {
                    dict.insert(Arc::clone(&text), code);
                }
                found.insert(code, text);
            }
        }
        Ok(found)
    }

    /// Text of a single code, if known.
    pub fn text(&self, space: CodeSpace, code: Code) -> CodeResult<Option<Arc<str>>> {
        Ok(self.lookup(space, &[code])?.remove(&code))
    }

    /// Fail with [`CodeError::UnknownCode`] for the first code without a
    /// backing string.
    pub fn ensure_known(&self, space: CodeSpace, codes: &[Code]) -> CodeResult<()> {
        let all_cached = {
            let dict = self.spaces[space.index()].read();
            codes.iter().all(|code| dict.text(*code).is_some())
        };
        if all_cached {
            return Ok(());
        }

        let found = self.lookup(space, codes)?;
        match codes.iter().find(|code| !found.contains_key(*code)) {
            Some(&code) => Err(CodeError::UnknownCode { space, code }),
            None => Ok(()),
        }
    }

    /// Cached code for `text` without creating one.
    #[must_use]
    pub fn code(&self, space: CodeSpace, text: &str) -> Option<Code> {
        self.spaces[space.index()].read().get(text)
    }

    /// Number of cached entries in a space.
    #[must_use]
    pub fn len(&self, space: CodeSpace) -> usize {
        self.spaces[space.index()].read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        CodeSpace::ALL.iter().all(|space| self.len(*space) == 0)
    }

    /// Snapshot of a space ordered by code.
    #[must_use]
    pub fn entries(&self, space: CodeSpace) -> Vec<CodeEntry> {
        self.spaces[space.index()].read().entries()
    }
}
