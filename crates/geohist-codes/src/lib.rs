//! Code tables for geohist.
//!
//! Every tag key, tag value and relation member role is stored in blocks as
//! a small integer code. The mapping is append-only and stable for the
//! lifetime of a database: a code is assigned on first occurrence and never
//! reused, so blocks written long ago keep decoding after the string they
//! reference has disappeared from current data.
//!
//! ```
//! use geohist_codes::{CodeSpace, CodeTable};
//!
//! let table = CodeTable::new();
//! let codes = table.resolve(CodeSpace::Key, &["highway", "building"]).unwrap();
//! let highway = codes["highway"];
//!
//! let names = table.lookup(CodeSpace::Key, &[highway]).unwrap();
//! assert_eq!(&*names[&highway], "highway");
//! ```

mod error;
mod store;
mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use error::{CodeError, CodeResult};
pub use store::{CodeStore, MemoryCodeStore};
pub use table::CodeTable;

/// An interned string identifier within one [`CodeSpace`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Code(u32);

impl Code {
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Independent numbering domains. A key and a value with the same text
/// receive unrelated codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CodeSpace {
    Key = 0,
    Value = 1,
    Role = 2,
}

impl CodeSpace {
    pub const ALL: [CodeSpace; 3] = [CodeSpace::Key, CodeSpace::Value, CodeSpace::Role];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CodeSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Key => "key",
            Self::Value => "value",
            Self::Role => "role",
        })
    }
}

/// A persisted `(string, code)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeEntry {
    pub text: String,
    pub code: Code,
}
