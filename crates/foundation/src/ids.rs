use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque layer identifier.
///
/// The empty id means "unassigned"; the registry replaces it on insert.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        LayerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unassigned(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(s: &str) -> Self {
        LayerId(s.to_string())
    }
}

impl From<String> for LayerId {
    fn from(s: String) -> Self {
        LayerId(s)
    }
}

/// Hands out `layer-<n>` ids and remembers every id it has seen.
///
/// Ids are never reused for the lifetime of the allocator, including ids
/// supplied by callers and ids whose layer has since been removed.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next: u64,
    seen: HashSet<LayerId>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id` as taken. Returns `false` if it was already taken.
    pub fn claim(&mut self, id: &LayerId) -> bool {
        self.seen.insert(id.clone())
    }

    pub fn is_taken(&self, id: &LayerId) -> bool {
        self.seen.contains(id)
    }

    /// Mints a fresh id and claims it.
    pub fn allocate(&mut self) -> LayerId {
        loop {
            self.next += 1;
            let candidate = LayerId(format!("layer-{}", self.next));
            if self.seen.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}
