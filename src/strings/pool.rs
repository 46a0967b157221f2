//! String interning pool

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Dense id of an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct StringId(pub u32);

impl StringId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Interns strings to dense ids.
///
/// Ids are assigned in first-seen order starting at 0 and are never reused.
#[derive(Debug, Clone, Default)]
pub struct StringPool {
    strings: Vec<Box<str>>,
    ids: HashMap<Box<str>, StringId>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `s`, interning it if needed.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(id) = self.ids.get(s) {
            return *id;
        }
        let id = StringId(self.strings.len() as u32);
        self.strings.push(s.into());
        self.ids.insert(s.into(), id);
        id
    }

    /// Returns the string behind `id`.
    ///
    /// Panics on an id this pool never handed out.
    pub fn get(&self, id: StringId) -> &str {
        &self.strings[id.0 as usize]
    }

    /// Looks up an already interned string without interning it.
    pub fn get_id(&self, s: &str) -> Option<StringId> {
        self.ids.get(s).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Iterates `(id, string)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (StringId, &str)> + '_ {
        self.strings
            .iter()
            .enumerate()
            .map(|(i, s)| (StringId(i as u32), s.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let mut pool = StringPool::new();
        let a = pool.intern("a");
        let b = pool.intern("b");
        assert_eq!(pool.intern("a"), a);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_get_and_lookup() {
        let mut pool = StringPool::new();
        let id = pool.intern("hello");
        assert_eq!(pool.get(id), "hello");
        assert_eq!(pool.get_id("hello"), Some(id));
        assert_eq!(pool.get_id("missing"), None);
    }

    #[test]
    fn test_ids_are_dense() {
        let mut pool = StringPool::new();
        for (i, s) in ["x", "y", "z"].iter().enumerate() {
            assert_eq!(pool.intern(s), StringId(i as u32));
        }
        let collected: Vec<_> = pool.iter().map(|(_, s)| s).collect();
        assert_eq!(collected, vec!["x", "y", "z"]);
    }
}
