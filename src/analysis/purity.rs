//! Side-effect summaries for calls the interpreter cannot analyse.

use std::collections::HashMap;

use crate::analysis::heap::FieldKey;

/// Fields each known method may modify, keyed `owner.name`.
///
/// A call summarised conservatively with no entry here must not be able to reach any
/// tracked cell; with an entry, only the listed fields of reachable cells are widened.
#[derive(Debug, Clone)]
pub struct PurityTable {
    entries: HashMap<String, Vec<FieldKey>>,
}

impl PurityTable {
    /// An empty table.
    #[must_use]
    pub fn empty() -> Self {
        PurityTable {
            entries: HashMap::new(),
        }
    }

    /// Registers the fields a method modifies. An empty list declares the method pure.
    pub fn insert(&mut self, owner: &str, name: &str, modifies: Vec<FieldKey>) -> &mut Self {
        self.entries.insert(format!("{owner}.{name}"), modifies);
        self
    }

    /// Fields modified by `owner.name`, if the method is known.
    #[must_use]
    pub fn get(&self, owner: &str, name: &str) -> Option<&[FieldKey]> {
        self.entries
            .get(&format!("{owner}.{name}"))
            .map(Vec::as_slice)
    }

    /// Number of known methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no method is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PurityTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table
            .insert("java/lang/Object", "getClass", Vec::new())
            .insert("java/lang/Class", "getName", Vec::new())
            .insert(
                "java/lang/Class",
                "initClassName",
                vec![FieldKey::new("java/lang/Class", "name")],
            )
            .insert("java/lang/Class", "getSuperclass", Vec::new())
            .insert("java/lang/System", "identityHashCode", Vec::new())
            .insert("sun/misc/JavaLangAccess", "getEnumConstantsShared", Vec::new())
            .insert("jdk/internal/access/JavaLangAccess", "getEnumConstantsShared", Vec::new())
            .insert("jdk/internal/access/JavaLangAccess", "fastUUID", Vec::new())
            .insert("jdk/internal/misc/JavaLangAccess", "fastUUID", Vec::new());
        table
    }
}
