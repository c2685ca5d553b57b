//! Abstract heap and escape model.
//!
//! Cells are addressed by allocation-site index, never by reference, so cyclic object
//! graphs are plain data. Reachability is an explicit breadth-first walk over field
//! values.
//!
//! The escaped set is a one-way ratchet: nothing in this module ever removes an index
//! from it, including [`Heap::merge`] and [`Heap::retain`].

use std::{
    collections::{btree_map::Entry, BTreeMap, BTreeSet, VecDeque},
    fmt,
};

use crate::{
    analysis::domain::{AbstractValue, Lattice, PointerElement},
    bytecode::{ClassHierarchy, JvmType},
    Result,
};

/// Identity of a field: the class that declares it plus its name.
///
/// Field names alone are not unique because subclasses may shadow them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    /// Declaring class
    pub owner: String,
    /// Field name
    pub name: String,
}

impl FieldKey {
    /// Creates a key.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        FieldKey {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// One abstract heap cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbstractObject {
    class: String,
    is_static: bool,
    fields: BTreeMap<FieldKey, AbstractValue>,
}

impl AbstractObject {
    /// Creates an instance cell with no fields.
    pub fn new(class: impl Into<String>) -> Self {
        AbstractObject {
            class: class.into(),
            is_static: false,
            fields: BTreeMap::new(),
        }
    }

    /// Creates the cell holding the static fields of `class`.
    pub fn new_static(class: impl Into<String>) -> Self {
        AbstractObject {
            is_static: true,
            ..Self::new(class)
        }
    }

    /// Class of the allocated object.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Returns `true` for the static cell of a class.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Returns `true` if the field has a value in this cell.
    #[must_use]
    pub fn has_field(&self, key: &FieldKey) -> bool {
        self.fields.contains_key(key)
    }

    /// Value of a field.
    #[must_use]
    pub fn field(&self, key: &FieldKey) -> Option<&AbstractValue> {
        self.fields.get(key)
    }

    /// Overwrites a field.
    pub fn set_field(&mut self, key: FieldKey, value: AbstractValue) {
        self.fields.insert(key, value);
    }

    /// Merges `value` into an existing field. Missing fields are left alone.
    ///
    /// Returns `true` if the field changed.
    pub fn merge_field(&mut self, key: &FieldKey, value: &AbstractValue) -> bool {
        match self.fields.get_mut(key) {
            Some(old) => {
                let merged = old.merge(value);
                let changed = merged != *old;
                *old = merged;
                changed
            }
            None => false,
        }
    }

    /// Iterates over the fields.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldKey, &AbstractValue)> {
        self.fields.iter()
    }

    /// Mutable access to every field value.
    pub fn fields_mut(&mut self) -> impl Iterator<Item = (&FieldKey, &mut AbstractValue)> {
        self.fields.iter_mut()
    }

    /// Merges another cell into this one over the union of both field sets.
    fn merge(&mut self, other: &AbstractObject) -> bool {
        let mut changed = false;
        for (key, value) in &other.fields {
            match self.fields.get_mut(key) {
                Some(old) => {
                    let merged = old.merge(value);
                    if merged != *old {
                        *old = merged;
                        changed = true;
                    }
                }
                None => {
                    self.fields.insert(key.clone(), value.clone());
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Cells indexed by allocation site plus the escaped set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Heap {
    cells: BTreeMap<usize, AbstractObject>,
    escaped: BTreeSet<usize>,
}

impl Heap {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates (or re-allocates) a fresh empty cell.
    pub fn allocate(&mut self, index: usize, class: impl Into<String>) -> &mut AbstractObject {
        self.insert(index, AbstractObject::new(class))
    }

    /// Stores a prepared cell at `index`.
    pub fn insert(&mut self, index: usize, object: AbstractObject) -> &mut AbstractObject {
        match self.cells.entry(index) {
            Entry::Occupied(mut entry) => {
                entry.insert(object);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(object),
        }
    }

    /// Returns `true` if the cell exists.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.cells.contains_key(&index)
    }

    /// Returns a cell.
    #[must_use]
    pub fn cell(&self, index: usize) -> Option<&AbstractObject> {
        self.cells.get(&index)
    }

    /// Returns a cell for modification.
    pub fn cell_mut(&mut self, index: usize) -> Option<&mut AbstractObject> {
        self.cells.get_mut(&index)
    }

    /// Number of live cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if no cell is allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterates over `(index, cell)` pairs in index order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, &AbstractObject)> {
        self.cells.iter().map(|(index, object)| (*index, object))
    }

    /// Cell indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells.keys().copied()
    }

    /// Reads a field, or `default` if the cell or the field is missing.
    #[must_use]
    pub fn get_field(&self, index: usize, key: &FieldKey, default: AbstractValue) -> AbstractValue {
        self.cells
            .get(&index)
            .and_then(|object| object.field(key))
            .cloned()
            .unwrap_or(default)
    }

    /// Writes a field of an existing cell.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidPointer`] if the cell does not exist.
    pub fn set_field(&mut self, index: usize, key: FieldKey, value: AbstractValue) -> Result<()> {
        match self.cells.get_mut(&index) {
            Some(object) => {
                object.set_field(key, value);
                Ok(())
            }
            None => Err(crate::Error::InvalidPointer(format!(
                "Write of {key} to missing cell {index}"
            ))),
        }
    }

    /// The escaped cell indices.
    #[must_use]
    pub fn escaped(&self) -> &BTreeSet<usize> {
        &self.escaped
    }

    /// Returns `true` if the cell has escaped.
    #[must_use]
    pub fn is_escaped(&self, index: usize) -> bool {
        self.escaped.contains(&index)
    }

    /// Marks cells as escaped. Returns `true` if the set grew.
    pub fn add_escape(&mut self, indices: impl IntoIterator<Item = usize>) -> bool {
        let before = self.escaped.len();
        self.escaped.extend(indices);
        self.escaped.len() != before
    }

    /// Replaces `target` with a deep copy of this heap.
    pub fn copy_to(&self, target: &mut Heap) {
        target.cells.clone_from(&self.cells);
        target.escaped.clone_from(&self.escaped);
    }

    /// Merges `other` into this heap at a control-flow join.
    ///
    /// Cells present in both heaps are merged field by field. A cell present in only
    /// one heap is kept as it is: pointers to it from the other edge have already
    /// become imprecise in the merged frame, and imprecise accesses are handled where
    /// they happen. Merging never escapes a cell. The escaped sets are united.
    ///
    /// Returns `true` if this heap changed.
    pub fn merge(&mut self, other: &Heap) -> bool {
        let mut changed = false;
        for (index, incoming) in &other.cells {
            match self.cells.get_mut(index) {
                Some(object) => changed |= object.merge(incoming),
                None => {
                    self.cells.insert(*index, incoming.clone());
                    changed = true;
                }
            }
        }
        changed |= self.add_escape(other.escaped.iter().copied());
        changed
    }

    /// Drops every cell not in `keep`. Returns the number of dropped cells.
    pub fn retain(&mut self, keep: &BTreeSet<usize>) -> usize {
        let before = self.cells.len();
        self.cells.retain(|index, _| keep.contains(index));
        before - self.cells.len()
    }

    /// Cells a single value may point to directly.
    ///
    /// `null` and untracked pointers reach nothing. A concrete cell reaches itself. Any
    /// other pointer reaches every live cell whose class fits the value's type: exactly
    /// the class for a precise type, any subclass otherwise, anything for the unknown
    /// type.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ClassNotFound`] if a cell's class is unknown to the hierarchy.
    pub fn reachable_from_value(
        &self,
        value: &AbstractValue,
        hierarchy: &ClassHierarchy<'_>,
    ) -> Result<BTreeSet<usize>> {
        match value.pointer {
            PointerElement::Null | PointerElement::UTop => Ok(BTreeSet::new()),
            PointerElement::Cell(index) => Ok(BTreeSet::from([index])),
            PointerElement::ITop | PointerElement::Top => {
                let mut result = BTreeSet::new();
                for (index, object) in &self.cells {
                    let class = JvmType::object(object.class.as_str());
                    let matches = if value.ty.is_unknown() {
                        true
                    } else if value.ty.is_precise() {
                        class == *value.ty.ty()
                    } else {
                        hierarchy.has_ancestor(&class, value.ty.ty())?
                    };
                    if matches {
                        result.insert(*index);
                    }
                }
                Ok(result)
            }
        }
    }

    /// Every cell transitively reachable from `roots` through field values.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ClassNotFound`] if a cell's class is unknown to the hierarchy.
    pub fn reachable_subgraph<'v>(
        &self,
        roots: impl IntoIterator<Item = &'v AbstractValue>,
        hierarchy: &ClassHierarchy<'_>,
    ) -> Result<BTreeSet<usize>> {
        let mut reachable = BTreeSet::new();
        for root in roots {
            if root.ty.maybe_pointer() {
                reachable.extend(self.reachable_from_value(root, hierarchy)?);
            }
        }

        let mut queue: VecDeque<usize> = reachable.iter().copied().collect();
        while let Some(index) = queue.pop_front() {
            let Some(object) = self.cells.get(&index) else {
                continue;
            };
            for (_, value) in object.fields() {
                if !value.ty.maybe_pointer() {
                    continue;
                }
                for next in self.reachable_from_value(value, hierarchy)? {
                    if reachable.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }

        Ok(reachable)
    }
}

impl fmt::Display for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, object) in &self.cells {
            let marker = if self.escaped.contains(index) { "*" } else { "" };
            write!(f, "[{index}]{marker} {} {{", object.class)?;
            for (i, (key, value)) in object.fields.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {value}", key.name)?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}
