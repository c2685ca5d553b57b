//! Call-string contexts and the per-session context table.
//!
//! A [`CallString`] is an immutable persistent list of [`CallSite`]s with the depth and
//! a structural hash cached in every node, so pushing a frame is O(1) and comparing two
//! deep call strings usually stops at the cached hash.
//!
//! [`ContextTable`] interns contexts according to the configured [`ContextIdentity`]
//! and stores the frames recorded for each one.

use std::{
    collections::{hash_map::DefaultHasher, BTreeMap, HashMap},
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
    sync::Arc,
};

use crate::{
    analysis::{config::ContextIdentity, domain::AbstractValue, frame::Frame, heap::Heap},
    bytecode::MethodBody,
};

/// One entry of a call string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    /// Index of the call instruction in the caller, `None` for the analysis root
    pub call_index: Option<usize>,
    /// Class declaring the entered method
    pub owner: String,
    /// Entered method name
    pub name: String,
    /// Entered method descriptor
    pub desc: String,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.call_index {
            Some(index) => write!(f, "{index} {}.{}", self.owner, self.name),
            None => write!(f, "- {}.{}", self.owner, self.name),
        }
    }
}

#[derive(Debug)]
struct CallStringNode {
    site: CallSite,
    parent: Option<Rc<CallStringNode>>,
    depth: usize,
    hash: u64,
}

/// The chain of call sites leading to one analysis instance, innermost first.
#[derive(Debug, Clone)]
pub struct CallString {
    head: Rc<CallStringNode>,
}

impl CallString {
    /// A call string of depth one.
    #[must_use]
    pub fn root(site: CallSite) -> Self {
        Self::link(site, None)
    }

    /// This call string extended by one innermost site.
    #[must_use]
    pub fn push(&self, site: CallSite) -> Self {
        Self::link(site, Some(Rc::clone(&self.head)))
    }

    fn link(site: CallSite, parent: Option<Rc<CallStringNode>>) -> Self {
        let mut hasher = DefaultHasher::new();
        site.hash(&mut hasher);
        let (depth, parent_hash) = parent
            .as_ref()
            .map_or((1, 0), |p| (p.depth + 1, p.hash));
        parent_hash.hash(&mut hasher);
        CallString {
            head: Rc::new(CallStringNode {
                hash: hasher.finish(),
                site,
                parent,
                depth,
            }),
        }
    }

    /// Number of sites.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.head.depth
    }

    /// The innermost site.
    #[must_use]
    pub fn site(&self) -> &CallSite {
        &self.head.site
    }

    /// Sites from innermost to outermost.
    pub fn sites(&self) -> impl Iterator<Item = &CallSite> {
        let mut current = Some(&self.head);
        std::iter::from_fn(move || {
            let node = current?;
            current = node.parent.as_ref();
            Some(&node.site)
        })
    }
}

impl PartialEq for CallString {
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.head, &other.head) {
            return true;
        }
        self.head.depth == other.head.depth
            && self.head.hash == other.head.hash
            && self.sites().eq(other.sites())
    }
}

impl Eq for CallString {}

impl Hash for CallString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.head.hash);
    }
}

impl fmt::Display for CallString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}.{}", self.depth(), self.site().owner, self.site().name)
    }
}

/// Handle of a context in a [`ContextTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(usize);

impl ContextId {
    pub(crate) const fn new(index: usize) -> Self {
        ContextId(index)
    }

    /// Position in the table.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

/// One interprocedural analysis instance.
#[derive(Debug, Clone)]
pub struct Context {
    call_string: CallString,
    method: Arc<MethodBody>,
    heap: Heap,
    arguments: Vec<AbstractValue>,
    parent: Option<ContextId>,
}

impl Context {
    /// Creates a depth-one context.
    #[must_use]
    pub fn root(
        owner: impl Into<String>,
        method: Arc<MethodBody>,
        heap: Heap,
        arguments: Vec<AbstractValue>,
    ) -> Self {
        let site = CallSite {
            call_index: None,
            owner: owner.into(),
            name: method.name.clone(),
            desc: method.desc.clone(),
        };
        Context {
            call_string: CallString::root(site),
            method,
            heap,
            arguments,
            parent: None,
        }
    }

    /// Creates the context of a call made from this one at instruction `call_index`.
    /// `parent` is the handle this context is stored under.
    #[must_use]
    pub fn new_context(
        &self,
        parent: ContextId,
        owner: impl Into<String>,
        method: Arc<MethodBody>,
        call_index: usize,
        heap: Heap,
        arguments: Vec<AbstractValue>,
    ) -> Self {
        let site = CallSite {
            call_index: Some(call_index),
            owner: owner.into(),
            name: method.name.clone(),
            desc: method.desc.clone(),
        };
        Context {
            call_string: self.call_string.push(site),
            method,
            heap,
            arguments,
            parent: Some(parent),
        }
    }

    /// The call string.
    #[must_use]
    pub fn call_string(&self) -> &CallString {
        &self.call_string
    }

    /// Class declaring the analysed method.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.call_string.site().owner
    }

    /// The analysed method.
    #[must_use]
    pub fn method(&self) -> &Arc<MethodBody> {
        &self.method
    }

    /// The heap at method entry.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Argument values, receiver first.
    #[must_use]
    pub fn arguments(&self) -> &[AbstractValue] {
        &self.arguments
    }

    /// The calling context.
    #[must_use]
    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    /// Call-string depth; the root context has depth one.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.call_string.depth()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.call_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ContextKey {
    CallString(CallString),
    HeapSensitive(CallString, Heap, Vec<AbstractValue>),
}

/// Frames recorded for one analysed context, one slot per instruction. `None` marks
/// instructions the analysis never reached.
pub type Frames = Vec<Option<Frame>>;

/// Interned contexts, their recorded frames and the calls each of them analysed.
#[derive(Debug)]
pub struct ContextTable {
    identity: ContextIdentity,
    contexts: Vec<Context>,
    index: HashMap<ContextKey, ContextId>,
    frames: HashMap<ContextId, Frames>,
    analysed_calls: HashMap<ContextId, BTreeMap<usize, ContextId>>,
}

impl ContextTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(identity: ContextIdentity) -> Self {
        ContextTable {
            identity,
            contexts: Vec::new(),
            index: HashMap::new(),
            frames: HashMap::new(),
            analysed_calls: HashMap::new(),
        }
    }

    fn key(&self, context: &Context) -> ContextKey {
        match self.identity {
            ContextIdentity::CallString => ContextKey::CallString(context.call_string.clone()),
            ContextIdentity::HeapSensitive => ContextKey::HeapSensitive(
                context.call_string.clone(),
                context.heap.clone(),
                context.arguments.clone(),
            ),
        }
    }

    /// Stores a context and returns its handle.
    ///
    /// A context equal to an existing one under the table's identity replaces the stored
    /// entry and keeps its handle, so its heap and arguments are those of the latest
    /// call.
    pub fn intern(&mut self, context: Context) -> ContextId {
        let key = self.key(&context);
        if let Some(&id) = self.index.get(&key) {
            self.contexts[id.0] = context;
            return id;
        }

        let id = ContextId::new(self.contexts.len());
        self.contexts.push(context);
        self.index.insert(key, id);
        id
    }

    /// Looks up the handle of an equal context without storing it.
    #[must_use]
    pub fn find(&self, context: &Context) -> Option<ContextId> {
        self.index.get(&self.key(context)).copied()
    }

    /// Returns a context.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not created by this table.
    #[must_use]
    pub fn get(&self, id: ContextId) -> &Context {
        &self.contexts[id.0]
    }

    /// Number of distinct contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns `true` if no context was interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Iterates over all contexts.
    pub fn iter(&self) -> impl Iterator<Item = (ContextId, &Context)> {
        self.contexts
            .iter()
            .enumerate()
            .map(|(index, context)| (ContextId::new(index), context))
    }

    /// Records the frames of an analysed context, replacing earlier ones.
    pub fn set_frames(&mut self, id: ContextId, frames: Frames) {
        self.frames.insert(id, frames);
    }

    /// Frames recorded for a context.
    #[must_use]
    pub fn frames(&self, id: ContextId) -> Option<&Frames> {
        self.frames.get(&id)
    }

    /// Records that the call at `call_index` in `caller` was analysed in `callee`.
    pub fn add_analysed_call(&mut self, caller: ContextId, call_index: usize, callee: ContextId) {
        self.analysed_calls
            .entry(caller)
            .or_default()
            .insert(call_index, callee);
    }

    /// Forgets an analysed call, before the call instruction is interpreted again.
    pub fn remove_analysed_call(&mut self, caller: ContextId, call_index: usize) {
        if let Some(calls) = self.analysed_calls.get_mut(&caller) {
            calls.remove(&call_index);
        }
    }

    /// The callee context of an analysed call.
    #[must_use]
    pub fn analysed_call(&self, caller: ContextId, call_index: usize) -> Option<ContextId> {
        self.analysed_calls
            .get(&caller)
            .and_then(|calls| calls.get(&call_index))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::AccessFlags;

    fn method(name: &str) -> Arc<MethodBody> {
        Arc::new(MethodBody::declaration(name, "()V", AccessFlags::STATIC))
    }

    #[test]
    fn test_call_string_identity() {
        let root = Context::root("A", method("main"), Heap::new(), Vec::new());
        let mut table = ContextTable::new(ContextIdentity::CallString);
        let root_id = table.intern(root.clone());

        let child = root.new_context(root_id, "B", method("run"), 3, Heap::new(), Vec::new());
        let mut other_heap = Heap::new();
        other_heap.allocate(0, "B");
        let twin = root.new_context(root_id, "B", method("run"), 3, other_heap, Vec::new());
        let sibling = root.new_context(root_id, "B", method("run"), 4, Heap::new(), Vec::new());

        assert_eq!(child.depth(), 2);
        assert_eq!(child.call_string(), twin.call_string());
        assert_ne!(child.call_string(), sibling.call_string());

        let a = table.intern(child);
        let b = table.intern(twin);
        let c = table.intern(sibling);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.len(), 3);
        // Last write wins.
        assert!(table.get(a).heap().contains(0));
    }

    #[test]
    fn test_heap_sensitive_identity() {
        let root = Context::root("A", method("main"), Heap::new(), Vec::new());
        let mut table = ContextTable::new(ContextIdentity::HeapSensitive);
        let root_id = table.intern(root.clone());

        let mut other_heap = Heap::new();
        other_heap.allocate(0, "B");
        let a = table.intern(root.new_context(root_id, "B", method("run"), 3, Heap::new(), Vec::new()));
        let b = table.intern(root.new_context(root_id, "B", method("run"), 3, other_heap, Vec::new()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_analysed_calls() {
        let mut table = ContextTable::new(ContextIdentity::CallString);
        let root = table.intern(Context::root("A", method("main"), Heap::new(), Vec::new()));
        table.add_analysed_call(root, 2, root);
        assert_eq!(table.analysed_call(root, 2), Some(root));
        table.remove_analysed_call(root, 2);
        assert_eq!(table.analysed_call(root, 2), None);
    }
}
