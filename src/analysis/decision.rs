//! The escape/inlining decision graph.
//!
//! The frames recorded by the interprocedural driver say, for every context, which
//! cells each field access and call may touch. [`DecisionGraph::build`] turns those
//! facts into an implication graph over [`DependencyNode`]s, where an edge `a -> b`
//! means "if `a` is denied, `b` must be denied too":
//!
//! - An allocation that is not stack-allocated cannot have its constructor inlined
//! - A call that is not inlined makes every allocation in it, and every nested call,
//!   impossible to transform
//! - A field access the transformed code could not perform itself (a non-public field
//!   of another class) forbids removing the call it happens in
//! - A call that is not analysed denies every cell reachable from its arguments
//!
//! Facts that hold without any propagation (escaped cells, calls with no recorded
//! analysis, allocations the oracle did not track) become roots. The final decision is
//! the closure of the roots: whatever it contains is denied, everything else allowed.
//!
//! # Examples
//!
//! ```rust
//! use fusescope::analysis::{oracle::ExhaustiveOracle, AnalysisConfig, AnalysisSession};
//! use fusescope::bytecode::{AccessFlags, ClassPool, MethodAssembler, Opcode};
//!
//! let pool = ClassPool::bootstrap()?;
//! let oracle = ExhaustiveOracle;
//! let config = AnalysisConfig { static_classes: Vec::new(), ..AnalysisConfig::default() };
//! let mut session = AnalysisSession::with_config(&pool, &oracle, config);
//!
//! let mut asm = MethodAssembler::new("make", "()Ljava/lang/Object;", AccessFlags::STATIC);
//! asm.type_insn(Opcode::New, "java/lang/Object")?
//!     .insn(Opcode::Dup)?
//!     .invoke(Opcode::Invokespecial, "java/lang/Object", "<init>", "()V")?
//!     .insn(Opcode::Areturn)?;
//! let outcome = session.analyze("demo/Main", &asm.finalize()?)?;
//!
//! // The object is returned, so it must live on the heap.
//! let site = outcome.allocation_site(outcome.root(), 0).unwrap();
//! assert!(!outcome.can_stack_allocate(site));
//! # Ok::<(), fusescope::Error>(())
//! ```

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
};

use log::{debug, trace, warn};

use crate::{
    analysis::{
        context::ContextId,
        domain::{AbstractValue, PointerElement, TypeElement},
        frame::Frame,
        heap::FieldKey,
        session::AnalysisSession,
    },
    bytecode::{
        FieldRef, Instruction, JvmType, MethodBody, MethodDescriptor, MethodRef, Opcode, OBJECT,
    },
    error::malformed_error,
    utils::graph::IndexedGraph,
    Error, Result,
};

/// A decision that can be denied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyNode {
    /// The allocation site cannot be stack-allocated
    AllocDenied(usize),
    /// The call that created the context cannot be inlined
    InlineDenied(ContextId),
    /// No allocation of a class matching the type can be stack-allocated
    TypeBanned(TypeElement),
}

impl fmt::Display for DependencyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyNode::AllocDenied(site) => write!(f, "alloc({site})"),
            DependencyNode::InlineDenied(context) => write!(f, "inline({context})"),
            DependencyNode::TypeBanned(ty) => write!(f, "ban({ty})"),
        }
    }
}

/// Static fields whose reads never block a transformation: the singletons and enum
/// constants the pipeline library reads on every path.
fn is_exempt_static(field: &FieldRef) -> bool {
    (field.owner == "java/util/ArrayList" && field.name.contains("EMPTY_ELEMENTDATA"))
        || matches!(
            field.owner.as_str(),
            "java/util/stream/StreamShape"
                | "java/util/stream/StreamOpFlag"
                | "java/util/stream/MatchOps$MatchKind"
                | "java/util/stream/Collectors"
        )
        || field.owner.starts_with("java/util/stream/FindOps$FindSink$Of")
}

/// The final allow/deny sets.
#[derive(Debug, Clone, Default)]
pub struct TransformDecisions {
    sites: BTreeSet<usize>,
    denied_allocations: BTreeSet<usize>,
    denied_inlines: BTreeSet<ContextId>,
    banned_types: Vec<TypeElement>,
}

impl TransformDecisions {
    /// Returns `true` if the allocation site may be replaced by locals.
    #[must_use]
    pub fn can_stack_allocate(&self, site: usize) -> bool {
        !self.denied_allocations.contains(&site)
    }

    /// Returns `true` if the call that created `context` may be inlined.
    #[must_use]
    pub fn can_inline(&self, context: ContextId) -> bool {
        !self.denied_inlines.contains(&context)
    }

    /// Allocation sites of the session that may be stack-allocated.
    pub fn stack_allocations(&self) -> impl Iterator<Item = usize> + '_ {
        self.sites
            .iter()
            .copied()
            .filter(|site| !self.denied_allocations.contains(site))
    }

    /// Allocation sites that must stay on the heap.
    pub fn denied_allocations(&self) -> impl Iterator<Item = usize> + '_ {
        self.denied_allocations.iter().copied()
    }

    /// Contexts whose call must not be inlined.
    pub fn denied_inlines(&self) -> impl Iterator<Item = ContextId> + '_ {
        self.denied_inlines.iter().copied()
    }

    /// Types banned from stack allocation.
    #[must_use]
    pub fn banned_types(&self) -> &[TypeElement] {
        &self.banned_types
    }
}

/// Implication graph between denied decisions.
#[derive(Debug)]
pub struct DecisionGraph {
    root: ContextId,
    graph: IndexedGraph<DependencyNode>,
    roots: Vec<DependencyNode>,
    seen_roots: HashSet<DependencyNode>,
}

impl DecisionGraph {
    /// Scans every context reachable from `root` and collects the implications and
    /// the initially denied nodes. `escaped` are the cells escaped at the exits of the
    /// analysed method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the recorded frames are inconsistent with the
    /// bytecode, or propagates hierarchy lookup failures.
    pub fn build(session: &AnalysisSession<'_>, root: ContextId, escaped: &BTreeSet<usize>) -> Result<Self> {
        let mut builder = Builder {
            session,
            owner: session.state.contexts.get(root).owner().to_string(),
            graph: DecisionGraph::empty(root),
        };

        for &site in escaped {
            builder.graph.add_root(DependencyNode::AllocDenied(site));
        }
        builder.scan(root, &mut HashSet::new())?;
        Ok(builder.graph)
    }

    fn empty(root: ContextId) -> Self {
        DecisionGraph {
            root,
            graph: IndexedGraph::new(),
            roots: Vec::new(),
            seen_roots: HashSet::new(),
        }
    }

    fn add_root(&mut self, node: DependencyNode) {
        if node == DependencyNode::InlineDenied(self.root) {
            return;
        }
        if self.seen_roots.insert(node.clone()) {
            self.roots.push(node);
        }
    }

    fn add_edge(&mut self, from: DependencyNode, to: DependencyNode) -> Result<()> {
        // The analysed method itself is never inlined anywhere.
        if from == DependencyNode::InlineDenied(self.root) || from == to {
            return Ok(());
        }
        self.graph.add_edge(from, to)?;
        Ok(())
    }

    /// `from -> to`, or `to` as a root when there is nothing to depend on.
    fn edge_opt(&mut self, from: Option<DependencyNode>, to: DependencyNode) -> Result<()> {
        match from {
            Some(from) => self.add_edge(from, to),
            None => {
                self.add_root(to);
                Ok(())
            }
        }
    }

    /// `from -> to` if there is a `to`.
    fn edge_to_opt(&mut self, from: DependencyNode, to: Option<DependencyNode>) -> Result<()> {
        match to {
            Some(to) => self.add_edge(from, to),
            None => Ok(()),
        }
    }

    /// Initially denied nodes, in the order they were found.
    #[must_use]
    pub fn roots(&self) -> &[DependencyNode] {
        &self.roots
    }

    /// The implication edges.
    #[must_use]
    pub fn graph(&self) -> &IndexedGraph<DependencyNode> {
        &self.graph
    }

    /// Every denied node, mapped to the node it was denied because of. Roots map to
    /// `None`.
    #[must_use]
    pub fn denied(&self) -> HashMap<DependencyNode, Option<DependencyNode>> {
        self.graph.closure(self.roots.iter().cloned())
    }

    /// Closes the roots under the implications and reads off the decisions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InliningPrevented`] if verification is enabled and the closure
    /// denies inlining of a core pipeline call: a library method called directly from
    /// the analysed method, or any `spliterator` method. Returns [`Error::ObjectBanned`]
    /// if the closure bans the imprecise `java/lang/Object`, whatever the configuration.
    pub fn decide(&self, session: &AnalysisSession<'_>) -> Result<TransformDecisions> {
        let closed = self.denied();
        let contexts = &session.state.contexts;

        let mut decisions = TransformDecisions {
            sites: session.state.allocation_types.keys().copied().collect(),
            ..TransformDecisions::default()
        };
        for (node, parent) in &closed {
            match parent {
                Some(parent) => trace!("Denied {node} because of {parent}"),
                None => trace!("Denied {node}"),
            }
            match node {
                DependencyNode::AllocDenied(site) => {
                    decisions.denied_allocations.insert(*site);
                }
                DependencyNode::InlineDenied(context) => {
                    decisions.denied_inlines.insert(*context);
                }
                DependencyNode::TypeBanned(ty) => {
                    if !ty.is_precise() && *ty.ty() == JvmType::object(OBJECT) {
                        return Err(Error::ObjectBanned(ty.to_string()));
                    }
                    decisions.banned_types.push(ty.clone());
                }
            }
        }

        let blocked = decisions.denied_inlines.iter().map(|&id| contexts.get(id)).find(|context| {
            (session.config.is_library_class(context.owner()) && context.depth() == 2)
                || context.method().name == "spliterator"
        });
        if let Some(context) = blocked {
            let owner = context.owner().to_string();
            let method = context.method().name.clone();
            if session.config.verify_transformable {
                return Err(Error::InliningPrevented { owner, method });
            }
            warn!("Inlining of {owner}.{method} is prevented");
        }

        Ok(decisions)
    }
}

struct Builder<'g, 's> {
    session: &'g AnalysisSession<'s>,
    /// Class declaring the analysed method.
    owner: String,
    graph: DecisionGraph,
}

impl Builder<'_, '_> {
    /// Bans stack allocation of `ty` and returns the ban node. Every allocation site of
    /// a matching class depends on it.
    fn ban(&mut self, ty: &TypeElement) -> Result<DependencyNode> {
        let node = DependencyNode::TypeBanned(ty.clone());
        debug!("Banning stack allocation of {ty}");

        let session = self.session;
        let mut matching = Vec::new();
        for (&site, class) in &session.state.allocation_types {
            let allocated = JvmType::object(class.as_str());
            let matches = if ty.is_precise() {
                allocated == *ty.ty()
            } else {
                session.hierarchy.has_ancestor(&allocated, ty.ty())?
            };
            if matches {
                matching.push(site);
            }
        }
        for site in matching {
            self.graph
                .add_edge(node.clone(), DependencyNode::AllocDenied(site))?;
        }
        Ok(node)
    }

    /// The node a pointer depends on: its cell, or a ban of its type when it may
    /// designate any tracked cell. `None` for pointers that cannot reach tracked cells.
    fn pointer_node(&mut self, value: &AbstractValue) -> Result<Option<DependencyNode>> {
        match value.pointer {
            PointerElement::Cell(site) => Ok(Some(DependencyNode::AllocDenied(site))),
            PointerElement::Top | PointerElement::ITop => self.ban(&value.ty).map(Some),
            PointerElement::Null | PointerElement::UTop => Ok(None),
        }
    }

    /// Returns `true` if the transformed code could not perform the access itself.
    fn unsafe_field_access(
        &self,
        opcode: Opcode,
        field: &FieldRef,
        pointer: Option<&AbstractValue>,
        frame: &Frame,
    ) -> Result<bool> {
        if field.owner == self.owner {
            return Ok(false);
        }
        let hierarchy = &self.session.hierarchy;
        let resolved = hierarchy.resolve_field(&field.owner, &field.name, &field.desc)?;
        if resolved.field.access.is_public() && hierarchy.class(&field.owner)?.access.is_public() {
            return Ok(false);
        }

        let Some(pointer) = pointer else {
            return Ok(true);
        };
        if !matches!(opcode, Opcode::Getfield | Opcode::Getstatic) {
            return Ok(true);
        }

        if let PointerElement::Cell(site) = pointer.pointer {
            let key = FieldKey::new(resolved.owner.as_str(), field.name.as_str());
            let constant = frame
                .heap()
                .cell(site)
                .and_then(|cell| cell.field(&key))
                .is_some_and(|value| value.constant.is_defined());
            if constant {
                return Ok(false);
            }
        }

        if field.owner == "java/util/stream/FindOps$FindOp"
            && (field.name == "sinkSupplier" || field.name == "emptyValue")
        {
            return Ok(false);
        }
        // Characteristics sets of the built-in collectors.
        if field.owner.contains("Unmodifiable") {
            if let PointerElement::Cell(site) = pointer.pointer {
                if !self.session.state.allocation_types.contains_key(&site) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Whether a call to `method` can only be transformed by inlining it, because the
    /// analysed class could not make the call itself.
    fn must_inline(&self, method: &MethodRef) -> Result<bool> {
        if method.owner == self.owner || method.owner.starts_with('[') {
            return Ok(false);
        }
        let hierarchy = &self.session.hierarchy;
        if !hierarchy.class(&method.owner)?.access.is_public() {
            return Ok(true);
        }
        let predicate = |body: &MethodBody| body.name == method.name && body.desc == method.desc;
        let found = hierarchy.find_method(&method.owner, &predicate)?;
        Ok(!found.is_some_and(|resolved| resolved.body.access.is_public()))
    }

    fn scan(&mut self, context: ContextId, visited: &mut HashSet<ContextId>) -> Result<()> {
        if !visited.insert(context) {
            return Ok(());
        }
        let session = self.session;
        let contexts = &session.state.contexts;
        let body = contexts.get(context).method();
        let Some(frames) = contexts.frames(context) else {
            return Ok(());
        };

        for (index, insn) in body.instructions.iter().enumerate() {
            let Some(frame) = frames.get(index).and_then(Option::as_ref) else {
                continue;
            };
            if frame.is_dead() {
                continue;
            }
            let next = frames.get(index + 1).and_then(Option::as_ref);

            match insn {
                Instruction::Method { opcode, method } => {
                    self.call(context, index, *opcode, method, frame, visited)?;
                }
                Instruction::Field { opcode, field } => match opcode {
                    Opcode::Getfield | Opcode::Putfield => {
                        self.instance_field(context, *opcode, field, frame)?;
                    }
                    _ => self.static_field(context, *opcode, field, frame)?,
                },
                Instruction::Type {
                    opcode: Opcode::New,
                    ..
                } => self.allocation(context, index, next)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn call(
        &mut self,
        context: ContextId,
        index: usize,
        opcode: Opcode,
        method: &MethodRef,
        frame: &Frame,
        visited: &mut HashSet<ContextId>,
    ) -> Result<()> {
        let descriptor = MethodDescriptor::parse(&method.desc)?;
        let count = descriptor.parameters.len() + usize::from(opcode != Opcode::Invokestatic);
        let stack = frame.stack();
        let arguments = stack
            .len()
            .checked_sub(count)
            .map(|start| &stack[start..])
            .ok_or_else(|| malformed_error!("Call {} at {} with a short stack", method, index))?;

        let must_inline = self.must_inline(method)?;
        let inline = DependencyNode::InlineDenied(context);

        let Some(child) = self.session.state.contexts.analysed_call(context, index) else {
            for argument in arguments.iter().filter(|a| a.ty.maybe_pointer()) {
                match argument.pointer {
                    PointerElement::Cell(site) => self.graph.add_root(DependencyNode::AllocDenied(site)),
                    PointerElement::Top => {
                        let ban = self.ban(&argument.ty)?;
                        self.graph.add_root(ban);
                    }
                    _ => {}
                }
            }
            if must_inline {
                self.graph.add_root(inline);
            }
            return Ok(());
        };

        let child_node = DependencyNode::InlineDenied(child);
        if opcode != Opcode::Invokestatic {
            let receiver = &arguments[0];
            match receiver.pointer {
                PointerElement::Cell(site) => {
                    let alloc = DependencyNode::AllocDenied(site);
                    self.graph.add_edge(child_node.clone(), alloc.clone())?;
                    if method.is_constructor() {
                        self.graph.add_edge(alloc, child_node.clone())?;
                    }
                }
                PointerElement::Top => {
                    let ban = self.ban(&receiver.ty)?;
                    self.graph.add_edge(child_node.clone(), ban)?;
                }
                _ => {}
            }
        }

        self.graph.add_edge(inline.clone(), child_node.clone())?;
        if must_inline {
            self.graph.add_edge(child_node, inline)?;
        }
        self.scan(child, visited)
    }

    fn instance_field(&mut self, context: ContextId, opcode: Opcode, field: &FieldRef, frame: &Frame) -> Result<()> {
        let depth = usize::from(opcode == Opcode::Putfield);
        let pointer = frame
            .peek(depth)
            .ok_or_else(|| malformed_error!("{:?} of {} with a short stack", opcode, field))?;

        let pointer_node = if pointer.pointer.maybe_interesting() {
            match pointer.pointer {
                PointerElement::Cell(site) => Some(DependencyNode::AllocDenied(site)),
                _ => {
                    let owner = TypeElement::imprecise(JvmType::object(field.owner.as_str()));
                    let ban = self.ban(&owner)?;
                    self.graph.add_root(ban.clone());
                    Some(ban)
                }
            }
        } else {
            None
        };

        let inline = DependencyNode::InlineDenied(context);
        self.graph.edge_to_opt(inline.clone(), pointer_node.clone())?;
        if self.unsafe_field_access(opcode, field, Some(pointer), frame)? {
            self.graph.edge_opt(pointer_node.clone(), inline)?;
        }

        if opcode == Opcode::Putfield {
            let value = frame
                .peek(0)
                .ok_or_else(|| malformed_error!("putfield of {} with an empty stack", field))?;
            if value.ty.maybe_pointer() && value.pointer.maybe_interesting() {
                if let Some(target) = self.pointer_node(value)? {
                    self.graph.edge_opt(pointer_node, target)?;
                }
            }
        }
        Ok(())
    }

    fn static_field(&mut self, context: ContextId, opcode: Opcode, field: &FieldRef, frame: &Frame) -> Result<()> {
        if is_exempt_static(field) {
            return Ok(());
        }
        let cell = self
            .session
            .state
            .static_allocations
            .get(&field.owner)
            .map(|&site| AbstractValue::cell(JvmType::object(field.owner.as_str()), site));
        if self.unsafe_field_access(opcode, field, cell.as_ref(), frame)? {
            self.graph.add_root(DependencyNode::InlineDenied(context));
        }
        Ok(())
    }

    fn allocation(&mut self, context: ContextId, index: usize, next: Option<&Frame>) -> Result<()> {
        let session = self.session;
        let call_string = session.state.contexts.get(context).call_string();
        let site = *session
            .state
            .allocations
            .get(&(call_string.clone(), index))
            .ok_or_else(|| malformed_error!("No allocation site for new at {} in {}", index, context))?;

        let alloc = DependencyNode::AllocDenied(site);
        if !next.is_some_and(|frame| frame.heap().contains(site)) {
            self.graph.add_root(alloc.clone());
        }
        self.graph.add_edge(DependencyNode::InlineDenied(context), alloc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{config::AnalysisConfig, oracle::ExhaustiveOracle},
        bytecode::{AccessFlags, ClassMetadata, ClassPool, FieldMetadata, MethodAssembler, OBJECT},
    };

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            static_classes: Vec::new(),
            ..AnalysisConfig::default()
        }
    }

    fn constructor(owner_super: &str) -> MethodBody {
        let mut init = MethodAssembler::new("<init>", "()V", AccessFlags::PUBLIC);
        init.load(Opcode::Aload, 0)
            .unwrap()
            .invoke(Opcode::Invokespecial, owner_super, "<init>", "()V")
            .unwrap()
            .insn(Opcode::Return)
            .unwrap();
        init.finalize().unwrap()
    }

    /// `demo/Cell` with a public and a private field, and `demo/Sink` whose `accept`
    /// is native.
    fn pool() -> ClassPool {
        let mut pool = ClassPool::bootstrap().unwrap();
        pool.insert(
            ClassMetadata::new("demo/Cell", Some(OBJECT))
                .with_field(FieldMetadata::new("open", "I", AccessFlags::PUBLIC))
                .with_field(FieldMetadata::new("hidden", "I", AccessFlags::PRIVATE))
                .with_method(constructor(OBJECT)),
        );
        pool.insert(
            ClassMetadata::new("demo/Sink", Some(OBJECT)).with_method(MethodBody::declaration(
                "accept",
                "(Ljava/lang/Object;)V",
                AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::NATIVE,
            )),
        );
        pool
    }

    fn allocate_cell(asm: &mut MethodAssembler) -> Result<()> {
        asm.type_insn(Opcode::New, "demo/Cell")?
            .insn(Opcode::Dup)?
            .invoke(Opcode::Invokespecial, "demo/Cell", "<init>", "()V")?
            .store(Opcode::Astore, 0)?;
        Ok(())
    }

    #[test]
    fn test_constructor_and_allocation_agree() -> Result<()> {
        let pool = pool();
        let oracle = ExhaustiveOracle;
        let mut session = AnalysisSession::with_config(&pool, &oracle, config());

        let mut asm = MethodAssembler::new("run", "()V", AccessFlags::STATIC);
        allocate_cell(&mut asm)?;
        asm.insn(Opcode::Return)?;
        let outcome = session.analyze("demo/Main", &asm.finalize()?)?;

        let site = outcome.allocation_site(outcome.root(), 0).unwrap();
        let init = outcome.contexts().analysed_call(outcome.root(), 2).unwrap();
        assert!(outcome.can_stack_allocate(site));
        assert!(outcome.can_inline(init));
        assert_eq!(outcome.decisions().stack_allocations().collect::<Vec<_>>(), vec![site]);
        Ok(())
    }

    #[test]
    fn test_unanalysed_call_denies_arguments() -> Result<()> {
        let pool = pool();
        let oracle = ExhaustiveOracle;
        let mut session = AnalysisSession::with_config(&pool, &oracle, config());
        session
            .purity_mut()
            .insert("demo/Sink", "accept", Vec::new());

        let mut asm = MethodAssembler::new("run", "()V", AccessFlags::STATIC);
        allocate_cell(&mut asm)?;
        asm.load(Opcode::Aload, 0)?
            .invoke(Opcode::Invokestatic, "demo/Sink", "accept", "(Ljava/lang/Object;)V")?
            .insn(Opcode::Return)?;
        let outcome = session.analyze("demo/Main", &asm.finalize()?)?;

        let site = outcome.allocation_site(outcome.root(), 0).unwrap();
        assert!(!outcome.can_stack_allocate(site));
        // The constructor can only be removed together with the allocation.
        let init = outcome.contexts().analysed_call(outcome.root(), 2).unwrap();
        assert!(!outcome.can_inline(init));
        Ok(())
    }

    #[test]
    fn test_field_visibility() -> Result<()> {
        let pool = pool();
        let oracle = ExhaustiveOracle;

        let mut open = MethodAssembler::new("run", "()I", AccessFlags::STATIC);
        allocate_cell(&mut open)?;
        open.load(Opcode::Aload, 0)?
            .field(Opcode::Getfield, "demo/Cell", "open", "I")?
            .insn(Opcode::Ireturn)?;
        let mut session = AnalysisSession::with_config(&pool, &oracle, config());
        let outcome = session.analyze("demo/Main", &open.finalize()?)?;
        assert_eq!(outcome.decisions().denied_allocations().count(), 0);

        // A private field read through a tracked cell is fine while its value is a
        // known constant.
        let mut hidden = MethodAssembler::new("run", "()I", AccessFlags::STATIC);
        allocate_cell(&mut hidden)?;
        hidden
            .load(Opcode::Aload, 0)?
            .field(Opcode::Getfield, "demo/Cell", "hidden", "I")?
            .insn(Opcode::Ireturn)?;
        let outcome = session.analyze("demo/Main", &hidden.finalize()?)?;
        assert_eq!(outcome.decisions().denied_allocations().count(), 0);
        Ok(())
    }

    #[test]
    fn test_untracked_allocation_is_a_root() -> Result<()> {
        let pool = pool();
        let oracle = ExhaustiveOracle;
        let mut session = AnalysisSession::with_config(&pool, &oracle, config());

        let mut asm = MethodAssembler::new("run", "()V", AccessFlags::STATIC);
        asm.type_insn(Opcode::New, "java/lang/StringBuilder")?
            .insn(Opcode::Pop)?
            .insn(Opcode::Return)?;
        let outcome = session.analyze("demo/Main", &asm.finalize()?)?;

        let site = outcome.allocation_site(outcome.root(), 0).unwrap();
        assert!(!outcome.can_stack_allocate(site));
        Ok(())
    }

    fn chain(roots: &[DependencyNode]) -> DecisionGraph {
        use DependencyNode::{AllocDenied, InlineDenied};

        let mut graph = DecisionGraph::empty(ContextId::new(0));
        graph.add_edge(AllocDenied(1), InlineDenied(ContextId::new(1))).unwrap();
        graph.add_edge(InlineDenied(ContextId::new(1)), AllocDenied(2)).unwrap();
        graph.add_edge(AllocDenied(3), AllocDenied(4)).unwrap();
        // Edges out of the root context are dropped.
        graph.add_edge(InlineDenied(ContextId::new(0)), AllocDenied(5)).unwrap();
        for root in roots {
            graph.add_root(root.clone());
        }
        graph
    }

    fn denied_keys(graph: &DecisionGraph) -> HashSet<DependencyNode> {
        graph.denied().into_keys().collect()
    }

    #[test]
    fn test_closure_follows_implications() {
        use DependencyNode::{AllocDenied, InlineDenied};

        let graph = chain(&[AllocDenied(1)]);
        let denied = graph.denied();
        assert_eq!(denied.len(), 3);
        assert_eq!(denied[&AllocDenied(1)], None);
        assert_eq!(denied[&AllocDenied(2)], Some(InlineDenied(ContextId::new(1))));
        assert!(!denied.contains_key(&AllocDenied(5)));
    }

    #[test]
    fn test_more_roots_deny_more() {
        use DependencyNode::{AllocDenied, InlineDenied};

        let small = denied_keys(&chain(&[AllocDenied(3)]));
        let large = denied_keys(&chain(&[AllocDenied(3), AllocDenied(1)]));
        assert!(small.is_subset(&large));
        assert!(large.contains(&InlineDenied(ContextId::new(1))));
    }

    #[test]
    fn test_root_order_does_not_matter() {
        use DependencyNode::AllocDenied;

        let forward = denied_keys(&chain(&[AllocDenied(1), AllocDenied(3)]));
        let backward = denied_keys(&chain(&[AllocDenied(3), AllocDenied(1)]));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_root_context_is_never_denied() {
        let graph = chain(&[DependencyNode::InlineDenied(ContextId::new(0))]);
        assert!(graph.roots().is_empty());
    }

    #[test]
    fn test_object_ban_is_an_error() -> Result<()> {
        let pool = pool();
        let oracle = ExhaustiveOracle;
        let session = AnalysisSession::with_config(&pool, &oracle, config());

        let object = TypeElement::imprecise(JvmType::object(OBJECT));
        let mut graph = DecisionGraph::empty(ContextId::new(0));
        graph.add_edge(DependencyNode::AllocDenied(1), DependencyNode::TypeBanned(object))?;
        assert!(graph.decide(&session).is_ok());

        graph.add_root(DependencyNode::AllocDenied(1));
        assert!(matches!(graph.decide(&session), Err(Error::ObjectBanned(_))));

        // A precise Object is just one class.
        let mut precise = DecisionGraph::empty(ContextId::new(0));
        precise.add_root(DependencyNode::TypeBanned(TypeElement::precise(JvmType::object(OBJECT))));
        assert_eq!(precise.decide(&session)?.banned_types().len(), 1);
        Ok(())
    }

    #[test]
    fn test_display() {
        assert_eq!(DependencyNode::AllocDenied(3).to_string(), "alloc(3)");
    }
}
