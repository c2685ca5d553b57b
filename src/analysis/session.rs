//! The interprocedural driver.
//!
//! An [`AnalysisSession`] owns everything one top-level analysis needs: the class
//! hierarchy, the oracle, the purity table, the model registry and the per-session
//! state (context table, allocation sites, static cells). [`AnalysisSession::analyze`]
//! resets that state, builds the initial static heap, analyses the method in a root
//! context and every call it can resolve in child contexts, and finally runs the
//! decision graph over the recorded frames.
//!
//! # Architecture
//!
//! ```text
//! analyze(owner, body)
//!   ├─ static_heap()             run <clinit> of the configured classes
//!   ├─ analyze_recursively(root)
//!   │    └─ MethodAnalyzer + HeapInterpreter
//!   │         └─ call -> analyze_recursively(child) ...
//!   ├─ exit escapes              heap escapes at return/athrow + returned values
//!   └─ DecisionGraph             allow/deny sets
//! ```
//!
//! Nothing survives from one call of `analyze` to the next except the hierarchy's
//! ancestor cache, which only depends on the class provider.
//!
//! # Examples
//!
//! ```rust
//! use fusescope::analysis::{oracle::ExhaustiveOracle, AnalysisConfig, AnalysisSession};
//! use fusescope::bytecode::{AccessFlags, ClassPool, MethodAssembler, Opcode};
//!
//! let pool = ClassPool::bootstrap()?;
//! let oracle = ExhaustiveOracle;
//! let config = AnalysisConfig {
//!     static_classes: Vec::new(),
//!     ..AnalysisConfig::default()
//! };
//! let mut session = AnalysisSession::with_config(&pool, &oracle, config);
//!
//! let mut asm = MethodAssembler::new("answer", "()I", AccessFlags::STATIC);
//! asm.int(Opcode::Bipush, 42)?.insn(Opcode::Ireturn)?;
//! let body = asm.finalize()?;
//!
//! let outcome = session.analyze("demo/Main", &body)?;
//! assert_eq!(outcome.contexts().len(), 1);
//! assert!(outcome.escaped().is_empty());
//! # Ok::<(), fusescope::Error>(())
//! ```

use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use log::{debug, info};

use crate::{
    analysis::{
        analyzer::MethodAnalyzer,
        config::{AnalysisConfig, ContextIdentity},
        context::{CallString, Context, ContextId, ContextTable, Frames},
        decision::{DecisionGraph, TransformDecisions},
        domain::{AbstractValue, Number},
        frame::Frame,
        heap::{AbstractObject, FieldKey, Heap},
        interpreter::{default_value, HeapInterpreter},
        models::ModelRegistry,
        oracle::{ExhaustiveOracle, Oracle},
        purity::PurityTable,
    },
    bytecode::{preprocess, ClassHierarchy, ClassProvider, Constant, JvmType, MethodBody, Opcode},
    error::malformed_error,
    Error, Result,
};

/// Static initializers run under this oracle whatever the session uses.
static EXHAUSTIVE: ExhaustiveOracle = ExhaustiveOracle;

/// Counters collected during one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Contexts analysed, counting re-analyses of the same context
    pub contexts_analysed: usize,
    /// Instructions interpreted across all contexts
    pub instructions_interpreted: usize,
    /// Heap cells dropped by abstract garbage collection
    pub cells_reclaimed: usize,
}

/// State scoped to one call of [`AnalysisSession::analyze`].
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) contexts: ContextTable,
    /// Allocation site of each `new` instruction, keyed by call string and index.
    pub(crate) allocations: HashMap<(CallString, usize), usize>,
    /// Class allocated at each site.
    pub(crate) allocation_types: BTreeMap<usize, String>,
    /// Cell holding the static fields of each class in the static heap.
    pub(crate) static_allocations: BTreeMap<String, usize>,
    next_allocation: usize,
    pub(crate) stats: SessionStats,
}

impl SessionState {
    fn new(identity: ContextIdentity) -> Self {
        SessionState {
            contexts: ContextTable::new(identity),
            allocations: HashMap::new(),
            allocation_types: BTreeMap::new(),
            static_allocations: BTreeMap::new(),
            next_allocation: 0,
            stats: SessionStats::default(),
        }
    }

    /// Returns the allocation site of instruction `index` under `call_string`,
    /// numbering it on first use.
    pub(crate) fn allocation_site(&mut self, call_string: &CallString, index: usize, class: &str) -> usize {
        let key = (call_string.clone(), index);
        if let Some(&site) = self.allocations.get(&key) {
            return site;
        }
        let site = self.next_allocation;
        self.next_allocation += 1;
        self.allocations.insert(key, site);
        self.allocation_types.insert(site, class.to_string());
        site
    }

    fn static_site(&mut self, class: &str) -> usize {
        let site = self.next_allocation;
        self.next_allocation += 1;
        self.static_allocations.insert(class.to_string(), site);
        site
    }
}

/// The abstract value of a `ConstantValue` attribute.
fn constant_value(constant: &Constant) -> AbstractValue {
    match constant {
        Constant::Int(v) => AbstractValue::constant(Number::Int(*v)),
        Constant::Long(v) => AbstractValue::constant(Number::Long(*v)),
        Constant::Float(v) => AbstractValue::constant(Number::Float(*v)),
        Constant::Double(v) => AbstractValue::constant(Number::Double(*v)),
        Constant::String(_) | Constant::Class(_) => AbstractValue::untracked(constant.value_type(), true),
    }
}

/// The frame a caller continues with: the merge of the heaps at every live return,
/// plus the returned value for non-`void` methods. `None` if the method never returns.
fn return_frame(body: &MethodBody, frames: &Frames) -> Result<Option<Frame>> {
    let mut result: Option<Frame> = None;
    for index in body.return_indices() {
        let Some(frame) = frames.get(index).and_then(Option::as_ref) else {
            continue;
        };
        if frame.is_dead() {
            continue;
        }

        let mut exit = Frame::new(0, frame.heap().clone());
        if body.instructions[index].opcode() != Opcode::Return {
            let value = frame
                .peek(0)
                .ok_or_else(|| malformed_error!("Return at {} with an empty stack", index))?;
            exit.push(value.clone());
        }

        match &mut result {
            Some(merged) => {
                merged.merge(&exit)?;
            }
            None => result = Some(exit),
        }
    }
    Ok(result)
}

/// Results of one analysed method.
#[derive(Debug)]
pub struct AnalysisOutcome {
    root: ContextId,
    contexts: ContextTable,
    allocations: HashMap<(CallString, usize), usize>,
    allocation_types: BTreeMap<usize, String>,
    static_allocations: BTreeMap<String, usize>,
    escaped: BTreeSet<usize>,
    decisions: TransformDecisions,
    stats: SessionStats,
}

impl AnalysisOutcome {
    /// The context of the analysed method itself.
    #[must_use]
    pub fn root(&self) -> ContextId {
        self.root
    }

    /// Every context analysed during the session.
    #[must_use]
    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    /// Frames recorded for `context`.
    #[must_use]
    pub fn frames(&self, context: ContextId) -> Option<&Frames> {
        self.contexts.frames(context)
    }

    /// Frames of the analysed method.
    #[must_use]
    pub fn root_frames(&self) -> Option<&Frames> {
        self.contexts.frames(self.root)
    }

    /// The allocation site of the `new` at `index` in `context`, if it was reached.
    #[must_use]
    pub fn allocation_site(&self, context: ContextId, index: usize) -> Option<usize> {
        let call_string = self.contexts.get(context).call_string().clone();
        self.allocations.get(&(call_string, index)).copied()
    }

    /// Class allocated at each site.
    #[must_use]
    pub fn allocation_types(&self) -> &BTreeMap<usize, String> {
        &self.allocation_types
    }

    /// Cell holding the static fields of each class in the static heap.
    #[must_use]
    pub fn static_allocations(&self) -> &BTreeMap<String, usize> {
        &self.static_allocations
    }

    /// Cells escaped at some exit of the analysed method, static cells included.
    #[must_use]
    pub fn escaped(&self) -> &BTreeSet<usize> {
        &self.escaped
    }

    /// The allow/deny decisions.
    #[must_use]
    pub fn decisions(&self) -> &TransformDecisions {
        &self.decisions
    }

    /// Shorthand for [`TransformDecisions::can_stack_allocate`].
    #[must_use]
    pub fn can_stack_allocate(&self, site: usize) -> bool {
        self.decisions.can_stack_allocate(site)
    }

    /// Shorthand for [`TransformDecisions::can_inline`].
    #[must_use]
    pub fn can_inline(&self, context: ContextId) -> bool {
        self.decisions.can_inline(context)
    }

    /// Session counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}

/// Analyses methods one at a time against a class provider and an oracle.
pub struct AnalysisSession<'a> {
    pub(crate) hierarchy: ClassHierarchy<'a>,
    pub(crate) oracle: &'a dyn Oracle,
    pub(crate) config: AnalysisConfig,
    pub(crate) purity: PurityTable,
    pub(crate) models: ModelRegistry,
    pub(crate) state: SessionState,
}

impl<'a> AnalysisSession<'a> {
    /// Creates a session with the default configuration, purity table and models.
    pub fn new(provider: &'a dyn ClassProvider, oracle: &'a dyn Oracle) -> Self {
        Self::with_config(provider, oracle, AnalysisConfig::default())
    }

    /// Creates a session with an explicit configuration.
    pub fn with_config(
        provider: &'a dyn ClassProvider,
        oracle: &'a dyn Oracle,
        config: AnalysisConfig,
    ) -> Self {
        let state = SessionState::new(config.context_identity);
        AnalysisSession {
            hierarchy: ClassHierarchy::new(provider),
            oracle,
            config,
            purity: PurityTable::default(),
            models: ModelRegistry::default(),
            state,
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The purity table used to summarise calls that are not analysed.
    pub fn purity_mut(&mut self) -> &mut PurityTable {
        &mut self.purity
    }

    /// The model registry.
    pub fn models_mut(&mut self) -> &mut ModelRegistry {
        &mut self.models
    }

    /// The class hierarchy.
    #[must_use]
    pub fn hierarchy(&self) -> &ClassHierarchy<'a> {
        &self.hierarchy
    }

    /// Analyses `method`, declared by `owner`, and decides which of its allocations
    /// can be stack-allocated and which of its calls can be inlined.
    ///
    /// Arguments are unknown: the receiver is an untracked pointer of type `owner`,
    /// every parameter an untracked value of its declared type.
    ///
    /// # Errors
    ///
    /// Any error aborts the session and leaves no usable result:
    /// - [`Error::RecursionLimit`] if call strings grow past the configured depth
    /// - [`Error::PrecisionLoss`] if a call that may reach tracked cells or return a
    ///   pipeline stage cannot be resolved
    /// - [`Error::TrackedEscape`] if escapes are rejected and cells escape the method
    /// - [`Error::InliningPrevented`] if a core pipeline call is denied for inlining
    /// - [`Error::ObjectBanned`] if the decisions would deny every allocation
    /// - [`Error::Malformed`], [`Error::InvalidPointer`] or [`Error::Unsupported`] for
    ///   bytecode the interpreter cannot model
    pub fn analyze(&mut self, owner: &str, method: &MethodBody) -> Result<AnalysisOutcome> {
        self.state = SessionState::new(self.config.context_identity);
        self.models.clear_cache();
        info!("Analysing {owner}.{}{}", method.name, method.desc);

        let body = if self.config.preprocess {
            match preprocess(method) {
                Cow::Borrowed(body) => Arc::new(body.clone()),
                Cow::Owned(body) => Arc::new(body),
            }
        } else {
            Arc::new(method.clone())
        };

        let heap = self.static_heap()?;
        let initial_escapes = heap.escaped().clone();

        let arguments = body
            .argument_types(owner)?
            .into_iter()
            .map(|ty| AbstractValue::untracked(ty, false))
            .collect();
        let (root, _) = self.analyze_recursively(Context::root(owner, body, heap, arguments))?;

        let escaped = self.exit_escapes(root)?;
        let new_escapes: Vec<usize> = escaped.difference(&initial_escapes).copied().collect();
        if !new_escapes.is_empty() {
            if self.config.reject_escapes {
                return Err(Error::TrackedEscape(new_escapes));
            }
            debug!("Cells {new_escapes:?} escape {owner}.{}", method.name);
        }

        let decisions = DecisionGraph::build(self, root, &escaped)?.decide(self)?;

        let state = std::mem::replace(&mut self.state, SessionState::new(self.config.context_identity));
        info!(
            "Analysed {} contexts, {} instructions, reclaimed {} cells",
            state.stats.contexts_analysed,
            state.stats.instructions_interpreted,
            state.stats.cells_reclaimed
        );
        Ok(AnalysisOutcome {
            root,
            contexts: state.contexts,
            allocations: state.allocations,
            allocation_types: state.allocation_types,
            static_allocations: state.static_allocations,
            escaped,
            decisions,
            stats: state.stats,
        })
    }

    /// Analyses `context` and every call it resolves, recording the frames in the
    /// context table. Returns the handle the context was stored under and the frame
    /// a caller continues with, `None` if the method never returns normally.
    pub(crate) fn analyze_recursively(&mut self, context: Context) -> Result<(ContextId, Option<Frame>)> {
        if context.depth() > self.config.max_depth {
            return Err(Error::RecursionLimit(self.config.max_depth));
        }

        let id = self.state.contexts.intern(context);
        let (body, entry) = {
            let context = self.state.contexts.get(id);
            debug!("Analysing {context} as {id}");
            let body = Arc::clone(context.method());
            let entry = Frame::entry(&body, context.arguments(), context.heap().clone())?;
            (body, entry)
        };

        let mut analyzer = MethodAnalyzer::new(&body)?;
        {
            let mut interp = HeapInterpreter::new(self, id);
            analyzer.analyze(entry, &mut interp)?;
        }
        self.state.stats.contexts_analysed += 1;
        self.state.stats.instructions_interpreted += analyzer.iterations();

        let frames = analyzer.into_frames();
        let returned = return_frame(&body, &frames)?;
        self.state.contexts.set_frames(id, frames);
        Ok((id, returned))
    }

    /// Builds the heap every analysis starts from: one static cell per configured
    /// class, populated by running its static initializer.
    ///
    /// Every cell in the result is escaped, and non-final static fields are widened to
    /// unknown since any code may have written them since initialization.
    fn static_heap(&mut self) -> Result<Heap> {
        let mut heap = Heap::new();
        let first = self.state.next_allocation;

        let mut initializers = Vec::new();
        for class in self.config.static_classes.clone() {
            let metadata = match self.hierarchy.class(&class) {
                Ok(metadata) => metadata,
                Err(Error::ClassNotFound(_)) => {
                    debug!("Skipping static class {class}: not provided");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let site = self.state.static_site(&class);
            let cell = heap.insert(site, AbstractObject::new_static(class.as_str()));
            for field in metadata.fields.iter().filter(|f| f.is_static()) {
                let value = match &field.constant {
                    Some(constant) => constant_value(constant),
                    None => default_value(&field.field_type()),
                };
                cell.set_field(FieldKey::new(class.as_str(), field.name.as_str()), value);
            }

            if let Some(clinit) = metadata.method("<clinit>", "()V").filter(|m| m.has_code()) {
                initializers.push((class, Arc::clone(clinit)));
            }
        }

        for (class, clinit) in initializers {
            let exhaustive: &'a dyn Oracle = &EXHAUSTIVE;
            let previous = std::mem::replace(&mut self.oracle, exhaustive);
            let result = self.run_initializer(&class, clinit, &mut heap);
            self.oracle = previous;
            result?;
        }

        heap.add_escape(first..self.state.next_allocation);
        self.widen_static_fields(&mut heap)?;
        Ok(heap)
    }

    fn run_initializer(&mut self, class: &str, clinit: Arc<MethodBody>, heap: &mut Heap) -> Result<()> {
        debug!("Running static initializer of {class}");
        let context = Context::root(class, clinit, heap.clone(), Vec::new());
        match self.analyze_recursively(context)? {
            (_, Some(frame)) => frame.heap().copy_to(heap),
            (_, None) => debug!("Static initializer of {class} never returns"),
        }
        Ok(())
    }

    fn widen_static_fields(&self, heap: &mut Heap) -> Result<()> {
        let cells: Vec<(usize, String, bool)> = heap
            .cells()
            .map(|(site, cell)| (site, cell.class().to_string(), cell.is_static()))
            .collect();

        for (site, class, is_static) in cells {
            let fields: Vec<(String, String, JvmType)> = if is_static {
                self.hierarchy
                    .class(&class)?
                    .fields
                    .iter()
                    .filter(|f| f.is_static() && !f.is_final())
                    .map(|f| (class.clone(), f.name.clone(), f.field_type()))
                    .collect()
            } else {
                self.hierarchy
                    .fields(&class, false)?
                    .into_iter()
                    .filter(|r| !r.field.is_final())
                    .map(|r| {
                        let ty = r.field.field_type();
                        (r.owner, r.field.name, ty)
                    })
                    .collect()
            };

            for (owner, name, ty) in fields {
                heap.set_field(site, FieldKey::new(owner, name), AbstractValue::unknown(ty))?;
            }
        }
        Ok(())
    }

    /// Cells escaped at some live exit of the root context: the heap's escaped set at
    /// every `return` and `athrow`, plus everything reachable from a returned or thrown
    /// value.
    fn exit_escapes(&self, root: ContextId) -> Result<BTreeSet<usize>> {
        let body = Arc::clone(self.state.contexts.get(root).method());
        let Some(frames) = self.state.contexts.frames(root) else {
            return Ok(BTreeSet::new());
        };

        let mut escaped = BTreeSet::new();
        for (index, insn) in body.instructions.iter().enumerate() {
            let opcode = insn.opcode();
            if !opcode.is_return() && opcode != Opcode::Athrow {
                continue;
            }
            let Some(frame) = frames.get(index).and_then(Option::as_ref) else {
                continue;
            };
            if frame.is_dead() {
                continue;
            }

            escaped.extend(frame.heap().escaped().iter().copied());
            if opcode != Opcode::Return {
                let value = frame
                    .peek(0)
                    .ok_or_else(|| malformed_error!("Exit at {} with an empty stack", index))?;
                escaped.extend(
                    frame
                        .heap()
                        .reachable_subgraph(std::iter::once(value), &self.hierarchy)?,
                );
            }
        }
        Ok(escaped)
    }
}

/// Analyses one method with the default configuration.
///
/// # Errors
///
/// See [`AnalysisSession::analyze`].
pub fn analyze(
    owner: &str,
    method: &MethodBody,
    provider: &dyn ClassProvider,
    oracle: &dyn Oracle,
) -> Result<AnalysisOutcome> {
    AnalysisSession::new(provider, oracle).analyze(owner, method)
}
