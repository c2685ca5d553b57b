//! Pointer, heap and call semantics.
//!
//! [`HeapInterpreter`] interprets the instructions of one [`Context`](crate::analysis::Context)
//! on top of [`TypeInterpreter`]: it allocates heap cells, follows field reads and
//! writes through precise and imprecise pointers, records escapes, and handles calls
//! by resolving the target and analysing it recursively in a child context. Calls it
//! cannot resolve are summarised with the purity table.
//!
//! After every analysed call it may run an abstract garbage collection over the
//! resulting frame, gated by [`GcPolicy`](crate::analysis::GcPolicy).

use std::{borrow::Cow, collections::BTreeSet, sync::Arc};

use log::{debug, warn};

use crate::{
    analysis::{
        context::{CallString, ContextId},
        domain::{AbstractValue, Lattice, Number, PointerElement, TypeElement},
        frame::Frame,
        heap::{FieldKey, Heap},
        interpreter::{types::return_type, TypeInterpreter, ValueInterpreter},
        oracle::OracleQuery,
        session::AnalysisSession,
    },
    bytecode::{
        preprocess, AccessFlags, FieldRef, Instruction, JvmType, MethodBody, MethodDescriptor,
        MethodRef, Opcode, ResolvedMethod, OBJECT,
    },
    error::{malformed_error, precision_loss},
    Error, Result,
};

const THROWABLE: &str = "java/lang/Throwable";

/// Classes never given a heap cell, whatever the oracle says.
const UNTRACKED_CLASSES: [&str; 2] = ["java/lang/String", "java/lang/StringBuilder"];

/// The value a fresh cell holds in a field of type `ty` before the constructor runs.
pub(crate) fn default_value(ty: &JvmType) -> AbstractValue {
    match ty {
        JvmType::Long => AbstractValue::constant(Number::Long(0)),
        JvmType::Float => AbstractValue::constant(Number::Float(0.0)),
        JvmType::Double => AbstractValue::constant(Number::Double(0.0)),
        ty if ty.is_int_like() => AbstractValue::constant(Number::Int(0)),
        ty => AbstractValue::null(ty.clone()),
    }
}

/// Result of a call nothing is known about, `None` for `void`.
fn untracked_result(ty: &JvmType) -> Option<AbstractValue> {
    (*ty != JvmType::Void).then(|| AbstractValue::untracked(ty.clone(), false))
}

/// Heap-aware interpreter for one analysis context.
///
/// The interpreter borrows the session mutably for its whole lifetime: calls it
/// analyses recursively create further interpreters over the same session.
pub struct HeapInterpreter<'s, 'a> {
    session: &'s mut AnalysisSession<'a>,
    context: ContextId,
    call_string: CallString,
    depth: usize,
    types: TypeInterpreter,
}

impl<'s, 'a> HeapInterpreter<'s, 'a> {
    /// Creates the interpreter for a context interned in the session's context table.
    pub fn new(session: &'s mut AnalysisSession<'a>, context: ContextId) -> Self {
        let (call_string, depth) = {
            let ctx = session.state.contexts.get(context);
            (ctx.call_string().clone(), ctx.depth())
        };
        HeapInterpreter {
            session,
            context,
            call_string,
            depth,
            types: TypeInterpreter,
        }
    }

    /// The context this interpreter works in.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    fn query(&self) -> OracleQuery<'_> {
        let contexts = &self.session.state.contexts;
        OracleQuery::new(&self.session.hierarchy, contexts, contexts.get(self.context))
    }

    fn field_key(&self, field: &FieldRef) -> Result<FieldKey> {
        let resolved = self
            .session
            .hierarchy
            .resolve_field(&field.owner, &field.name, &field.desc)?;
        Ok(FieldKey::new(resolved.owner, field.name.as_str()))
    }

    fn reachable(&self, heap: &Heap, values: &[AbstractValue]) -> Result<BTreeSet<usize>> {
        heap.reachable_subgraph(values, &self.session.hierarchy)
    }

    /// Marks everything reachable from `value` as escaped.
    fn escape(&self, heap: &mut Heap, value: &AbstractValue) -> Result<()> {
        let reachable = self.reachable(heap, std::slice::from_ref(value))?;
        heap.add_escape(reachable);
        Ok(())
    }

    fn should_track(&self, ty: &JvmType) -> Result<bool> {
        let Some(class) = ty.class_name() else {
            return Ok(false);
        };
        if UNTRACKED_CLASSES.contains(&class)
            || self
                .session
                .hierarchy
                .has_ancestor(ty, &JvmType::object(THROWABLE))?
        {
            return Ok(false);
        }
        let oracle = self.session.oracle;
        oracle.should_track_allocation(&self.query(), ty)
    }

    fn allocate(&mut self, class: &str, index: usize, heap: &mut Heap) -> Result<AbstractValue> {
        let ty = JvmType::object(class);
        let site = self
            .session
            .state
            .allocation_site(&self.call_string, index, class);
        if !self.should_track(&ty)? {
            return Ok(AbstractValue::untracked(ty, true));
        }

        let fields = self.session.hierarchy.fields(class, false)?;
        let object = heap.allocate(site, class);
        for resolved in fields {
            let value = default_value(&resolved.field.field_type());
            object.set_field(FieldKey::new(resolved.owner, resolved.field.name), value);
        }
        Ok(AbstractValue::cell(ty, site))
    }

    fn get_static(&self, field: &FieldRef, heap: &Heap) -> Result<AbstractValue> {
        let ty = field.field_type()?;
        match self.session.state.static_allocations.get(&field.owner) {
            Some(&site) => {
                let key = self.field_key(field)?;
                Ok(heap.get_field(site, &key, AbstractValue::unknown(ty)))
            }
            None => Ok(AbstractValue::untracked(ty, false)),
        }
    }

    fn put_static(&self, field: &FieldRef, value: AbstractValue, heap: &mut Heap) -> Result<()> {
        self.escape(heap, &value)?;
        if let Some(&site) = self.session.state.static_allocations.get(&field.owner) {
            if heap.contains(site) {
                let key = self.field_key(field)?;
                heap.set_field(site, key, value)?;
            }
        }
        Ok(())
    }

    fn get_field(&self, field: &FieldRef, object: &AbstractValue, heap: &Heap) -> Result<AbstractValue> {
        let ty = field.field_type()?;
        match object.pointer {
            PointerElement::Null => Err(Error::InvalidPointer(format!("Read of {field} through null"))),
            PointerElement::UTop => Ok(AbstractValue::untracked(ty, false)),
            PointerElement::Top => Ok(AbstractValue::unknown(ty)),
            PointerElement::ITop => {
                let key = self.field_key(field)?;
                let mut result: Option<AbstractValue> = None;
                for site in heap.reachable_from_value(object, &self.session.hierarchy)? {
                    if let Some(value) = heap.cell(site).and_then(|cell| cell.field(&key)) {
                        result = Some(match result {
                            Some(acc) => acc.merge(value),
                            None => value.clone(),
                        });
                    }
                }
                Ok(result.unwrap_or_else(|| AbstractValue::unknown(ty)))
            }
            PointerElement::Cell(site) => {
                let key = self.field_key(field)?;
                Ok(heap.get_field(site, &key, AbstractValue::unknown(ty)))
            }
        }
    }

    /// Merges `value` into `field` of every cell `object` may designate.
    fn weak_update(
        &self,
        field: &FieldRef,
        object: &AbstractValue,
        value: &AbstractValue,
        heap: &mut Heap,
    ) -> Result<()> {
        let key = self.field_key(field)?;
        for site in heap.reachable_from_value(object, &self.session.hierarchy)? {
            if let Some(cell) = heap.cell_mut(site) {
                cell.merge_field(&key, value);
            }
        }
        Ok(())
    }

    fn put_field(
        &self,
        field: &FieldRef,
        object: AbstractValue,
        value: AbstractValue,
        heap: &mut Heap,
    ) -> Result<()> {
        match object.pointer {
            PointerElement::Null => Err(Error::InvalidPointer(format!("Write of {field} through null"))),
            PointerElement::ITop => self.weak_update(field, &object, &value, heap),
            PointerElement::UTop | PointerElement::Top => {
                // The target may live outside the analysed method.
                if value.ty.maybe_pointer() && value.pointer.maybe_interesting() {
                    self.escape(heap, &value)?;
                }
                if object.pointer == PointerElement::Top {
                    self.weak_update(field, &object, &value, heap)?;
                }
                Ok(())
            }
            PointerElement::Cell(site) => {
                let key = self.field_key(field)?;
                heap.set_field(site, key, value)
            }
        }
    }

    fn check_cast(&self, class: &str, value: AbstractValue) -> Result<AbstractValue> {
        if value.is_null() {
            return Ok(value);
        }
        let target = JvmType::from_internal_name(class)?;
        if self.session.hierarchy.has_ancestor(value.ty.ty(), &target)? {
            return Ok(value);
        }
        Ok(AbstractValue::new(
            TypeElement::imprecise(target),
            value.pointer,
            value.constant,
        ))
    }

    fn instance_of(&self, class: &str, value: &AbstractValue) -> Result<AbstractValue> {
        if value.is_null() {
            return Ok(AbstractValue::constant(Number::Int(0)));
        }
        let target = JvmType::from_internal_name(class)?;
        let is_ancestor = self.session.hierarchy.has_ancestor(value.ty.ty(), &target)?;
        Ok(match (is_ancestor, value.pointer) {
            (true, PointerElement::Cell(_)) => AbstractValue::constant(Number::Int(1)),
            (false, _) if value.ty.is_precise() => AbstractValue::constant(Number::Int(0)),
            _ => AbstractValue::unknown(JvmType::Int),
        })
    }

    fn is_pipeline_type(&self, ty: &JvmType) -> Result<bool> {
        let ancestors = self.session.hierarchy.ancestors(ty)?;
        Ok(self
            .session
            .config
            .pipeline_roots
            .iter()
            .any(|root| ancestors.contains(&JvmType::object(root.as_str()))))
    }

    /// Finds the body a call runs. Imprecise receivers of virtual calls are made precise
    /// in `values` when the runtime class can be determined. Methods with a registered
    /// model run the model's body instead.
    fn resolve_call(
        &mut self,
        opcode: Opcode,
        method: &MethodRef,
        values: &mut [AbstractValue],
        heap: &Heap,
    ) -> Result<ResolvedMethod> {
        let hierarchy = &self.session.hierarchy;
        if method.owner.starts_with('[') {
            if method.name == "clone" && method.desc == "()Ljava/lang/Object;" {
                let clone = MethodBody::declaration(
                    "clone",
                    method.desc.as_str(),
                    AccessFlags::PUBLIC | AccessFlags::NATIVE,
                );
                return Ok(ResolvedMethod::new(method.owner.as_str(), Arc::new(clone)));
            }
            return Err(Error::Unsupported(format!("Array method {method}")));
        }

        let resolved = match opcode {
            Opcode::Invokevirtual | Opcode::Invokeinterface => {
                let receiver = values
                    .first()
                    .cloned()
                    .ok_or_else(|| malformed_error!("Call to {} without receiver", method))?;
                let mut from = match receiver.ty.ty() {
                    JvmType::Array(_) => OBJECT.to_string(),
                    JvmType::Object(name) => name.clone(),
                    _ => method.owner.clone(),
                };

                if !receiver.ty.is_precise() {
                    let declared_final = matches!(receiver.ty.ty(), JvmType::Object(_))
                        && hierarchy.is_final_class(&from)?;
                    if !declared_final {
                        let owner = hierarchy.class(&method.owner)?;
                        let final_method = owner
                            .method(&method.name, &method.desc)
                            .is_some_and(|m| m.is_final());
                        if owner.is_final() || final_method {
                            from = method.owner.clone();
                        } else {
                            let oracle = self.session.oracle;
                            let answer = oracle.query_type(&self.query(), method, &receiver)?;
                            match answer.as_ref().and_then(JvmType::class_name) {
                                Some(class) => from = class.to_string(),
                                None => {
                                    return Err(precision_loss!(method, "Runtime type of 'this' is unknown"))
                                }
                            }
                        }
                    }
                    values[0] = AbstractValue::new(
                        TypeElement::precise(JvmType::object(from.as_str())),
                        receiver.pointer,
                        receiver.constant.clone(),
                    );
                }

                self.session
                    .hierarchy
                    .resolve_method_for_inlining(&from, &method.name, &method.desc)?
            }
            Opcode::Invokestatic | Opcode::Invokespecial => {
                hierarchy.resolve_method_for_inlining(&method.owner, &method.name, &method.desc)?
            }
            other => return Err(Error::Unsupported(format!("Resolution of {other:?}"))),
        };

        let models = &mut self.session.models;
        if !models.has_model(&resolved.owner, &resolved.body.name) {
            return Ok(resolved);
        }
        let parameter = models.parameter(&resolved.owner, &resolved.body.name, values, heap)?;
        debug!("Modelling {}.{} with parameter {parameter}", resolved.owner, resolved.body.name);
        let body = models.model(&resolved.owner, &resolved.body, parameter)?;
        Ok(ResolvedMethod::new(resolved.owner, body))
    }

    /// Summarises a call without analysing it. Everything reachable from the arguments
    /// escapes; fields the purity table lists for the callee are widened.
    fn overapproximate(
        &self,
        owner: &str,
        method: &MethodRef,
        values: &[AbstractValue],
        ty: &JvmType,
        heap: &mut Heap,
    ) -> Result<Option<AbstractValue>> {
        let reachable = self.reachable(heap, values)?;
        heap.add_escape(reachable.iter().copied());

        match self.session.purity.get(owner, &method.name) {
            None if !reachable.is_empty() => {
                return Err(precision_loss!(method, "Overapproximation of call with reachable cells"))
            }
            None => {}
            Some(modified) => {
                for &site in &reachable {
                    let Some(cell) = heap.cell_mut(site) else {
                        continue;
                    };
                    for key in modified {
                        if let Some(current) = cell.field(key).cloned() {
                            cell.merge_field(key, &AbstractValue::unknown(current.ty.ty().clone()));
                        }
                    }
                }
            }
        }

        if *ty == JvmType::Void {
            return Ok(None);
        }
        let is_get_class = owner == OBJECT && method.name == "getClass";
        if reachable.is_empty() || is_get_class {
            Ok(untracked_result(ty))
        } else {
            Ok(Some(AbstractValue::unknown(ty.clone())))
        }
    }

    fn call(
        &mut self,
        opcode: Opcode,
        method: &MethodRef,
        index: usize,
        mut values: Vec<AbstractValue>,
        heap: &mut Heap,
    ) -> Result<Option<AbstractValue>> {
        self.session
            .state
            .contexts
            .remove_analysed_call(self.context, index);
        let ty = MethodDescriptor::parse(&method.desc)?.return_type;

        // Calls that can reach tracked cells are analysed whatever the oracle says.
        if self.reachable(heap, &values)?.is_empty() {
            let oracle = self.session.oracle;
            if !oracle.should_analyse_call(&self.query(), method)? {
                return Ok(untracked_result(&ty));
            }
        }

        let resolved = match self.resolve_call(opcode, method, &mut values, heap) {
            Ok(resolved) => resolved,
            Err(Error::PrecisionLoss { call, message }) => {
                if self.is_pipeline_type(&ty)? {
                    return Err(precision_loss!(
                        call,
                        "Unable to resolve call to pipeline method {}.{} ({})",
                        method.owner,
                        method.name,
                        message
                    ));
                }
                return self.overapproximate(&method.owner, method, &values, &ty, heap);
            }
            Err(e) => return Err(e),
        };

        if !resolved.body.has_code() {
            return self.overapproximate(&resolved.owner, method, &values, &ty, heap);
        }

        let body = if self.session.config.preprocess {
            match preprocess(&resolved.body) {
                Cow::Borrowed(_) => Arc::clone(&resolved.body),
                Cow::Owned(body) => Arc::new(body),
            }
        } else {
            Arc::clone(&resolved.body)
        };

        let child = self.session.state.contexts.get(self.context).new_context(
            self.context,
            resolved.owner.as_str(),
            body,
            index,
            heap.clone(),
            values,
        );
        let (callee, returned) = self.session.analyze_recursively(child)?;
        self.session
            .state
            .contexts
            .add_analysed_call(self.context, index, callee);

        match returned {
            Some(frame) => {
                frame.heap().copy_to(heap);
                if ty == JvmType::Void {
                    return Ok(None);
                }
                frame
                    .peek(0)
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| malformed_error!("Return frame of {} holds no value", method))
            }
            None if ty != JvmType::Void => {
                Err(malformed_error!("{} never returns a value", method))
            }
            None => {
                warn!("{method} never returns normally");
                Ok(None)
            }
        }
    }

    /// Drops cells no longer reachable from the frame or the static cells.
    fn collect_garbage(&mut self, frame: &mut Frame) -> Result<()> {
        let mut roots: Vec<AbstractValue> = self
            .session
            .state
            .static_allocations
            .iter()
            .map(|(class, &site)| AbstractValue::cell(JvmType::object(class.as_str()), site))
            .collect();
        roots.extend(frame.stack().iter().cloned());
        roots.extend(frame.locals().iter().cloned());

        let live = frame.heap().reachable_subgraph(&roots, &self.session.hierarchy)?;
        let reclaimed = frame.heap_mut().retain(&live);
        if reclaimed > 0 {
            debug!("Reclaiming {reclaimed} abstract objects");
            self.session.state.stats.cells_reclaimed += reclaimed;
        }
        Ok(())
    }
}

impl ValueInterpreter for HeapInterpreter<'_, '_> {
    fn new_operation(
        &mut self,
        insn: &Instruction,
        index: usize,
        heap: &mut Heap,
    ) -> Result<AbstractValue> {
        match insn {
            Instruction::Type {
                opcode: Opcode::New,
                class,
            } => self.allocate(class, index, heap),
            Instruction::Field {
                opcode: Opcode::Getstatic,
                field,
            } => self.get_static(field, heap),
            _ => self.types.new_operation(insn, index, heap),
        }
    }

    fn unary_operation(
        &mut self,
        insn: &Instruction,
        index: usize,
        value: AbstractValue,
        heap: &mut Heap,
    ) -> Result<Option<AbstractValue>> {
        match insn {
            Instruction::Field {
                opcode: Opcode::Getfield,
                field,
            } => self.get_field(field, &value, heap).map(Some),
            Instruction::Field {
                opcode: Opcode::Putstatic,
                field,
            } => {
                self.put_static(field, value, heap)?;
                Ok(None)
            }
            Instruction::Type {
                opcode: Opcode::Checkcast,
                class,
            } => self.check_cast(class, value).map(Some),
            Instruction::Type {
                opcode: Opcode::Instanceof,
                class,
            } => self.instance_of(class, &value).map(Some),
            _ => self.types.unary_operation(insn, index, value, heap),
        }
    }

    fn binary_operation(
        &mut self,
        insn: &Instruction,
        index: usize,
        value1: AbstractValue,
        value2: AbstractValue,
        heap: &mut Heap,
    ) -> Result<Option<AbstractValue>> {
        match insn {
            Instruction::Field {
                opcode: Opcode::Putfield,
                field,
            } => {
                self.put_field(field, value1, value2, heap)?;
                Ok(None)
            }
            _ => self.types.binary_operation(insn, index, value1, value2, heap),
        }
    }

    fn ternary_operation(
        &mut self,
        insn: &Instruction,
        _index: usize,
        values: [AbstractValue; 3],
        heap: &mut Heap,
    ) -> Result<()> {
        // Nothing tracks array contents.
        if insn.opcode() == Opcode::Aastore {
            self.escape(heap, &values[2])?;
        }
        Ok(())
    }

    fn nary_operation(
        &mut self,
        insn: &Instruction,
        index: usize,
        values: Vec<AbstractValue>,
        heap: &mut Heap,
    ) -> Result<Option<AbstractValue>> {
        match insn {
            Instruction::Method { opcode, method } => self.call(*opcode, method, index, values, heap),
            Instruction::InvokeDynamic(site) if site.is_string_concat() => {
                Ok(Some(AbstractValue::untracked(return_type(insn)?, true)))
            }
            Instruction::InvokeDynamic(site) => Err(Error::Unsupported(format!(
                "invokedynamic {} bootstrapped by {}.{}",
                site.name, site.bootstrap_owner, site.bootstrap_name
            ))),
            _ => self.types.nary_operation(insn, index, values, heap),
        }
    }

    fn after_execute(&mut self, insn: &Instruction, index: usize, frame: &mut Frame) -> Result<()> {
        if !insn.is_call()
            || !self.session.config.gc.applies_at(self.depth)
            || self
                .session
                .state
                .contexts
                .analysed_call(self.context, index)
                .is_none()
        {
            return Ok(());
        }
        self.collect_garbage(frame)
    }
}
