//! Interprocedural analysis integration tests.
//!
//! These tests drive whole sessions through the public API:
//! 1. Assemble a root method against the fixture pool in `common`
//! 2. Analyse it with an [`AnalysisSession`]
//! 3. Inspect recorded frames, contexts, escapes and the resulting decisions

mod common;

use common::{
    config, new_point, new_stage, pool, CIRCLE, FACTORY, HOLDER, MAIN, PIPELINE, POINT,
    REGISTRY, SHAPE, SINK_DESC, SQUARE, UTIL,
};
use fusescope::prelude::*;

/// Analyses `body` as a method of `demo/Main` under `config`.
fn run(body: &MethodBody, config: AnalysisConfig) -> Result<AnalysisOutcome> {
    let pool = pool()?;
    let oracle = ExhaustiveOracle;
    let mut session = AnalysisSession::with_config(&pool, &oracle, config);
    session.analyze(MAIN, body)
}

/// The frame recorded before instruction `index` of the root method.
fn root_frame(outcome: &AnalysisOutcome, index: usize) -> Option<&Frame> {
    outcome
        .root_frames()
        .and_then(|frames| frames.get(index))
        .and_then(Option::as_ref)
}

fn int_constant(value: &AbstractValue) -> Option<i32> {
    value.constant.value().map(|number| number.as_int())
}

#[test]
fn test_local_allocation_is_removable() -> Result<()> {
    // int run() { return new Point(3).getX() * 2; }
    let mut asm = MethodAssembler::new("run", "()I", AccessFlags::STATIC);
    new_point(&mut asm, 3)?;
    asm.invoke(Opcode::Invokevirtual, POINT, "getX", "()I")?
        .iconst(2)?
        .insn(Opcode::Imul)?
        .insn(Opcode::Ireturn)?;
    let outcome = run(&asm.finalize()?, config())?;

    let root = outcome.root();
    let site = outcome.allocation_site(root, 0).unwrap();
    assert_eq!(outcome.allocation_types()[&site], POINT);
    assert!(outcome.escaped().is_empty());
    assert!(outcome.can_stack_allocate(site));

    let init = outcome.contexts().analysed_call(root, 3).unwrap();
    let get_x = outcome.contexts().analysed_call(root, 4).unwrap();
    assert!(outcome.can_inline(init));
    assert!(outcome.can_inline(get_x));
    assert_eq!(outcome.contexts().get(get_x).owner(), POINT);

    let before_return = root_frame(&outcome, 7).unwrap();
    assert_eq!(int_constant(before_return.peek(0).unwrap()), Some(6));
    // The point is unreachable once getX has returned.
    assert!(!before_return.heap().contains(site));
    assert!(outcome.stats().cells_reclaimed >= 1);
    Ok(())
}

#[test]
fn test_loop_local_allocation_is_removable() -> Result<()> {
    // int run(int n) { int s = 0; for (int i = 0; i < n; i++) { Point p = new Point(1); s += p.getX(); } return s; }
    let mut asm = MethodAssembler::new("run", "(I)I", AccessFlags::STATIC);
    asm.iconst(0)?
        .store(Opcode::Istore, 1)?
        .iconst(0)?
        .store(Opcode::Istore, 2)?
        .label("head")?
        .load(Opcode::Iload, 2)?
        .load(Opcode::Iload, 0)?
        .jump(Opcode::IfIcmpge, "exit")?;
    new_point(&mut asm, 1)?;
    asm.store(Opcode::Astore, 3)?
        .load(Opcode::Iload, 1)?
        .load(Opcode::Aload, 3)?
        .invoke(Opcode::Invokevirtual, POINT, "getX", "()I")?
        .insn(Opcode::Iadd)?
        .store(Opcode::Istore, 1)?
        .iinc(2, 1)?
        .jump(Opcode::Goto, "head")?
        .label("exit")?
        .load(Opcode::Iload, 1)?
        .insn(Opcode::Ireturn)?;
    let outcome = run(&asm.finalize()?, config())?;

    let root = outcome.root();
    let site = outcome.allocation_site(root, 7).unwrap();
    // The previous iteration's point survives the back edge without escaping.
    assert!(root_frame(&outcome, 4).unwrap().heap().contains(site));
    assert!(outcome.escaped().is_empty());
    assert!(outcome.can_stack_allocate(site));

    let init = outcome.contexts().analysed_call(root, 10).unwrap();
    let get_x = outcome.contexts().analysed_call(root, 14).unwrap();
    assert!(outcome.can_inline(init));
    assert!(outcome.can_inline(get_x));
    Ok(())
}

#[test]
fn test_branch_local_allocation_is_removable() -> Result<()> {
    // int run(int c) { int s = 0; if (c != 0) { Point p = new Point(1); s = p.getX(); } return s; }
    let mut asm = MethodAssembler::new("run", "(I)I", AccessFlags::STATIC);
    asm.iconst(0)?
        .store(Opcode::Istore, 1)?
        .load(Opcode::Iload, 0)?
        .jump(Opcode::Ifeq, "done")?;
    new_point(&mut asm, 1)?;
    asm.store(Opcode::Astore, 2)?
        .load(Opcode::Aload, 2)?
        .invoke(Opcode::Invokevirtual, POINT, "getX", "()I")?
        .store(Opcode::Istore, 1)?
        .label("done")?
        .load(Opcode::Iload, 1)?
        .insn(Opcode::Ireturn)?;
    let outcome = run(&asm.finalize()?, config())?;

    let site = outcome.allocation_site(outcome.root(), 4).unwrap();
    assert!(root_frame(&outcome, 12).unwrap().heap().contains(site));
    assert!(outcome.escaped().is_empty());
    assert!(outcome.can_stack_allocate(site));
    assert_eq!(outcome.decisions().denied_allocations().count(), 0);
    Ok(())
}

#[test]
fn test_stored_allocation_escapes() -> Result<()> {
    // void store(Holder h) { h.item = new Point(1); }
    let mut asm = MethodAssembler::new("store", "(Ldemo/Holder;)V", AccessFlags::STATIC);
    asm.load(Opcode::Aload, 0)?;
    new_point(&mut asm, 1)?;
    asm.field(Opcode::Putfield, HOLDER, "item", "Ljava/lang/Object;")?
        .insn(Opcode::Return)?;
    let body = asm.finalize()?;

    let outcome = run(&body, config())?;
    let site = outcome.allocation_site(outcome.root(), 1).unwrap();
    assert!(outcome.escaped().contains(&site));
    assert!(!outcome.can_stack_allocate(site));

    // The constructor cannot be inlined without its allocation.
    let init = outcome.contexts().analysed_call(outcome.root(), 4).unwrap();
    assert!(!outcome.can_inline(init));

    let strict = AnalysisConfig {
        reject_escapes: true,
        ..config()
    };
    assert!(matches!(run(&body, strict), Err(Error::TrackedEscape(_))));
    Ok(())
}

#[test]
fn test_unresolved_dispatch_blocks_callee() -> Result<()> {
    // int run(Shape s) { return Util.measure(s); }
    let mut asm = MethodAssembler::new("run", "(Ldemo/Shape;)I", AccessFlags::STATIC);
    asm.load(Opcode::Aload, 0)?
        .invoke(Opcode::Invokestatic, UTIL, "measure", "(Ldemo/Shape;)I")?
        .insn(Opcode::Ireturn)?;
    let outcome = run(&asm.finalize()?, config())?;

    let measure = outcome.contexts().analysed_call(outcome.root(), 1).unwrap();
    // Shape.area has no unique target and Shape is not accessible from demo/Main.
    assert!(!outcome.can_inline(measure));

    let scratch = outcome.allocation_site(measure, 0).unwrap();
    assert!(!outcome.escaped().contains(&scratch));
    assert!(!outcome.can_stack_allocate(scratch));
    Ok(())
}

#[test]
fn test_merged_subclasses_leave_dispatch_unresolved() -> Result<()> {
    // int run(int c) { Shape s = c != 0 ? new Square() : new Circle(); return s.area(); }
    let mut asm = MethodAssembler::new("run", "(I)I", AccessFlags::STATIC);
    asm.load(Opcode::Iload, 0)?
        .jump(Opcode::Ifeq, "circle")?
        .type_insn(Opcode::New, SQUARE)?
        .insn(Opcode::Dup)?
        .invoke(Opcode::Invokespecial, SQUARE, "<init>", "()V")?
        .store(Opcode::Astore, 1)?
        .jump(Opcode::Goto, "join")?
        .label("circle")?
        .type_insn(Opcode::New, CIRCLE)?
        .insn(Opcode::Dup)?
        .invoke(Opcode::Invokespecial, CIRCLE, "<init>", "()V")?
        .store(Opcode::Astore, 1)?;
    asm.label("join")?
        .load(Opcode::Aload, 1)?
        .invoke(Opcode::Invokevirtual, SHAPE, "area", "()I")?
        .insn(Opcode::Ireturn)?;
    let body = asm.finalize()?;

    // Both shapes are reachable from the receiver and nothing says area leaves them alone.
    assert!(matches!(run(&body, config()), Err(Error::PrecisionLoss { .. })));

    let pool = pool()?;
    let oracle = ExhaustiveOracle;
    let mut session = AnalysisSession::with_config(&pool, &oracle, config());
    session.purity_mut().insert(SHAPE, "area", Vec::new());
    let outcome = session.analyze(MAIN, &body)?;

    let root = outcome.root();
    let receiver = root_frame(&outcome, 12).unwrap().peek(0).unwrap();
    assert_eq!(receiver.pointer, PointerElement::ITop);
    assert!(!receiver.ty.is_precise());
    assert!(outcome.contexts().analysed_call(root, 12).is_none());
    assert!(root_frame(&outcome, 13).unwrap().peek(0).unwrap().constant.is_top());

    for index in [2, 7] {
        let site = outcome.allocation_site(root, index).unwrap();
        assert!(outcome.escaped().contains(&site));
        assert!(!outcome.can_stack_allocate(site));
    }
    Ok(())
}

#[test]
fn test_dead_branch_is_excluded() -> Result<()> {
    // Object o = null; if (o != null) return new Point(1).getX(); return 0;
    let mut asm = MethodAssembler::new("run", "()I", AccessFlags::STATIC);
    asm.insn(Opcode::AconstNull)?
        .store(Opcode::Astore, 0)?
        .load(Opcode::Aload, 0)?
        .jump(Opcode::Ifnonnull, "alloc")?
        .iconst(0)?
        .insn(Opcode::Ireturn)?
        .label("alloc")?;
    new_point(&mut asm, 1)?;
    asm.invoke(Opcode::Invokevirtual, POINT, "getX", "()I")?
        .insn(Opcode::Ireturn)?;
    let outcome = run(&asm.finalize()?, config())?;

    assert!(root_frame(&outcome, 6).map_or(true, Frame::is_dead));
    assert_eq!(outcome.allocation_site(outcome.root(), 6), None);
    assert_eq!(outcome.contexts().len(), 1);
    assert_eq!(outcome.decisions().stack_allocations().count(), 0);
    assert_eq!(outcome.decisions().denied_allocations().count(), 0);
    Ok(())
}

#[test]
fn test_garbage_collection_at_root_depth() -> Result<()> {
    // int run() { return Factory.compute(); }
    let mut asm = MethodAssembler::new("run", "()I", AccessFlags::STATIC);
    asm.invoke(Opcode::Invokestatic, FACTORY, "compute", "()I")?
        .insn(Opcode::Ireturn)?;
    let body = asm.finalize()?;

    let collected = run(&body, config())?;
    let compute = collected.contexts().analysed_call(collected.root(), 0).unwrap();
    let site = collected.allocation_site(compute, 0).unwrap();
    assert!(!root_frame(&collected, 1).unwrap().heap().contains(site));
    assert!(collected.stats().cells_reclaimed >= 1);

    let kept = run(
        &body,
        AnalysisConfig {
            gc: GcPolicy::Disabled,
            ..config()
        },
    )?;
    let compute = kept.contexts().analysed_call(kept.root(), 0).unwrap();
    let site = kept.allocation_site(compute, 0).unwrap();
    assert!(root_frame(&kept, 1).unwrap().heap().contains(site));
    assert_eq!(kept.stats().cells_reclaimed, 0);
    Ok(())
}

#[test]
fn test_recursion_limit() -> Result<()> {
    let mut asm = MethodAssembler::new("run", "(I)I", AccessFlags::STATIC);
    asm.load(Opcode::Iload, 0)?
        .invoke(Opcode::Invokestatic, UTIL, "recurse", "(I)I")?
        .insn(Opcode::Ireturn)?;
    let body = asm.finalize()?;

    let bounded = AnalysisConfig {
        max_depth: 10,
        ..config()
    };
    assert!(matches!(run(&body, bounded), Err(Error::RecursionLimit(10))));
    Ok(())
}

#[test]
fn test_session_is_reusable_after_failure() -> Result<()> {
    let pool = pool()?;
    let oracle = ExhaustiveOracle;
    let mut session = AnalysisSession::with_config(
        &pool,
        &oracle,
        AnalysisConfig {
            max_depth: 4,
            ..config()
        },
    );

    let mut failing = MethodAssembler::new("run", "(I)I", AccessFlags::STATIC);
    failing
        .load(Opcode::Iload, 0)?
        .invoke(Opcode::Invokestatic, UTIL, "recurse", "(I)I")?
        .insn(Opcode::Ireturn)?;
    assert!(session.analyze(MAIN, &failing.finalize()?).is_err());

    let mut simple = MethodAssembler::new("run", "()I", AccessFlags::STATIC);
    simple.iconst(1)?.insn(Opcode::Ireturn)?;
    let outcome = session.analyze(MAIN, &simple.finalize()?)?;
    assert_eq!(outcome.contexts().len(), 1);
    assert_eq!(outcome.stats().contexts_analysed, 1);
    Ok(())
}

#[test]
fn test_static_initializer_allocations_escape() -> Result<()> {
    // int run() { return Registry.DEFAULT.getX(); }
    let mut asm = MethodAssembler::new("run", "()I", AccessFlags::STATIC);
    asm.field(Opcode::Getstatic, REGISTRY, "DEFAULT", "Ldemo/Point;")?
        .invoke(Opcode::Invokevirtual, POINT, "getX", "()I")?
        .insn(Opcode::Ireturn)?;
    let outcome = run(
        &asm.finalize()?,
        AnalysisConfig {
            static_classes: vec![REGISTRY.to_string()],
            ..config()
        },
    )?;

    let statics = outcome.static_allocations();
    assert!(statics.contains_key(REGISTRY));
    assert!(!outcome.allocation_types().contains_key(&statics[REGISTRY]));

    let default = outcome
        .allocation_types()
        .iter()
        .find(|(_, class)| class.as_str() == POINT)
        .map(|(&site, _)| site)
        .unwrap();
    assert!(outcome.escaped().contains(&default));
    assert!(!outcome.can_stack_allocate(default));

    // The non-final static is widened: any Point might be stored there by now.
    let receiver = root_frame(&outcome, 1).unwrap().peek(0).unwrap();
    assert_eq!(receiver.pointer, PointerElement::Top);
    assert!(!receiver.ty.is_precise());
    Ok(())
}

/// `int count(int n) { int i = 0; do { Util.id(i); i++; } while (i < n); return i; }`
fn counting_loop() -> Result<MethodBody> {
    let mut asm = MethodAssembler::new("count", "(I)I", AccessFlags::STATIC);
    asm.iconst(0)?
        .store(Opcode::Istore, 1)?
        .label("head")?
        .load(Opcode::Iload, 1)?
        .invoke(Opcode::Invokestatic, UTIL, "id", "(I)I")?
        .insn(Opcode::Pop)?
        .iinc(1, 1)?
        .load(Opcode::Iload, 1)?
        .load(Opcode::Iload, 0)?
        .jump(Opcode::IfIcmplt, "head")?
        .load(Opcode::Iload, 1)?
        .insn(Opcode::Ireturn)?;
    asm.finalize()
}

#[test]
fn test_call_string_identity_keeps_latest_entry() -> Result<()> {
    let outcome = run(&counting_loop()?, config())?;

    assert_eq!(outcome.contexts().len(), 2);
    let id = outcome.contexts().analysed_call(outcome.root(), 3).unwrap();
    // The second pass sees the merged loop counter.
    assert!(outcome.contexts().get(id).arguments()[0].constant.is_top());
    Ok(())
}

#[test]
fn test_heap_sensitive_identity_keeps_every_entry() -> Result<()> {
    let outcome = run(
        &counting_loop()?,
        AnalysisConfig {
            context_identity: ContextIdentity::HeapSensitive,
            ..config()
        },
    )?;

    assert_eq!(outcome.contexts().len(), 3);
    let first_pass = outcome
        .contexts()
        .iter()
        .filter(|&(id, _)| id != outcome.root())
        .any(|(_, context)| int_constant(&context.arguments()[0]) == Some(0));
    assert!(first_pass);
    Ok(())
}

#[test]
fn test_wrap_sink_is_modelled_per_chain_length() -> Result<()> {
    // Sink run(Sink s) { return new Stage(new Stage(new Stage(null, 0), 1), 2).wrapSink(s); }
    let desc = format!("({SINK_DESC}){SINK_DESC}");
    let mut asm = MethodAssembler::new("run", desc.as_str(), AccessFlags::STATIC);
    new_stage(&mut asm, None, 0)?;
    asm.store(Opcode::Astore, 1)?;
    new_stage(&mut asm, Some(1), 1)?;
    asm.store(Opcode::Astore, 2)?;
    new_stage(&mut asm, Some(2), 2)?;
    asm.store(Opcode::Astore, 3)?
        .load(Opcode::Aload, 3)?
        .load(Opcode::Aload, 0)?
        .invoke(Opcode::Invokevirtual, PIPELINE, "wrapSink", desc.as_str())?
        .insn(Opcode::Areturn)?;
    let outcome = run(&asm.finalize()?, config())?;

    let wrap_sink = outcome.contexts().analysed_call(outcome.root(), 20).unwrap();
    let context = outcome.contexts().get(wrap_sink);
    assert_eq!(context.owner(), PIPELINE);

    let model = context.method();
    let stage_calls: Vec<usize> = model
        .instructions
        .iter()
        .enumerate()
        .filter(|(_, insn)| insn.method().is_some_and(|m| m.name == "opWrapSink"))
        .map(|(index, _)| index)
        .collect();
    assert_eq!(stage_calls.len(), 2);
    for index in stage_calls {
        assert!(outcome.contexts().analysed_call(wrap_sink, index).is_some());
    }

    assert!(outcome.can_inline(wrap_sink));
    for stage in [0, 6, 12] {
        let site = outcome.allocation_site(outcome.root(), stage).unwrap();
        assert!(outcome.can_stack_allocate(site), "stage allocated at {stage}");
    }
    Ok(())
}

#[test]
fn test_registered_model_replaces_body() -> Result<()> {
    // int run() { return new Point(3).getX(); }
    let mut asm = MethodAssembler::new("run", "()I", AccessFlags::STATIC);
    new_point(&mut asm, 3)?;
    asm.invoke(Opcode::Invokevirtual, POINT, "getX", "()I")?
        .insn(Opcode::Ireturn)?;
    let body = asm.finalize()?;

    let pool = pool()?;
    let oracle = ExhaustiveOracle;
    let mut session = AnalysisSession::with_config(&pool, &oracle, config());
    // getX is modelled as returning its receiver's x plus 74.
    session.models_mut().register(
        POINT,
        "getX",
        |arguments, heap| {
            let receiver = arguments[0].points_to()?;
            let x = heap.get_field(receiver, &FieldKey::new(POINT, "x"), AbstractValue::top());
            let x = x.constant.value().map_or(0, |n| usize::try_from(n.as_int()).unwrap_or(0));
            Ok(x + 74)
        },
        |value, declared| {
            let mut model = MethodAssembler::new(declared.name.as_str(), declared.desc.as_str(), declared.access);
            model.iconst(i32::try_from(value).unwrap())?.insn(Opcode::Ireturn)?;
            model.finalize()
        },
    );
    let outcome = session.analyze(MAIN, &body)?;

    let get_x = outcome.contexts().analysed_call(outcome.root(), 4).unwrap();
    assert_eq!(outcome.contexts().get(get_x).owner(), POINT);
    assert_eq!(outcome.contexts().get(get_x).method().instructions.len(), 2);
    assert_eq!(int_constant(root_frame(&outcome, 5).unwrap().peek(0).unwrap()), Some(77));
    Ok(())
}
