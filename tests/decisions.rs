//! Decision graph integration tests.
//!
//! These tests check the decisions a session hands to the transformer: that they are
//! reproducible, that unanalysed calls and library boundaries deny what they must, and
//! that verification rejects methods whose core pipeline calls cannot be inlined.

mod common;

use common::{config, new_point, pool, MAIN, NATIVE, POINT, UTIL};
use fusescope::prelude::*;

fn measure_caller() -> Result<MethodBody> {
    let mut asm = MethodAssembler::new("run", "(Ldemo/Shape;)I", AccessFlags::STATIC);
    asm.load(Opcode::Aload, 0)?
        .invoke(Opcode::Invokestatic, UTIL, "measure", "(Ldemo/Shape;)I")?
        .insn(Opcode::Ireturn)?;
    asm.finalize()
}

/// `void run() { Point p = new Point(2); Native.consume(p); }`
fn consumer() -> Result<MethodBody> {
    let mut asm = MethodAssembler::new("run", "()V", AccessFlags::STATIC);
    new_point(&mut asm, 2)?;
    asm.store(Opcode::Astore, 0)?
        .load(Opcode::Aload, 0)?
        .invoke(Opcode::Invokestatic, NATIVE, "consume", "(Ljava/lang/Object;)V")?
        .insn(Opcode::Return)?;
    asm.finalize()
}

#[test]
fn test_decisions_are_reproducible() -> Result<()> {
    let pool = pool()?;
    let oracle = ExhaustiveOracle;
    let mut session = AnalysisSession::with_config(&pool, &oracle, config());
    let body = measure_caller()?;

    let first = session.analyze(MAIN, &body)?;
    let second = session.analyze(MAIN, &body)?;

    let denied = |outcome: &AnalysisOutcome| {
        (
            outcome.decisions().denied_allocations().collect::<Vec<_>>(),
            outcome.decisions().denied_inlines().collect::<Vec<_>>(),
            outcome.decisions().stack_allocations().collect::<Vec<_>>(),
        )
    };
    assert_eq!(denied(&first), denied(&second));
    assert_eq!(first.allocation_types(), second.allocation_types());
    assert_eq!(first.stats(), second.stats());
    Ok(())
}

#[test]
fn test_root_is_never_denied() -> Result<()> {
    let pool = pool()?;
    let oracle = ExhaustiveOracle;
    let mut session = AnalysisSession::with_config(&pool, &oracle, config());
    let outcome = session.analyze(MAIN, &measure_caller()?)?;

    assert!(outcome.can_inline(outcome.root()));
    assert!(outcome.decisions().denied_inlines().all(|id| id != outcome.root()));
    Ok(())
}

#[test]
fn test_summarised_call_denies_its_arguments() -> Result<()> {
    let pool = pool()?;
    let oracle = ExhaustiveOracle;
    let mut session = AnalysisSession::with_config(&pool, &oracle, config());
    session.purity_mut().insert(NATIVE, "consume", Vec::new());

    let outcome = session.analyze(MAIN, &consumer()?)?;
    let site = outcome.allocation_site(outcome.root(), 0).unwrap();
    assert!(outcome.escaped().contains(&site));
    assert!(!outcome.can_stack_allocate(site));
    assert_eq!(outcome.allocation_types()[&site], POINT);
    Ok(())
}

#[test]
fn test_unsummarised_call_with_tracked_arguments_fails() -> Result<()> {
    let pool = pool()?;
    let oracle = ExhaustiveOracle;
    let mut session = AnalysisSession::with_config(&pool, &oracle, config());

    let result = session.analyze(MAIN, &consumer()?);
    assert!(matches!(result, Err(Error::PrecisionLoss { .. })));
    Ok(())
}

#[test]
fn test_denied_library_entry_fails_verification() -> Result<()> {
    let pool = pool()?;
    let oracle = ExhaustiveOracle;
    let body = measure_caller()?;
    // Treat demo/Util as library code: measure is then a core call that must inline.
    let library = AnalysisConfig {
        library_prefixes: vec![UTIL.to_string()],
        ..config()
    };

    let mut strict = AnalysisSession::with_config(&pool, &oracle, library.clone());
    match strict.analyze(MAIN, &body) {
        Err(Error::InliningPrevented { owner, method }) => {
            assert_eq!(owner, UTIL);
            assert_eq!(method, "measure");
        }
        other => panic!("expected InliningPrevented, got {other:?}"),
    }

    let mut lenient = AnalysisSession::with_config(
        &pool,
        &oracle,
        AnalysisConfig {
            verify_transformable: false,
            ..library
        },
    );
    let outcome = lenient.analyze(MAIN, &body)?;
    let measure = outcome.contexts().analysed_call(outcome.root(), 1).unwrap();
    assert!(!outcome.can_inline(measure));
    Ok(())
}

#[test]
fn test_join_of_two_allocations_denies_both() -> Result<()> {
    // int run(int c) { Point p = c != 0 ? new Point(1) : new Point(2); return p.getX(); }
    let mut asm = MethodAssembler::new("run", "(I)I", AccessFlags::STATIC);
    asm.load(Opcode::Iload, 0)?.jump(Opcode::Ifeq, "other")?;
    new_point(&mut asm, 1)?;
    asm.store(Opcode::Astore, 1)?.jump(Opcode::Goto, "join")?.label("other")?;
    new_point(&mut asm, 2)?;
    asm.store(Opcode::Astore, 1)?
        .label("join")?
        .load(Opcode::Aload, 1)?
        .invoke(Opcode::Invokevirtual, POINT, "getX", "()I")?
        .insn(Opcode::Ireturn)?;

    let pool = pool()?;
    let oracle = ExhaustiveOracle;
    let mut session = AnalysisSession::with_config(&pool, &oracle, config());
    let outcome = session.analyze(MAIN, &asm.finalize()?)?;

    let first = outcome.allocation_site(outcome.root(), 2).unwrap();
    let second = outcome.allocation_site(outcome.root(), 8).unwrap();
    assert!(!outcome.can_stack_allocate(first));
    assert!(!outcome.can_stack_allocate(second));
    // Neither point leaves the method: the join alone is what denies them.
    assert!(outcome.escaped().is_empty());

    // getX reads through a pointer that may be either point.
    let point = JvmType::object(POINT);
    assert!(outcome.decisions().banned_types().iter().any(|ty| ty.ty() == &point));
    Ok(())
}
