//! Class pool fixtures shared by the integration tests.
//!
//! The fixtures model a handful of small application classes on top of the bootstrap
//! pool, plus a minimal `AbstractPipeline` for exercising the library models.

#![allow(dead_code)]

use fusescope::prelude::*;

pub const POINT: &str = "demo/Point";
pub const HOLDER: &str = "demo/Holder";
pub const SHAPE: &str = "demo/Shape";
pub const SQUARE: &str = "demo/Square";
pub const CIRCLE: &str = "demo/Circle";
pub const UTIL: &str = "demo/Util";
pub const FACTORY: &str = "demo/Factory";
pub const REGISTRY: &str = "demo/Registry";
pub const STAGE: &str = "demo/Stage";
pub const NATIVE: &str = "demo/Native";
pub const MAIN: &str = "demo/Main";

pub const PIPELINE: &str = "java/util/stream/AbstractPipeline";
pub const PIPELINE_DESC: &str = "Ljava/util/stream/AbstractPipeline;";
pub const SINK: &str = "java/util/stream/Sink";
pub const SINK_DESC: &str = "Ljava/util/stream/Sink;";

const OBJECT: &str = "java/lang/Object";

/// Configuration without a static heap, so that fixtures do not need the stream
/// library's classes.
pub fn config() -> AnalysisConfig {
    AnalysisConfig {
        static_classes: Vec::new(),
        ..AnalysisConfig::default()
    }
}

/// `aload0; invokespecial <parent>.<init>()V`
fn super_call(asm: &mut MethodAssembler, parent: &str) -> Result<()> {
    asm.load(Opcode::Aload, 0)?
        .invoke(Opcode::Invokespecial, parent, "<init>", "()V")?;
    Ok(())
}

fn empty_constructor(parent: &str) -> Result<MethodBody> {
    let mut asm = MethodAssembler::new("<init>", "()V", AccessFlags::PUBLIC);
    super_call(&mut asm, parent)?;
    asm.insn(Opcode::Return)?;
    asm.finalize()
}

/// Emits `new Point(value)`, leaving the reference on the stack.
pub fn new_point(asm: &mut MethodAssembler, value: i32) -> Result<()> {
    asm.type_insn(Opcode::New, POINT)?
        .insn(Opcode::Dup)?
        .iconst(value)?
        .invoke(Opcode::Invokespecial, POINT, "<init>", "(I)V")?;
    Ok(())
}

/// `final class Point { private int x; Point(int x); int getX(); }`
fn point() -> Result<ClassMetadata> {
    let mut init = MethodAssembler::new("<init>", "(I)V", AccessFlags::PUBLIC);
    super_call(&mut init, OBJECT)?;
    init.load(Opcode::Aload, 0)?
        .load(Opcode::Iload, 1)?
        .field(Opcode::Putfield, POINT, "x", "I")?
        .insn(Opcode::Return)?;

    let mut get_x = MethodAssembler::new("getX", "()I", AccessFlags::PUBLIC);
    get_x
        .load(Opcode::Aload, 0)?
        .field(Opcode::Getfield, POINT, "x", "I")?
        .insn(Opcode::Ireturn)?;

    Ok(ClassMetadata::new(POINT, Some(OBJECT))
        .with_access(AccessFlags::PUBLIC | AccessFlags::FINAL)
        .with_field(FieldMetadata::new("x", "I", AccessFlags::PRIVATE))
        .with_method(init.finalize()?)
        .with_method(get_x.finalize()?))
}

/// Package-private `abstract class Shape { abstract int area(); }` with two
/// implementations.
fn shapes(pool: &mut ClassPool) -> Result<()> {
    pool.insert(
        ClassMetadata::new(SHAPE, Some(OBJECT))
            .with_access(AccessFlags::ABSTRACT)
            .with_method(MethodBody::declaration(
                "area",
                "()I",
                AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
            ))
            .with_method(empty_constructor(OBJECT)?),
    );
    for (name, area) in [(SQUARE, 4), (CIRCLE, 3)] {
        let mut asm = MethodAssembler::new("area", "()I", AccessFlags::PUBLIC);
        asm.iconst(area)?.insn(Opcode::Ireturn)?;
        pool.insert(
            ClassMetadata::new(name, Some(SHAPE))
                .with_method(empty_constructor(SHAPE)?)
                .with_method(asm.finalize()?),
        );
    }
    Ok(())
}

/// `Util.measure(Shape)`: allocates a scratch `Point`, then dispatches on the shape.
fn util() -> Result<ClassMetadata> {
    let mut measure = MethodAssembler::new(
        "measure",
        "(Ldemo/Shape;)I",
        AccessFlags::PUBLIC | AccessFlags::STATIC,
    );
    new_point(&mut measure, 3)?;
    measure
        .insn(Opcode::Pop)?
        .load(Opcode::Aload, 0)?
        .invoke(Opcode::Invokevirtual, SHAPE, "area", "()I")?
        .insn(Opcode::Ireturn)?;

    let mut id = MethodAssembler::new("id", "(I)I", AccessFlags::PUBLIC | AccessFlags::STATIC);
    id.load(Opcode::Iload, 0)?.insn(Opcode::Ireturn)?;

    let mut recurse = MethodAssembler::new(
        "recurse",
        "(I)I",
        AccessFlags::PUBLIC | AccessFlags::STATIC,
    );
    recurse
        .load(Opcode::Iload, 0)?
        .invoke(Opcode::Invokestatic, UTIL, "recurse", "(I)I")?
        .insn(Opcode::Ireturn)?;

    Ok(ClassMetadata::new(UTIL, Some(OBJECT))
        .with_method(measure.finalize()?)
        .with_method(id.finalize()?)
        .with_method(recurse.finalize()?))
}

/// `Factory.compute()`: `return new Point(5).getX();`
fn factory() -> Result<ClassMetadata> {
    let mut compute = MethodAssembler::new("compute", "()I", AccessFlags::PUBLIC | AccessFlags::STATIC);
    new_point(&mut compute, 5)?;
    compute
        .invoke(Opcode::Invokevirtual, POINT, "getX", "()I")?
        .insn(Opcode::Ireturn)?;
    Ok(ClassMetadata::new(FACTORY, Some(OBJECT)).with_method(compute.finalize()?))
}

/// `class Registry { static Point DEFAULT = new Point(7); }`
fn registry() -> Result<ClassMetadata> {
    let mut clinit = MethodAssembler::new("<clinit>", "()V", AccessFlags::STATIC);
    new_point(&mut clinit, 7)?;
    clinit
        .field(Opcode::Putstatic, REGISTRY, "DEFAULT", "Ldemo/Point;")?
        .insn(Opcode::Return)?;
    Ok(ClassMetadata::new(REGISTRY, Some(OBJECT))
        .with_field(FieldMetadata::new(
            "DEFAULT",
            "Ldemo/Point;",
            AccessFlags::PUBLIC | AccessFlags::STATIC,
        ))
        .with_method(clinit.finalize()?))
}

/// A stripped-down `AbstractPipeline` and one concrete stage class whose
/// `opWrapSink` passes the downstream sink through.
fn pipeline(pool: &mut ClassPool) -> Result<()> {
    pool.insert(ClassMetadata::interface(SINK));

    let wrap_sink_desc = format!("({SINK_DESC}){SINK_DESC}");
    let op_wrap_sink_desc = format!("(I{SINK_DESC}){SINK_DESC}");
    pool.insert(
        ClassMetadata::new(PIPELINE, Some(OBJECT))
            .with_access(AccessFlags::PUBLIC | AccessFlags::ABSTRACT)
            .with_field(FieldMetadata::new("previousStage", PIPELINE_DESC, AccessFlags::PUBLIC))
            .with_field(FieldMetadata::new("combinedFlags", "I", AccessFlags::PUBLIC))
            .with_field(FieldMetadata::new("depth", "I", AccessFlags::PUBLIC))
            .with_method(empty_constructor(OBJECT)?)
            .with_method(MethodBody::declaration(
                "wrapSink",
                wrap_sink_desc.as_str(),
                AccessFlags::FINAL,
            ))
            .with_method(MethodBody::declaration(
                "opWrapSink",
                op_wrap_sink_desc.as_str(),
                AccessFlags::ABSTRACT,
            )),
    );

    let init_desc = format!("({PIPELINE_DESC}I)V");
    let mut init = MethodAssembler::new("<init>", init_desc.as_str(), AccessFlags::PUBLIC);
    super_call(&mut init, PIPELINE)?;
    init.load(Opcode::Aload, 0)?
        .load(Opcode::Aload, 1)?
        .field(Opcode::Putfield, PIPELINE, "previousStage", PIPELINE_DESC)?
        .load(Opcode::Aload, 0)?
        .load(Opcode::Iload, 2)?
        .field(Opcode::Putfield, PIPELINE, "depth", "I")?
        .insn(Opcode::Return)?;

    let mut op = MethodAssembler::new("opWrapSink", op_wrap_sink_desc.as_str(), AccessFlags::PUBLIC);
    op.load(Opcode::Aload, 2)?.insn(Opcode::Areturn)?;

    pool.insert(
        ClassMetadata::new(STAGE, Some(PIPELINE))
            .with_method(init.finalize()?)
            .with_method(op.finalize()?),
    );
    Ok(())
}

/// Emits `new Stage(<previous>, depth)`; `previous` is a local slot, `None` for null.
pub fn new_stage(asm: &mut MethodAssembler, previous: Option<usize>, depth: i32) -> Result<()> {
    asm.type_insn(Opcode::New, STAGE)?.insn(Opcode::Dup)?;
    match previous {
        Some(var) => asm.load(Opcode::Aload, var)?,
        None => asm.insn(Opcode::AconstNull)?,
    };
    let init_desc = format!("({PIPELINE_DESC}I)V");
    asm.iconst(depth)?
        .invoke(Opcode::Invokespecial, STAGE, "<init>", init_desc.as_str())?;
    Ok(())
}

/// Routes the crate's log output through the test harness; `RUST_LOG` overrides the
/// default level.
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .filter_module("fusescope", log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp(None)
        .is_test(true)
        .try_init();
}

/// The bootstrap pool plus every fixture class. Installs the test logger on first use.
pub fn pool() -> Result<ClassPool> {
    init_logging();
    let mut pool = ClassPool::bootstrap()?;
    pool.insert(point()?);
    pool.insert(
        ClassMetadata::new(HOLDER, Some(OBJECT))
            .with_field(FieldMetadata::new("item", "Ljava/lang/Object;", AccessFlags::PUBLIC))
            .with_method(empty_constructor(OBJECT)?),
    );
    shapes(&mut pool)?;
    pool.insert(util()?);
    pool.insert(factory()?);
    pool.insert(registry()?);
    pool.insert(ClassMetadata::new(NATIVE, Some(OBJECT)).with_method(MethodBody::declaration(
        "consume",
        "(Ljava/lang/Object;)V",
        AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::NATIVE,
    )));
    pipeline(&mut pool)?;
    Ok(pool)
}
