//! Class metadata lookup.
//!
//! The analysis never reads class files itself. Everything it needs about classes comes
//! through the [`ClassProvider`] capability; [`ClassPool`] is the in-memory
//! implementation used by embedders that already hold parsed classes, and by the tests.

use std::{collections::HashMap, sync::Arc};

use crate::{
    bytecode::{
        access::AccessFlags,
        assembler::MethodAssembler,
        class::{ClassMetadata, FieldMetadata},
        method::MethodBody,
        opcode::Opcode,
        types::OBJECT,
    },
    Error, Result,
};

/// Source of class metadata.
///
/// Implementations must report unknown classes with [`Error::ClassNotFound`] rather than
/// panicking; the analysis treats that as an abort of the current session only.
pub trait ClassProvider {
    /// Looks up a class by internal name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if the class is unknown.
    fn lookup(&self, name: &str) -> Result<Arc<ClassMetadata>>;
}

/// In-memory [`ClassProvider`] backed by a hash map.
///
/// # Examples
///
/// ```rust
/// use fusescope::bytecode::{ClassMetadata, ClassPool, ClassProvider};
///
/// let mut pool = ClassPool::bootstrap()?;
/// pool.insert(ClassMetadata::new("demo/Box", Some("java/lang/Object")));
///
/// assert!(pool.lookup("demo/Box").is_ok());
/// assert!(pool.lookup("java/lang/String").is_ok());
/// assert!(pool.lookup("demo/Missing").is_err());
/// # Ok::<(), fusescope::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClassPool {
    classes: HashMap<String, Arc<ClassMetadata>>,
}

impl ClassPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pool holding minimal models of the core platform classes the
    /// interpreter itself refers to: `Object`, `String`, `StringBuilder`, `Class`,
    /// `System`, `Objects`, the `Throwable` hierarchy down to `NullPointerException`,
    /// the array super-interfaces, and the pipeline root interfaces `BaseStream` and
    /// `Spliterator`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if one of the built-in bodies fails to assemble.
    pub fn bootstrap() -> Result<Self> {
        let mut pool = ClassPool::new();
        let public = AccessFlags::PUBLIC;
        let public_final = AccessFlags::PUBLIC | AccessFlags::FINAL;
        let native = AccessFlags::PUBLIC | AccessFlags::NATIVE;
        let native_final = native | AccessFlags::FINAL;
        let native_static = native | AccessFlags::STATIC;

        pool.insert(
            ClassMetadata::new(OBJECT, None)
                .with_method(empty_constructor(None)?)
                .with_method(MethodBody::declaration(
                    "getClass",
                    "()Ljava/lang/Class;",
                    native_final,
                ))
                .with_method(MethodBody::declaration("hashCode", "()I", native))
                .with_method(MethodBody::declaration(
                    "clone",
                    "()Ljava/lang/Object;",
                    native | AccessFlags::PROTECTED,
                )),
        );
        pool.insert(ClassMetadata::interface("java/io/Serializable"));
        pool.insert(ClassMetadata::interface("java/lang/Cloneable"));
        pool.insert(ClassMetadata::interface("java/lang/AutoCloseable"));
        pool.insert(ClassMetadata::interface("java/lang/CharSequence"));
        pool.insert(
            ClassMetadata::new("java/lang/String", Some(OBJECT))
                .with_access(public_final)
                .with_interface("java/io/Serializable")
                .with_interface("java/lang/CharSequence")
                .with_method(MethodBody::declaration("length", "()I", native)),
        );
        pool.insert(
            ClassMetadata::new("java/lang/StringBuilder", Some(OBJECT))
                .with_access(public_final)
                .with_interface("java/lang/CharSequence")
                .with_method(empty_constructor(Some(OBJECT))?)
                .with_method(MethodBody::declaration(
                    "append",
                    "(Ljava/lang/Object;)Ljava/lang/StringBuilder;",
                    native,
                ))
                .with_method(MethodBody::declaration(
                    "toString",
                    "()Ljava/lang/String;",
                    native,
                )),
        );
        pool.insert(
            ClassMetadata::new("java/lang/Class", Some(OBJECT))
                .with_access(public_final)
                .with_field(FieldMetadata::new(
                    "name",
                    "Ljava/lang/String;",
                    AccessFlags::PRIVATE,
                ))
                .with_field(FieldMetadata::new(
                    "classLoader",
                    "Ljava/lang/Object;",
                    AccessFlags::PRIVATE | AccessFlags::FINAL,
                ))
                .with_method(MethodBody::declaration(
                    "getName",
                    "()Ljava/lang/String;",
                    native,
                ))
                .with_method(MethodBody::declaration(
                    "getSuperclass",
                    "()Ljava/lang/Class;",
                    native,
                )),
        );
        pool.insert(
            ClassMetadata::new("java/lang/System", Some(OBJECT))
                .with_access(public_final)
                .with_method(MethodBody::declaration(
                    "identityHashCode",
                    "(Ljava/lang/Object;)I",
                    native_static,
                )),
        );

        pool.insert(
            ClassMetadata::new("java/lang/Throwable", Some(OBJECT))
                .with_interface("java/io/Serializable")
                .with_field(FieldMetadata::new(
                    "detailMessage",
                    "Ljava/lang/String;",
                    AccessFlags::PRIVATE,
                ))
                .with_method(empty_constructor(Some(OBJECT))?),
        );
        for (name, parent) in [
            ("java/lang/Exception", "java/lang/Throwable"),
            ("java/lang/RuntimeException", "java/lang/Exception"),
            ("java/lang/NullPointerException", "java/lang/RuntimeException"),
            ("java/lang/IllegalStateException", "java/lang/RuntimeException"),
        ] {
            pool.insert(
                ClassMetadata::new(name, Some(parent)).with_method(empty_constructor(Some(parent))?),
            );
        }

        pool.insert(
            ClassMetadata::new("java/util/Objects", Some(OBJECT))
                .with_access(public_final)
                .with_method(require_non_null()?),
        );
        pool.insert(
            ClassMetadata::interface("java/util/stream/BaseStream")
                .with_interface("java/lang/AutoCloseable"),
        );
        pool.insert(
            ClassMetadata::interface("java/util/Spliterator")
                .with_method(MethodBody::declaration(
                    "getExactSizeIfKnown",
                    "()J",
                    public | AccessFlags::ABSTRACT,
                )),
        );

        Ok(pool)
    }

    /// Adds or replaces a class.
    pub fn insert(&mut self, class: ClassMetadata) -> &mut Self {
        self.classes.insert(class.name.clone(), Arc::new(class));
        self
    }

    /// Returns `true` if the pool knows the class.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Number of classes in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if the pool holds no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassProvider for ClassPool {
    fn lookup(&self, name: &str) -> Result<Arc<ClassMetadata>> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ClassNotFound(name.to_string()))
    }
}

impl<P: ClassProvider + ?Sized> ClassProvider for &P {
    fn lookup(&self, name: &str) -> Result<Arc<ClassMetadata>> {
        (**self).lookup(name)
    }
}

/// `<init>()V` that calls the superclass constructor, or just returns for `Object`.
fn empty_constructor(parent: Option<&str>) -> Result<MethodBody> {
    let mut asm = MethodAssembler::new("<init>", "()V", AccessFlags::PUBLIC);
    if let Some(parent) = parent {
        asm.load(Opcode::Aload, 0)?
            .invoke(Opcode::Invokespecial, parent, "<init>", "()V")?;
    }
    asm.insn(Opcode::Return)?;
    asm.finalize()
}

/// `Objects.requireNonNull(Object)`: throws on null, returns the argument otherwise.
fn require_non_null() -> Result<MethodBody> {
    let mut asm = MethodAssembler::new(
        "requireNonNull",
        "(Ljava/lang/Object;)Ljava/lang/Object;",
        AccessFlags::PUBLIC | AccessFlags::STATIC,
    );
    asm.load(Opcode::Aload, 0)?
        .jump(Opcode::Ifnonnull, "ok")?
        .type_insn(Opcode::New, "java/lang/NullPointerException")?
        .insn(Opcode::Dup)?
        .invoke(
            Opcode::Invokespecial,
            "java/lang/NullPointerException",
            "<init>",
            "()V",
        )?
        .insn(Opcode::Athrow)?
        .label("ok")?
        .load(Opcode::Aload, 0)?
        .insn(Opcode::Areturn)?;
    asm.finalize()
}
