//! Class metadata as seen by the analysis.

use std::sync::Arc;

use crate::bytecode::{
    access::AccessFlags,
    instruction::Constant,
    method::MethodBody,
    types::{JvmType, OBJECT},
};

/// A declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMetadata {
    /// Field name
    pub name: String,
    /// Field descriptor
    pub desc: String,
    /// Access flags
    pub access: AccessFlags,
    /// `ConstantValue` attribute of static final fields, if present
    pub constant: Option<Constant>,
}

impl FieldMetadata {
    /// Creates a field without a constant value.
    pub fn new(name: impl Into<String>, desc: impl Into<String>, access: AccessFlags) -> Self {
        FieldMetadata {
            name: name.into(),
            desc: desc.into(),
            access,
            constant: None,
        }
    }

    /// Returns `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }

    /// Returns `true` for final fields.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.access.is_final()
    }

    /// Parses the field descriptor, falling back to `Object` for malformed input.
    #[must_use]
    pub fn field_type(&self) -> JvmType {
        JvmType::from_descriptor(&self.desc).unwrap_or_else(|_| JvmType::object(OBJECT))
    }
}

/// Everything the analysis needs to know about one class or interface.
///
/// Built either by a class-file reader or, in tests and for the synthetic pipeline
/// models, through the builder-style methods below.
///
/// # Examples
///
/// ```rust
/// use fusescope::bytecode::{AccessFlags, ClassMetadata, FieldMetadata};
///
/// let point = ClassMetadata::new("demo/Point", Some("java/lang/Object"))
///     .with_access(AccessFlags::PUBLIC | AccessFlags::FINAL)
///     .with_field(FieldMetadata::new("x", "I", AccessFlags::PRIVATE));
/// assert!(point.is_final());
/// assert!(point.field("x", "I").is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetadata {
    /// Internal name
    pub name: String,
    /// Internal name of the superclass, `None` only for `java/lang/Object`
    pub super_name: Option<String>,
    /// Directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Access flags
    pub access: AccessFlags,
    /// Declared fields
    pub fields: Vec<FieldMetadata>,
    /// Declared methods
    pub methods: Vec<Arc<MethodBody>>,
}

impl ClassMetadata {
    /// Creates a public class without members.
    pub fn new(name: impl Into<String>, super_name: Option<&str>) -> Self {
        ClassMetadata {
            name: name.into(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            access: AccessFlags::PUBLIC,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Creates a public interface extending `java/lang/Object`.
    pub fn interface(name: impl Into<String>) -> Self {
        ClassMetadata::new(name, Some(OBJECT))
            .with_access(AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT)
    }

    /// Replaces the access flags.
    #[must_use]
    pub fn with_access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    /// Adds an implemented interface.
    #[must_use]
    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn with_field(mut self, field: FieldMetadata) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a method.
    #[must_use]
    pub fn with_method(mut self, method: MethodBody) -> Self {
        self.methods.push(Arc::new(method));
        self
    }

    /// Returns `true` if the class cannot be subclassed.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.access.is_final()
    }

    /// Returns `true` for interfaces.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access.contains(AccessFlags::INTERFACE)
    }

    /// Looks up a declared method by name and descriptor.
    #[must_use]
    pub fn method(&self, name: &str, desc: &str) -> Option<&Arc<MethodBody>> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.desc == desc)
    }

    /// Looks up a declared field by name and descriptor.
    #[must_use]
    pub fn field(&self, name: &str, desc: &str) -> Option<&FieldMetadata> {
        self.fields
            .iter()
            .find(|field| field.name == name && field.desc == desc)
    }
}
