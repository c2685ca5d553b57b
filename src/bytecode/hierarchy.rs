//! Class hierarchy queries over a [`ClassProvider`].
//!
//! Ancestor sets, field lists and method lookup follow JVM resolution rules closely
//! enough for devirtualization and field keying:
//!
//! - ancestors of a class are the class itself, its superclass chain and every
//!   (transitively) implemented interface
//! - arrays have `Serializable`, `Cloneable` and `Object` as ancestors, plus the array
//!   types of every ancestor of their element type
//! - fields resolve through the class, then its interfaces, then its superclass
//! - methods are searched in the class, then the superclass chain, then interfaces

use std::{
    cell::RefCell,
    collections::{BTreeSet, HashMap},
    rc::Rc,
    sync::Arc,
};

use crate::{
    bytecode::{
        class::{ClassMetadata, FieldMetadata},
        method::MethodBody,
        provider::ClassProvider,
        types::{JvmType, OBJECT},
    },
    Error, Result,
};

/// A method body together with the class that declares it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMethod {
    /// Internal name of the declaring class
    pub owner: String,
    /// The method
    pub body: Arc<MethodBody>,
}

impl ResolvedMethod {
    /// Creates a resolved method.
    pub fn new(owner: impl Into<String>, body: Arc<MethodBody>) -> Self {
        ResolvedMethod {
            owner: owner.into(),
            body,
        }
    }
}

/// A field together with the class that declares it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    /// Internal name of the declaring class
    pub owner: String,
    /// The field
    pub field: FieldMetadata,
}

/// Hierarchy queries with a per-instance ancestor cache.
pub struct ClassHierarchy<'a> {
    provider: &'a dyn ClassProvider,
    ancestors: RefCell<HashMap<JvmType, Rc<BTreeSet<JvmType>>>>,
}

impl<'a> ClassHierarchy<'a> {
    /// Creates a hierarchy view over a provider.
    pub fn new(provider: &'a dyn ClassProvider) -> Self {
        ClassHierarchy {
            provider,
            ancestors: RefCell::new(HashMap::new()),
        }
    }

    /// Returns the underlying provider.
    #[must_use]
    pub fn provider(&self) -> &'a dyn ClassProvider {
        self.provider
    }

    /// Looks up a class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if the provider does not know the class.
    pub fn class(&self, name: &str) -> Result<Arc<ClassMetadata>> {
        self.provider.lookup(name)
    }

    /// Returns every ancestor of `ty`, including `ty` itself. Primitive types are their
    /// own only ancestor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if a class on the way is unknown.
    pub fn ancestors(&self, ty: &JvmType) -> Result<Rc<BTreeSet<JvmType>>> {
        if let Some(cached) = self.ancestors.borrow().get(ty) {
            return Ok(Rc::clone(cached));
        }

        let mut result = BTreeSet::new();
        self.collect_ancestors(ty, &mut result)?;
        let result = Rc::new(result);
        self.ancestors
            .borrow_mut()
            .insert(ty.clone(), Rc::clone(&result));
        Ok(result)
    }

    fn collect_ancestors(&self, ty: &JvmType, result: &mut BTreeSet<JvmType>) -> Result<()> {
        if !result.insert(ty.clone()) {
            return Ok(());
        }

        match ty {
            JvmType::Object(name) => {
                let class = self.class(name)?;
                if let Some(super_name) = &class.super_name {
                    self.collect_ancestors(&JvmType::object(super_name.as_str()), result)?;
                }
                for interface in &class.interfaces {
                    self.collect_ancestors(&JvmType::object(interface.as_str()), result)?;
                }
            }
            JvmType::Array(element) => {
                for root in ["java/io/Serializable", "java/lang/Cloneable", OBJECT] {
                    self.collect_ancestors(&JvmType::object(root), result)?;
                }
                let element_ancestors = self.ancestors(element)?;
                for ancestor in element_ancestors.iter() {
                    self.collect_ancestors(&JvmType::array_of(ancestor.clone()), result)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Returns `true` if `ancestor` is among the ancestors of `ty`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if a class on the way is unknown.
    pub fn has_ancestor(&self, ty: &JvmType, ancestor: &JvmType) -> Result<bool> {
        Ok(self.ancestors(ty)?.contains(ancestor))
    }

    /// Returns `true` if class `sub` is `sup` or inherits from it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if a class on the way is unknown.
    pub fn is_subclass(&self, sub: &str, sup: &str) -> Result<bool> {
        self.has_ancestor(&JvmType::object(sub), &JvmType::object(sup))
    }

    /// Returns `true` if the class is declared final.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if the class is unknown.
    pub fn is_final_class(&self, name: &str) -> Result<bool> {
        Ok(self.class(name)?.is_final())
    }

    /// Instance (or static) fields of a class and all its superclasses, each paired with
    /// its declaring class. Fields named `classLoader` are never tracked and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if a class on the superclass chain is unknown.
    pub fn fields(&self, class: &str, statics: bool) -> Result<Vec<ResolvedField>> {
        let mut result = Vec::new();
        let mut current = Some(class.to_string());
        while let Some(name) = current {
            let class = self.class(&name)?;
            result.extend(
                class
                    .fields
                    .iter()
                    .filter(|field| field.is_static() == statics && field.name != "classLoader")
                    .map(|field| ResolvedField {
                        owner: class.name.clone(),
                        field: field.clone(),
                    }),
            );
            current = class.super_name.clone();
        }
        Ok(result)
    }

    /// Resolves a symbolic field reference to its declaring class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] if no class on the way declares the field, or
    /// [`Error::ClassNotFound`] if a class on the way is unknown.
    pub fn resolve_field(&self, owner: &str, name: &str, desc: &str) -> Result<ResolvedField> {
        self.lookup_field(owner, name, desc)?
            .ok_or_else(|| Error::FieldNotFound {
                owner: owner.to_string(),
                name: name.to_string(),
            })
    }

    fn lookup_field(&self, owner: &str, name: &str, desc: &str) -> Result<Option<ResolvedField>> {
        let class = self.class(owner)?;
        if let Some(field) = class.field(name, desc) {
            return Ok(Some(ResolvedField {
                owner: class.name.clone(),
                field: field.clone(),
            }));
        }

        for interface in &class.interfaces {
            if let Some(found) = self.lookup_field(interface, name, desc)? {
                return Ok(Some(found));
            }
        }

        match &class.super_name {
            Some(super_name) => self.lookup_field(super_name, name, desc),
            None => Ok(None),
        }
    }

    /// Looks up a method declared directly in `class`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if the class is unknown.
    pub fn declared_method(
        &self,
        class: &str,
        name: &str,
        desc: &str,
    ) -> Result<Option<Arc<MethodBody>>> {
        Ok(self.class(class)?.method(name, desc).cloned())
    }

    /// Searches the class, then its superclass chain, then its interfaces for the first
    /// method matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if a class on the way is unknown.
    pub fn find_method(
        &self,
        from: &str,
        predicate: &dyn Fn(&MethodBody) -> bool,
    ) -> Result<Option<ResolvedMethod>> {
        let class = self.class(from)?;
        if let Some(method) = class.methods.iter().find(|method| predicate(method)) {
            return Ok(Some(ResolvedMethod::new(class.name.as_str(), Arc::clone(method))));
        }

        if let Some(super_name) = &class.super_name {
            if let Some(found) = self.find_method(super_name, predicate)? {
                return Ok(Some(found));
            }
        }

        for interface in &class.interfaces {
            if let Some(found) = self.find_method(interface, predicate)? {
                return Ok(Some(found));
            }
        }

        Ok(None)
    }

    /// Finds the implementation a call dispatched on `from` would run: the first
    /// non-abstract method with the given name and descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MethodNotFound`] if there is no implementation, or
    /// [`Error::ClassNotFound`] if a class on the way is unknown.
    pub fn resolve_method_for_inlining(
        &self,
        from: &str,
        name: &str,
        desc: &str,
    ) -> Result<ResolvedMethod> {
        let predicate =
            |method: &MethodBody| method.name == name && method.desc == desc && !method.is_abstract();
        self.find_method(from, &predicate)?
            .ok_or_else(|| Error::MethodNotFound {
                owner: from.to_string(),
                name: name.to_string(),
                desc: desc.to_string(),
            })
    }
}
