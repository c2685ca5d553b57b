//! Access and property flags for classes, fields and methods.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// JVM access flags, shared by classes, fields and methods.
    ///
    /// Values follow the class file format; flags that only make sense on one kind of
    /// member are simply never set on the others.
    pub struct AccessFlags: u16 {
        /// Visible everywhere
        const PUBLIC = 0x0001;
        /// Visible in the declaring class only
        const PRIVATE = 0x0002;
        /// Visible in subclasses and the package
        const PROTECTED = 0x0004;
        /// Member belongs to the class rather than instances
        const STATIC = 0x0008;
        /// Class cannot be subclassed, method cannot be overridden, field cannot change
        const FINAL = 0x0010;
        /// Method is synchronized
        const SYNCHRONIZED = 0x0020;
        /// Field is volatile
        const VOLATILE = 0x0040;
        /// Method is implemented outside the JVM
        const NATIVE = 0x0100;
        /// Class is an interface
        const INTERFACE = 0x0200;
        /// Class or method is abstract
        const ABSTRACT = 0x0400;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Class is an enum or field is an enum constant
        const ENUM = 0x4000;
    }
}

impl AccessFlags {
    /// Returns `true` if the member is public.
    #[must_use]
    pub fn is_public(self) -> bool {
        self.contains(AccessFlags::PUBLIC)
    }

    /// Returns `true` if the member is static.
    #[must_use]
    pub fn is_static(self) -> bool {
        self.contains(AccessFlags::STATIC)
    }

    /// Returns `true` if the member is final.
    #[must_use]
    pub fn is_final(self) -> bool {
        self.contains(AccessFlags::FINAL)
    }

    /// Returns `true` if the method is native.
    #[must_use]
    pub fn is_native(self) -> bool {
        self.contains(AccessFlags::NATIVE)
    }

    /// Returns `true` if the class or method is abstract.
    #[must_use]
    pub fn is_abstract(self) -> bool {
        self.contains(AccessFlags::ABSTRACT)
    }
}
