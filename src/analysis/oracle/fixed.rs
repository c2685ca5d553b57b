//! Type queries answered from a table.

use std::collections::HashMap;

use crate::{
    analysis::{
        domain::AbstractValue,
        oracle::{OracleQuery, TypeQuery},
    },
    bytecode::{JvmType, MethodRef},
    Result,
};

/// Answers receiver queries from a declared-type to runtime-class table.
///
/// The receiver's declared type is looked up first, then the call's owner. This is how
/// results of an external points-to analysis are wired in.
#[derive(Debug, Clone, Default)]
pub struct FixedTypeOracle {
    types: HashMap<String, String>,
}

impl FixedTypeOracle {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers queries about `declared` with `runtime`.
    #[must_use]
    pub fn with(mut self, declared: impl Into<String>, runtime: impl Into<String>) -> Self {
        self.types.insert(declared.into(), runtime.into());
        self
    }
}

impl TypeQuery for FixedTypeOracle {
    fn query_type(
        &self,
        _query: &OracleQuery<'_>,
        call: &MethodRef,
        receiver: &AbstractValue,
    ) -> Result<Option<JvmType>> {
        let declared = receiver.ty.ty().class_name().and_then(|name| self.types.get(name));
        Ok(declared
            .or_else(|| self.types.get(&call.owner))
            .map(|runtime| JvmType::object(runtime.as_str())))
    }
}
