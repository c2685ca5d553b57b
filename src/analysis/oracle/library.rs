//! Heuristic oracle for stream-library pipelines.

use crate::{
    analysis::{
        domain::AbstractValue,
        oracle::{AllocationPolicy, CallPolicy, OracleQuery, TypeQuery},
    },
    bytecode::{JvmType, MethodRef},
    Result,
};

const SPLITERATOR: &str = "java/util/Spliterator";
const ITERATOR: &str = "java/util/Iterator";
const ITERATOR_SPLITERATOR: &str = "java/util/Spliterators$IteratorSpliterator";
const LAMBDA_MODEL: &str = "LambdaModel$";

/// Analyses and tracks what belongs to the stream library and leaves user code alone.
///
/// Allocations are tracked when they are library classes or spliterators, iterators
/// created inside an iterator-backed spliterator, or closure objects created by the
/// library. Calls are analysed when they return a library type or a spliterator, when
/// they are made from inside the library, or when they hit one of a few cheap utility
/// methods that preserve type precision (`java/util/Objects`, `iterator`,
/// `checkFromToBounds`).
#[derive(Debug, Clone)]
pub struct StreamLibraryOracle {
    prefixes: Vec<String>,
}

impl StreamLibraryOracle {
    /// Creates an oracle treating classes under the given prefixes as library code.
    #[must_use]
    pub fn new(prefixes: Vec<String>) -> Self {
        StreamLibraryOracle { prefixes }
    }

    fn is_library_class(&self, name: &str) -> bool {
        self.prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
    }

    fn is_library_type(&self, ty: &JvmType) -> bool {
        ty.class_name().is_some_and(|name| self.is_library_class(name))
    }
}

impl Default for StreamLibraryOracle {
    fn default() -> Self {
        Self::new(vec!["java/util/stream/".to_string()])
    }
}

impl AllocationPolicy for StreamLibraryOracle {
    fn should_track_allocation(&self, query: &OracleQuery<'_>, ty: &JvmType) -> Result<bool> {
        let ancestors = query.ancestors(ty)?;
        if self.is_library_type(ty) || ancestors.contains(&JvmType::object(SPLITERATOR)) {
            return Ok(true);
        }

        let parent = query.parent();
        if let Some(parent) = parent {
            if ancestors.contains(&JvmType::object(ITERATOR)) && parent.owner() == ITERATOR_SPLITERATOR {
                return Ok(true);
            }
        }

        let is_closure = ty.class_name().is_some_and(|name| name.contains(LAMBDA_MODEL));
        Ok(is_closure && parent.is_some_and(|parent| self.is_library_class(parent.owner())))
    }
}

impl CallPolicy for StreamLibraryOracle {
    fn should_analyse_call(&self, query: &OracleQuery<'_>, call: &MethodRef) -> Result<bool> {
        let return_type = crate::bytecode::MethodDescriptor::parse(&call.desc)?.return_type;
        let ancestors = query.ancestors(&return_type)?;

        if ancestors.contains(&JvmType::object(SPLITERATOR))
            || ancestors.iter().any(|ty| self.is_library_type(ty))
        {
            return Ok(true);
        }

        let closure_called_by_library = query.owner().contains(LAMBDA_MODEL)
            && query
                .parent()
                .is_some_and(|parent| self.is_library_class(parent.owner()));

        Ok(call.name == "checkFromToBounds"
            || call.owner == "java/util/stream/StreamOpFlag"
            || call.name == "iterator"
            || call.owner.contains(LAMBDA_MODEL)
            || closure_called_by_library
            || call.owner == "java/util/Objects"
            || self.is_library_class(query.owner()))
    }
}

impl TypeQuery for StreamLibraryOracle {
    fn query_type(
        &self,
        _query: &OracleQuery<'_>,
        _call: &MethodRef,
        _receiver: &AbstractValue,
    ) -> Result<Option<JvmType>> {
        Ok(None)
    }
}
