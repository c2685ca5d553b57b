//! An oracle assembled from three independent answerers.

use crate::{
    analysis::{
        domain::AbstractValue,
        oracle::{AllocationPolicy, CallPolicy, OracleQuery, TypeQuery},
    },
    bytecode::{JvmType, MethodRef},
    Result,
};

/// Routes each question to its own answerer.
///
/// ```rust
/// use fusescope::analysis::oracle::{
///     CombinedOracle, ExhaustiveOracle, MockTypeOracle, StreamLibraryOracle,
/// };
///
/// let oracle = CombinedOracle::new(
///     StreamLibraryOracle::default(),
///     ExhaustiveOracle,
///     MockTypeOracle,
/// );
/// ```
pub struct CombinedOracle {
    calls: Box<dyn CallPolicy>,
    allocations: Box<dyn AllocationPolicy>,
    types: Box<dyn TypeQuery>,
}

impl CombinedOracle {
    /// Creates a combined oracle.
    pub fn new(
        calls: impl CallPolicy + 'static,
        allocations: impl AllocationPolicy + 'static,
        types: impl TypeQuery + 'static,
    ) -> Self {
        CombinedOracle {
            calls: Box::new(calls),
            allocations: Box::new(allocations),
            types: Box::new(types),
        }
    }
}

impl CallPolicy for CombinedOracle {
    fn should_analyse_call(&self, query: &OracleQuery<'_>, call: &MethodRef) -> Result<bool> {
        self.calls.should_analyse_call(query, call)
    }
}

impl AllocationPolicy for CombinedOracle {
    fn should_track_allocation(&self, query: &OracleQuery<'_>, ty: &JvmType) -> Result<bool> {
        self.allocations.should_track_allocation(query, ty)
    }
}

impl TypeQuery for CombinedOracle {
    fn query_type(
        &self,
        query: &OracleQuery<'_>,
        call: &MethodRef,
        receiver: &AbstractValue,
    ) -> Result<Option<JvmType>> {
        self.types.query_type(query, call, receiver)
    }
}
