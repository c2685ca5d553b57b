//! The oracle that never limits the analysis.

use crate::{
    analysis::{
        domain::AbstractValue,
        oracle::{AllocationPolicy, CallPolicy, OracleQuery, TypeQuery},
    },
    bytecode::{JvmType, MethodRef},
    Result,
};

/// Analyses every call, tracks every allocation and never answers type queries.
///
/// This is the most precise policy and the most expensive one. Static initializers are
/// always run under it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExhaustiveOracle;

impl CallPolicy for ExhaustiveOracle {
    fn should_analyse_call(&self, _query: &OracleQuery<'_>, _call: &MethodRef) -> Result<bool> {
        Ok(true)
    }
}

impl AllocationPolicy for ExhaustiveOracle {
    fn should_track_allocation(&self, _query: &OracleQuery<'_>, _ty: &JvmType) -> Result<bool> {
        Ok(true)
    }
}

impl TypeQuery for ExhaustiveOracle {
    fn query_type(
        &self,
        _query: &OracleQuery<'_>,
        _call: &MethodRef,
        _receiver: &AbstractValue,
    ) -> Result<Option<JvmType>> {
        Ok(None)
    }
}
