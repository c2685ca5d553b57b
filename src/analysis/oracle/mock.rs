//! Guessing oracle for `Collection.stream()` receivers.

use crate::{
    analysis::{
        domain::AbstractValue,
        oracle::{OracleQuery, TypeQuery},
    },
    bytecode::{JvmType, MethodRef},
    Result,
};

/// Answers `stream` calls on collection interfaces with a representative concrete class.
///
/// This is unsound by nature: a `List` receiver is assumed to be an `ArrayList`. It
/// exists for experiments and tests where the real receiver classes are known to
/// match the guess.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockTypeOracle;

impl MockTypeOracle {
    fn representative(class: &str) -> Option<&str> {
        Some(match class {
            "java/util/ArrayList" | "java/util/List" | "java/util/Collection" => "java/util/ArrayList",
            "java/util/Set" => "java/util/HashSet",
            "java/util/SortedSet" | "java/util/NavigableSet" => "java/util/TreeSet",
            "java/util/Deque" | "java/util/Queue" => "java/util/ArrayDeque",
            "java/util/EnumSet" => "java/util/RegularEnumSet",
            "java/util/LinkedList"
            | "java/util/Vector"
            | "java/util/concurrent/DelayQueue"
            | "java/util/concurrent/ConcurrentLinkedDeque"
            | "java/util/concurrent/ConcurrentSkipListSet" => class,
            _ => return None,
        })
    }
}

impl TypeQuery for MockTypeOracle {
    fn query_type(
        &self,
        query: &OracleQuery<'_>,
        call: &MethodRef,
        receiver: &AbstractValue,
    ) -> Result<Option<JvmType>> {
        if call.name != "stream" {
            return Ok(None);
        }

        let owner = JvmType::object(call.owner.as_str());
        let receiver_type = receiver.ty.ty();
        let class = if receiver_type.is_reference() && query.ancestors(receiver_type)?.contains(&owner) {
            receiver_type.clone()
        } else {
            owner
        };

        if !query.ancestors(&class)?.contains(&JvmType::object("java/util/Collection")) {
            return Ok(None);
        }

        Ok(class
            .class_name()
            .and_then(Self::representative)
            .map(JvmType::object))
    }
}
