//! Finite models for library methods whose natural form walks a runtime-length chain.
//!
//! `AbstractPipeline.wrapSink` and `AbstractPipeline.copyIntoWithCancel` loop over the
//! `previousStage` links of a pipeline. The interpreter cannot bound that loop, but the
//! number of stages is usually visible in the abstract heap. Given that number, the
//! generators here produce an equivalent body with the loop unrolled.
//!
//! A model is registered for an owner and method name together with the source of
//! its integer parameter, which is read off the call's arguments and the caller's heap
//! when the call is resolved. The built-in models take the chain length from
//! [`chain_length`]. Generated bodies are cached per `(owner, name, parameter)`.

use std::{collections::HashMap, fmt, sync::Arc};

use log::warn;

use crate::{
    analysis::{
        domain::{AbstractValue, FlatElement},
        heap::{FieldKey, Heap},
    },
    bytecode::{JvmType, MethodAssembler, MethodBody, Opcode},
    error::malformed_error,
    Result,
};

/// Internal name of the pipeline stage base class.
pub const ABSTRACT_PIPELINE: &str = "java/util/stream/AbstractPipeline";

const SINK: &str = "java/util/stream/Sink";
const SPLITERATOR: &str = "java/util/Spliterator";
const PIPELINE_DESC: &str = "Ljava/util/stream/AbstractPipeline;";

/// Builds a model body from its parameter and the declaration being replaced.
pub type ModelGenerator = Box<dyn Fn(usize, &MethodBody) -> Result<MethodBody>>;

/// Reads a model's parameter from the call's arguments, receiver first, and the heap
/// at the call.
pub type ModelParameter = Box<dyn Fn(&[AbstractValue], &Heap) -> Result<usize>>;

struct Model {
    parameter: ModelParameter,
    generator: ModelGenerator,
}

/// Registered model generators and the bodies generated so far.
///
/// # Examples
///
/// ```rust
/// use fusescope::analysis::ModelRegistry;
/// use fusescope::bytecode::{AccessFlags, MethodAssembler, MethodBody, Opcode};
///
/// let mut models = ModelRegistry::default();
/// let declared = MethodBody::declaration(
///     "wrapSink",
///     "(Ljava/util/stream/Sink;)Ljava/util/stream/Sink;",
///     AccessFlags::FINAL,
/// );
/// let model = models.model("java/util/stream/AbstractPipeline", &declared, 2)?;
/// assert_eq!(model.name, "wrapSink");
///
/// // A constant model that ignores its parameter.
/// models.register(
///     "demo/Clock",
///     "now",
///     |_, _| Ok(0),
///     |_, declared| {
///         let mut asm = MethodAssembler::new(declared.name.as_str(), declared.desc.as_str(), declared.access);
///         asm.iconst(0)?.insn(Opcode::Ireturn)?;
///         asm.finalize()
///     },
/// );
/// assert!(models.has_model("demo/Clock", "now"));
/// # Ok::<(), fusescope::Error>(())
/// ```
pub struct ModelRegistry {
    models: HashMap<(String, String), Model>,
    cache: HashMap<(String, String, usize), Arc<MethodBody>>,
}

impl ModelRegistry {
    /// Creates a registry without any generators.
    #[must_use]
    pub fn empty() -> Self {
        ModelRegistry {
            models: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    /// Registers (or replaces) the model of `owner.name`. Calls resolving to that method
    /// run the body `generator` builds from the value `parameter` reads at the call.
    pub fn register(
        &mut self,
        owner: impl Into<String>,
        name: impl Into<String>,
        parameter: impl Fn(&[AbstractValue], &Heap) -> Result<usize> + 'static,
        generator: impl Fn(usize, &MethodBody) -> Result<MethodBody> + 'static,
    ) -> &mut Self {
        let key = (owner.into(), name.into());
        self.cache
            .retain(|(owner, name, _), _| *owner != key.0 || *name != key.1);
        self.models.insert(
            key,
            Model {
                parameter: Box::new(parameter),
                generator: Box::new(generator),
            },
        );
        self
    }

    /// Returns `true` if a model is registered for `owner.name`.
    #[must_use]
    pub fn has_model(&self, owner: &str, name: &str) -> bool {
        self.models
            .contains_key(&(owner.to_string(), name.to_string()))
    }

    /// Reads the parameter of the model of `owner.name` for a call with `arguments`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if no model is registered for the method, or
    /// whatever the parameter source reports.
    pub fn parameter(&self, owner: &str, name: &str, arguments: &[AbstractValue], heap: &Heap) -> Result<usize> {
        let model = self
            .models
            .get(&(owner.to_string(), name.to_string()))
            .ok_or_else(|| malformed_error!("No model for {}.{}", owner, name))?;
        (model.parameter)(arguments, heap)
    }

    /// Returns the model of `declared` (a method of `owner`) for parameter `depth`,
    /// generating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if no generator is registered for the method,
    /// or the generator fails.
    pub fn model(
        &mut self,
        owner: &str,
        declared: &MethodBody,
        depth: usize,
    ) -> Result<Arc<MethodBody>> {
        let key = (owner.to_string(), declared.name.clone(), depth);
        if let Some(body) = self.cache.get(&key) {
            return Ok(Arc::clone(body));
        }

        let model = self
            .models
            .get(&(key.0.clone(), key.1.clone()))
            .ok_or_else(|| malformed_error!("No model for {}.{}", owner, declared.name))?;
        let body = Arc::new((model.generator)(depth, declared)?);
        self.cache.insert(key, Arc::clone(&body));
        Ok(body)
    }

    /// Number of cached bodies.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Drops all cached bodies.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

impl Default for ModelRegistry {
    /// A registry with the `wrapSink` and `copyIntoWithCancel` models.
    fn default() -> Self {
        let mut registry = ModelRegistry::empty();
        registry
            .register(ABSTRACT_PIPELINE, "wrapSink", chain_length, wrap_sink_model)
            .register(
                ABSTRACT_PIPELINE,
                "copyIntoWithCancel",
                chain_length,
                copy_into_with_cancel_model,
            );
        registry
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut models: Vec<_> = self
            .models
            .keys()
            .map(|(owner, name)| format!("{owner}.{name}"))
            .collect();
        models.sort();
        f.debug_struct("ModelRegistry")
            .field("models", &models)
            .field("cached", &self.cache.len())
            .finish()
    }
}

/// Number of stages before the pipeline stage the receiver points to.
///
/// This is the constant value of the stage's `depth` field. Without one, the
/// `previousStage` links are followed until `null`.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidPointer`] if the receiver or a link is not a single
/// cell, and [`crate::Error::Malformed`] for a negative depth or a cyclic chain.
pub fn chain_length(arguments: &[AbstractValue], heap: &Heap) -> Result<usize> {
    let receiver = arguments
        .first()
        .ok_or_else(|| malformed_error!("Pipeline call without receiver"))?;
    let mut node = receiver.points_to()?;
    let depth_key = FieldKey::new(ABSTRACT_PIPELINE, "depth");
    if let FlatElement::Value(depth) = heap.get_field(node, &depth_key, AbstractValue::top()).constant {
        return usize::try_from(depth.as_int())
            .map_err(|_| malformed_error!("Negative pipeline depth {}", depth));
    }

    warn!("Depth of pipeline stage {node} is not a constant, counting previous stages instead");
    let previous_key = FieldKey::new(ABSTRACT_PIPELINE, "previousStage");
    let mut depth = 0;
    loop {
        let previous = heap.get_field(node, &previous_key, AbstractValue::top());
        if previous.is_null() {
            return Ok(depth);
        }
        node = previous.points_to()?;
        depth += 1;
        if depth > heap.len() {
            return Err(malformed_error!("Pipeline stage {} links back to itself", node));
        }
    }
}

/// `wrapSink` with the stage loop unrolled `depth` times.
///
/// Locals: 0 `this`, 1 `sink`, 2 the current stage.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the body fails to assemble.
pub fn wrap_sink_model(depth: usize, declared: &MethodBody) -> Result<MethodBody> {
    let mut asm = MethodAssembler::new(declared.name.as_str(), declared.desc.as_str(), declared.access);
    asm.load(Opcode::Aload, 1)?
        .invoke(
            Opcode::Invokestatic,
            "java/util/Objects",
            "requireNonNull",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
        )?
        .insn(Opcode::Pop)?
        .load(Opcode::Aload, 0)?
        .store(Opcode::Astore, 2)?;

    for _ in 0..depth {
        asm.load(Opcode::Aload, 2)?
            .load(Opcode::Aload, 2)?
            .field(Opcode::Getfield, ABSTRACT_PIPELINE, "previousStage", PIPELINE_DESC)?
            .field(Opcode::Getfield, ABSTRACT_PIPELINE, "combinedFlags", "I")?
            .load(Opcode::Aload, 1)?
            .invoke(
                Opcode::Invokevirtual,
                ABSTRACT_PIPELINE,
                "opWrapSink",
                "(ILjava/util/stream/Sink;)Ljava/util/stream/Sink;",
            )?
            .store(Opcode::Astore, 1)?
            .load(Opcode::Aload, 2)?
            .field(Opcode::Getfield, ABSTRACT_PIPELINE, "previousStage", PIPELINE_DESC)?
            .store(Opcode::Astore, 2)?;
    }

    asm.load(Opcode::Aload, 1)?.insn(Opcode::Areturn)?;
    asm.finalize()
}

/// `copyIntoWithCancel` on the source stage `depth` links up the chain.
///
/// Locals: 0 `this`, 1 `sink`, 2 `spliterator`, 3 the source stage, 4 the cancellation
/// flag. Declarations returning `void` get a body that ignores the flag.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the declaration's descriptor is invalid or the
/// body fails to assemble.
pub fn copy_into_with_cancel_model(depth: usize, declared: &MethodBody) -> Result<MethodBody> {
    let returns_flag = declared.descriptor()?.return_type != JvmType::Void;
    let mut asm = MethodAssembler::new(declared.name.as_str(), declared.desc.as_str(), declared.access);

    asm.load(Opcode::Aload, 0)?.store(Opcode::Astore, 3)?.load(Opcode::Aload, 3)?;
    for _ in 0..depth {
        asm.field(Opcode::Getfield, ABSTRACT_PIPELINE, "previousStage", PIPELINE_DESC)?;
    }
    asm.store(Opcode::Astore, 3)?;

    asm.load(Opcode::Aload, 1)?
        .load(Opcode::Aload, 2)?
        .invoke(Opcode::Invokeinterface, SPLITERATOR, "getExactSizeIfKnown", "()J")?
        .invoke(Opcode::Invokeinterface, SINK, "begin", "(J)V")?
        .load(Opcode::Aload, 3)?
        .load(Opcode::Aload, 2)?
        .load(Opcode::Aload, 1)?;

    if returns_flag {
        asm.invoke(
            Opcode::Invokevirtual,
            ABSTRACT_PIPELINE,
            "forEachWithCancel",
            "(Ljava/util/Spliterator;Ljava/util/stream/Sink;)Z",
        )?
        .store(Opcode::Istore, 4)?
        .load(Opcode::Aload, 1)?
        .invoke(Opcode::Invokeinterface, SINK, "end", "()V")?
        .load(Opcode::Iload, 4)?
        .insn(Opcode::Ireturn)?;
    } else {
        asm.invoke(
            Opcode::Invokevirtual,
            ABSTRACT_PIPELINE,
            "forEachWithCancel",
            "(Ljava/util/Spliterator;Ljava/util/stream/Sink;)V",
        )?
        .load(Opcode::Aload, 1)?
        .invoke(Opcode::Invokeinterface, SINK, "end", "()V")?
        .insn(Opcode::Return)?;
    }
    asm.finalize()
}
