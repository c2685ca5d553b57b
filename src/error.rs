use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! precision_loss {
    ($call:expr, $msg:expr) => {
        crate::Error::PrecisionLoss {
            call: $call.to_string(),
            message: $msg.to_string(),
        }
    };

    ($call:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::PrecisionLoss {
            call: $call.to_string(),
            message: format!($fmt, $($arg)*),
        }
    };
}

pub(crate) use malformed_error;
pub(crate) use precision_loss;

/// The generic Error type, which covers every failure an analysis session can report.
///
/// Every variant aborts the session it was raised in, except [`Error::PrecisionLoss`]
/// which the call transfer function may absorb by summarising the call conservatively.
/// When a session fails, the only valid response is to leave the analysed method
/// unoptimised.
///
/// # Error Categories
///
/// ## Missing Metadata
/// - [`Error::ClassNotFound`] - The class provider has no entry for a class
/// - [`Error::MethodNotFound`] - Method lookup through the hierarchy failed
/// - [`Error::FieldNotFound`] - Field resolution failed
///
/// ## Analysis Limits
/// - [`Error::RecursionLimit`] - Context depth exceeded the configured bound
/// - [`Error::PrecisionLoss`] - A call could not be resolved or summarised soundly
///
/// ## Soundness Guards
/// - [`Error::TrackedEscape`] - Tracked cells escape the analysed method
/// - [`Error::InliningPrevented`] - A core pipeline call ended up denied for inlining
/// - [`Error::ObjectBanned`] - Stack allocation of every object was denied
///
/// ## Invariant Violations
/// - [`Error::InvalidPointer`] - Pointer operation on a non-cell pointer state
/// - [`Error::Malformed`] - Malformed bytecode or broken internal invariant
/// - [`Error::Unsupported`] - Construct the interpreter does not model
/// - [`Error::GraphError`] - Graph structure error
///
/// # Examples
///
/// ```rust
/// use fusescope::Error;
///
/// let err = Error::RecursionLimit(100);
/// assert!(err.is_abort());
/// assert_eq!(err.to_string(), "Recursion limit of 100 exceeded");
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Missing metadata
    /// The class provider has no metadata for the named class.
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// A method could not be found in the named class or any of its ancestors.
    #[error("Method not found: {owner}.{name}{desc}")]
    MethodNotFound {
        /// Class the lookup started from
        owner: String,
        /// Method name
        name: String,
        /// Method descriptor
        desc: String,
    },

    /// A field could not be resolved from the named class.
    #[error("Field not found: {owner}.{name}")]
    FieldNotFound {
        /// Class the resolution started from
        owner: String,
        /// Field name
        name: String,
    },

    // Analysis limits
    /// The call-string depth exceeded the configured bound.
    ///
    /// Either the analysed program recurses without a statically visible base case or
    /// the analysis is missing a model for some library routine. Both mean no safe
    /// result can be produced for this method.
    #[error("Recursion limit of {0} exceeded")]
    RecursionLimit(usize),

    /// A call could not be analysed precisely enough.
    ///
    /// Raised when the receiver type of a virtual call is unknown, or when a call has to
    /// be summarised but tracked heap cells are reachable from its arguments and no
    /// purity information allows a sound summary.
    ///
    /// # Fields
    ///
    /// * `call` - The call in `owner.name` form
    /// * `message` - What was lost
    #[error("Precision loss at {call}: {message}")]
    PrecisionLoss {
        /// The call that could not be handled
        call: String,
        /// Description of the failure
        message: String,
    },

    // Soundness guards
    /// Tracked heap cells escape the analysed method through a return, a throw or the
    /// heap state at exit.
    #[error("Tracked values escape: {0:?}")]
    TrackedEscape(Vec<usize>),

    /// Inlining of one of the pipeline's own core calls was denied.
    #[error("Inlining of {owner}.{method} is prevented")]
    InliningPrevented {
        /// Owner class of the denied context
        owner: String,
        /// Method name of the denied context
        method: String,
    },

    /// The decision graph denied stack allocation of any `java/lang/Object`.
    ///
    /// An imprecise pointer of type `Object` was accessed in a way that forbids every
    /// tracked allocation, which leaves nothing to optimise.
    #[error("Banning stack allocation of {0} denies every allocation")]
    ObjectBanned(String),

    // Invariant violations
    /// A pointer operation required a concrete heap cell but the pointer was in another
    /// state (`NULL`, `uTop`, `iTop`, `Top`) or the cell is not present in the heap.
    #[error("Invalid pointer state: {0}")]
    InvalidPointer(String),

    /// Malformed input or an internal invariant violation.
    ///
    /// The error includes the source location where it was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The interpreter does not model this instruction or construct.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Graph structure error.
    #[error("{0}")]
    GraphError(String),
}

impl Error {
    /// Returns `true` if this error can only abort a session.
    ///
    /// [`Error::PrecisionLoss`] is the single variant the driver may absorb locally
    /// (by over-approximating the call it was raised for).
    #[must_use]
    pub fn is_abort(&self) -> bool {
        !matches!(self, Error::PrecisionLoss { .. })
    }
}
