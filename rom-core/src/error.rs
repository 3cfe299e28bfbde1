use thiserror::Error;

/// The error taxonomy of the object model, without the message payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A module would become its own ancestor.
    CyclicInclude,
    /// A structural or variable mutation was attempted on a frozen module or object.
    FrozenViolation,
    /// A mutation was attempted below the caller's minimum trust level.
    SecurityViolation,
    /// Dispatch found no method and the `method_missing` fallback gave up.
    UndefinedMethod,
    /// An invalid or unresolvable variable, constant or method name.
    NameError,
    /// A value of the wrong kind was given (eg. including a class).
    TypeError,
    /// A primitive was called with the wrong arguments.
    ArgumentError,
}

/// An error raised synchronously by an object model operation.
///
/// The calling layer is expected to turn these into language-level exceptions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// A module would become its own ancestor.
    #[error("cyclic include detected: {module} cannot include itself")]
    CyclicInclude {
        /// The module whose ancestry would have become cyclic.
        module: String,
    },
    /// A mutation was attempted on something frozen.
    #[error("can't modify frozen {what}")]
    Frozen {
        /// What was frozen (eg. `class/module`, `object Foo`).
        what: String,
    },
    /// A mutation was attempted at a too high safe level.
    #[error("Insecure: {operation}")]
    Security {
        /// The refused operation.
        operation: String,
    },
    /// No method was found, even after trying `method_missing`.
    #[error("{reason} method '{name}' called for {receiver}")]
    UndefinedMethod {
        /// The method name that was sent.
        name: String,
        /// Why the method could not be called (`undefined`, `private`, `protected`).
        reason: &'static str,
        /// A description of the receiver.
        receiver: String,
    },
    /// An invalid or unresolvable name.
    #[error("{0}")]
    Name(String),
    /// A value of the wrong kind.
    #[error("{0}")]
    Type(String),
    /// Wrong arguments to a primitive.
    #[error("{0}")]
    Argument(String),
}

impl RuntimeError {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CyclicInclude { .. } => ErrorKind::CyclicInclude,
            Self::Frozen { .. } => ErrorKind::FrozenViolation,
            Self::Security { .. } => ErrorKind::SecurityViolation,
            Self::UndefinedMethod { .. } => ErrorKind::UndefinedMethod,
            Self::Name(_) => ErrorKind::NameError,
            Self::Type(_) => ErrorKind::TypeError,
            Self::Argument(_) => ErrorKind::ArgumentError,
        }
    }

    pub fn frozen(what: impl Into<String>) -> Self {
        Self::Frozen { what: what.into() }
    }

    pub fn insecure(operation: impl Into<String>) -> Self {
        Self::Security {
            operation: operation.into(),
        }
    }
}

/// The result of a fallible object model operation.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
