//! Unified error type definition

use dns_bridge_engine::{CallbackKind, EngineError};
use thiserror::Error;

use crate::host::{HostFault, HostValue};

/// Binding layer error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    /// Wrong arity or argument kind at the call boundary (host `TypeError`)
    #[error("{0}")]
    Argument(String),

    /// Operation on a destroyed or never-created context
    #[error("Context is invalid")]
    ContextInvalid,

    /// Engine refused the request at submission time
    #[error("Error issuing query")]
    Issuance { code: u32 },

    /// Engine completed the request with a non-success kind
    #[error("Lookup failed.")]
    Completion { kind: CallbackKind },

    /// Malformed endpoint or list shape while applying an option (host `TypeError`)
    #[error("{0}")]
    Conversion(String),

    /// Engine could not create a context
    #[error("Unable to create context.")]
    ContextCreate(EngineError),

    /// Context could not be attached to the host loop
    #[error("Unable to attach to the host loop.")]
    Attach(EngineError),

    /// Configuration document could not be read
    #[error("Configuration error: {0}")]
    Config(String),

    /// A host callback raised a fault
    #[error("{0}")]
    HostFault(#[from] HostFault),
}

impl BindingError {
    /// Numeric code carried by the host-visible error object.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Argument(_) | Self::Conversion(_) | Self::Config(_) => {
                EngineError::InvalidParameter.code()
            }
            Self::ContextInvalid | Self::HostFault(_) => EngineError::Generic.code(),
            Self::Issuance { code } => *code,
            Self::Completion { kind } => kind.code(),
            Self::ContextCreate(e) | Self::Attach(e) => e.code(),
        }
    }

    /// Whether the host sees this error as a `TypeError`.
    #[must_use]
    pub const fn is_type_error(&self) -> bool {
        matches!(self, Self::Argument(_) | Self::Conversion(_))
    }

    /// Error object handed to host callbacks: `{ msg, code }`.
    #[must_use]
    pub fn to_host_value(&self) -> HostValue {
        HostValue::object([
            ("msg", HostValue::from(self.to_string())),
            ("code", HostValue::from(self.code())),
        ])
    }

    /// Whether it is expected behavior (caller input, remote failure) is used for log classification.
    ///
    /// Level `warn` should be used when returning `true` and level `error` when returning `false`.
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        match self {
            Self::Argument(_)
            | Self::ContextInvalid
            | Self::Issuance { .. }
            | Self::Completion { .. }
            | Self::Conversion(_)
            | Self::Config(_) => true,
            Self::ContextCreate(_) | Self::Attach(_) | Self::HostFault(_) => false,
        }
    }
}

impl From<serde_json::Error> for BindingError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Binding layer Result type alias
pub type BindingResult<T> = std::result::Result<T, BindingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_error_object() {
        let err = BindingError::Completion {
            kind: CallbackKind::Timeout,
        };
        let obj = err.to_host_value();
        assert_eq!(obj.get("msg"), Some(&HostValue::from("Lookup failed.")));
        assert_eq!(obj.get("code"), Some(&HostValue::Number(702.0)));
    }

    #[test]
    fn test_codes() {
        assert_eq!(BindingError::ContextInvalid.code(), 1);
        assert_eq!(
            BindingError::Argument("Second argument must be a number".into()).code(),
            311
        );
        assert_eq!(BindingError::Issuance { code: 300 }.code(), 300);
        assert_eq!(BindingError::Attach(EngineError::Memory).code(), 310);
    }

    #[test]
    fn test_classification() {
        assert!(BindingError::Conversion("x".into()).is_type_error());
        assert!(!BindingError::ContextInvalid.is_type_error());
        assert!(BindingError::ContextInvalid.is_expected());
        assert!(!BindingError::HostFault(HostFault::new("boom")).is_expected());
    }
}
