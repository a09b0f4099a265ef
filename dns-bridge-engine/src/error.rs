//! Engine return codes as a unified error type.

use thiserror::Error;

/// Non-success return codes reported by a resolution engine.
///
/// The numeric values are part of the host-visible contract: they travel to
/// callbacks as the `code` field of error objects.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineError {
    /// Generic failure
    #[error("generic engine error")]
    Generic,

    /// Name could not be parsed as a domain name
    #[error("bad domain name")]
    BadDomainName,

    /// Context is unusable (destroyed or never created)
    #[error("bad context")]
    BadContext,

    /// Context setting could not be applied
    #[error("context update failed")]
    ContextUpdateFail,

    /// Transaction id is not known to the context
    #[error("unknown transaction")]
    UnknownTransaction,

    /// List index out of range
    #[error("no such list item")]
    NoSuchListItem,

    /// Dictionary key not present
    #[error("no such dict name")]
    NoSuchDictName,

    /// Item held a different type than requested
    #[error("wrong type requested")]
    WrongTypeRequested,

    /// Unknown extension name
    #[error("no such extension")]
    NoSuchExtension,

    /// Extension value has the wrong shape
    #[error("extension misformat")]
    ExtensionMisformat,

    /// DNSSEC requested in a mode that cannot honor it
    #[error("DNSSEC with stub resolution disallowed")]
    DnssecWithStubDisallowed,

    /// Allocation failure
    #[error("memory error")]
    Memory,

    /// Parameter out of range or malformed
    #[error("invalid parameter")]
    InvalidParameter,

    /// Setting or request not supported by this engine
    #[error("not implemented")]
    NotImplemented,
}

impl EngineError {
    /// Numeric return code of this error.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Generic => 1,
            Self::BadDomainName => 300,
            Self::BadContext => 301,
            Self::ContextUpdateFail => 302,
            Self::UnknownTransaction => 303,
            Self::NoSuchListItem => 304,
            Self::NoSuchDictName => 305,
            Self::WrongTypeRequested => 306,
            Self::NoSuchExtension => 307,
            Self::ExtensionMisformat => 308,
            Self::DnssecWithStubDisallowed => 309,
            Self::Memory => 310,
            Self::InvalidParameter => 311,
            Self::NotImplemented => 312,
        }
    }

    /// Map a numeric return code back to an error. `0` (good) and unknown
    /// codes yield `None`.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::Generic,
            300 => Self::BadDomainName,
            301 => Self::BadContext,
            302 => Self::ContextUpdateFail,
            303 => Self::UnknownTransaction,
            304 => Self::NoSuchListItem,
            305 => Self::NoSuchDictName,
            306 => Self::WrongTypeRequested,
            307 => Self::NoSuchExtension,
            308 => Self::ExtensionMisformat,
            309 => Self::DnssecWithStubDisallowed,
            310 => Self::Memory,
            311 => Self::InvalidParameter,
            312 => Self::NotImplemented,
            _ => return None,
        })
    }
}

/// Engine Result type alias
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::EngineError;

    #[test]
    fn test_codes_round_trip() {
        for code in (300..=312).chain([1]) {
            let err = EngineError::from_code(code);
            assert_eq!(err.map(EngineError::code), Some(code));
        }
    }

    #[test]
    fn test_good_is_not_an_error() {
        assert_eq!(EngineError::from_code(0), None);
        assert_eq!(EngineError::from_code(299), None);
    }
}
