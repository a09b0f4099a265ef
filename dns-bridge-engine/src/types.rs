//! Numeric enumerations, transaction ids and the response resource.

use std::fmt;

use crate::error::{EngineError, EngineResult};
use crate::item::Dict;

macro_rules! numeric_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Numeric code understood by the engine.
            #[must_use]
            pub const fn code(self) -> u32 {
                match self {
                    $( Self::$variant => $code, )+
                }
            }
        }

        impl TryFrom<u32> for $name {
            type Error = EngineError;

            fn try_from(code: u32) -> EngineResult<Self> {
                match code {
                    $( $code => Ok(Self::$variant), )+
                    _ => Err(EngineError::InvalidParameter),
                }
            }
        }
    };
}

numeric_enum! {
    /// How the engine answers queries.
    pub enum ResolutionType {
        /// Forward every query to the configured upstreams
        Stub = 520,
        /// Iterate from the root
        Recursing = 521,
    }
}

numeric_enum! {
    /// Transport selection for upstream traffic.
    pub enum Transport {
        UdpFirstAndFallBackToTcp = 540,
        UdpOnly = 541,
        TcpOnly = 542,
        TcpOnlyKeepConnectionsOpen = 543,
        TlsOnlyKeepConnectionsOpen = 544,
        TlsFirstAndFallBackToTcpKeepConnectionsOpen = 545,
    }
}

numeric_enum! {
    /// Why a completion handler fired.
    pub enum CallbackKind {
        /// Request finished and a response is attached
        Complete = 700,
        /// Request was cancelled (explicitly or by destroying the context)
        Cancel = 701,
        /// No answer arrived within the configured timeout
        Timeout = 702,
        /// Request failed for any other reason
        Error = 703,
    }
}

numeric_enum! {
    /// Boolean values inside extension dictionaries.
    pub enum ExtensionFlag {
        True = 1000,
        False = 1001,
    }
}

numeric_enum! {
    /// Overall status of a completed response.
    pub enum ResponseStatus {
        Good = 900,
        NoName = 901,
        AllTimeout = 902,
        NoSecureAnswers = 903,
    }
}

numeric_enum! {
    /// Per-reply DNSSEC classification.
    pub enum DnssecStatus {
        Secure = 400,
        Bogus = 401,
        Indeterminate = 402,
        Insecure = 403,
    }
}

/// `answer_type` value for answers obtained through DNS.
pub const NAMETYPE_DNS: u32 = 800;

impl From<bool> for ExtensionFlag {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

/// Engine-assigned identifier of one outstanding request.
///
/// At the host boundary the id travels as an 8-byte buffer holding the
/// native-endian representation of the 64-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Size of the host-visible form.
    pub const LEN: usize = 8;

    #[must_use]
    pub const fn to_bytes(self) -> [u8; Self::LEN] {
        self.0.to_ne_bytes()
    }

    /// Rebuild an id from its host-visible form. Any length other than
    /// [`Self::LEN`] is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; Self::LEN] = bytes.try_into().ok()?;
        Some(Self(u64::from_ne_bytes(raw)))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// A request as submitted to an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Arbitrary name + record type
    Query { name: String, rrtype: u16 },
    /// A and AAAA for a name
    Address { name: String },
    /// Reverse lookup of an endpoint dictionary
    Hostname { address: Dict },
    /// SRV lookup for a service name
    Service { name: String },
}

impl Request {
    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query",
            Self::Address { .. } => "address",
            Self::Hostname { .. } => "hostname",
            Self::Service { .. } => "service",
        }
    }
}

/// Engine-owned response handed to a completion handler.
///
/// The engine resource is released when the value is dropped, on every exit
/// path of the handler.
pub struct Response {
    dict: Dict,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Response {
    #[must_use]
    pub fn new(dict: Dict) -> Self {
        Self {
            dict,
            release: None,
        }
    }

    /// Attach a hook the engine uses to reclaim the resource.
    #[must_use]
    pub fn with_release_hook(dict: Dict, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            dict,
            release: Some(Box::new(release)),
        }
    }

    pub fn dict(&self) -> &Dict {
        &self.dict
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("dict", &self.dict)
            .field("release", &self.release.is_some())
            .finish()
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}
