//! DNS Bridge Core Library
//!
//! Exposes an asynchronous DNS resolution engine to a scripting host:
//! - Context lifecycle and option dispatch ([`Context`], [`OptionRegistry`])
//! - Lookup issuance, cancellation and exactly-once callback delivery
//! - Conversion between engine items and host values ([`convert`])
//!
//! The engine itself sits behind the traits of `dns-bridge-engine`; with the
//! `hickory` feature (on by default) a hickory-resolver engine is re-exported.

pub mod config;
mod context;
pub mod convert;
pub mod error;
pub mod host;
mod lookup;
pub mod options;

pub use config::{ContextOptions, Upstream};
pub use context::Context;
pub use error::{BindingError, BindingResult};
pub use host::{HostFault, HostFunction, HostLoop, HostValue};
pub use lookup::RequestKind;
pub use options::{ContextOption, OptionRegistry};

// Engine types that show up in this crate's API
pub use dns_bridge_engine::{
    CallbackKind, DnssecStatus, EngineError, ExtensionFlag, ResolutionEngine, ResolutionType,
    ResponseStatus, TransactionId, Transport,
};
#[cfg(feature = "hickory")]
pub use dns_bridge_engine::HickoryEngine;
