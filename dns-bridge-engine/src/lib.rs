//! Resolution engine contract for dns-bridge
//!
//! Defines what the binding layer needs from a DNS resolution engine:
//! - Structured values ([`Item`], [`Dict`]) exchanged with the engine
//! - Numeric enumerations and return codes ([`EngineError`])
//! - Contexts, completion handlers and host event-loop attachment
//!
//! The `hickory` feature (on by default) provides [`HickoryEngine`], a stub
//! resolver built on hickory-resolver. The `testing` feature provides an
//! in-memory engine for downstream tests.

mod error;
#[cfg(feature = "hickory")]
mod hickory;
mod item;
#[cfg(feature = "testing")]
pub mod testing;
mod traits;
mod types;

pub use error::{EngineError, EngineResult};
#[cfg(feature = "hickory")]
pub use hickory::{HickoryContext, HickoryEngine};
pub use item::{Dict, Endpoint, Item, ADDRESS_DATA, ADDRESS_TYPE, PORT};
pub use traits::{
    CompletionHandler, EngineContext, EventSink, Rejected, ResolutionEngine, Submission, Task,
};
pub use types::{
    CallbackKind, DnssecStatus, ExtensionFlag, Request, ResolutionType, Response,
    ResponseStatus, TransactionId, Transport, NAMETYPE_DNS,
};
