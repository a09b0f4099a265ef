//! Host environment: value model and event loop.

mod event_loop;
mod value;

pub use event_loop::{HostLoop, LoopHandle};
pub(crate) use event_loop::PendingGuard;
pub use value::{HostFault, HostFunction, HostObject, HostValue};
