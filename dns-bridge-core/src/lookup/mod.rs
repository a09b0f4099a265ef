//! Request issuance and completion delivery.

mod bridge;
mod tracker;

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::context::ContextShared;

pub(crate) use bridge::PendingCallback;
pub(crate) use tracker::{cancel, cancel_id, issue};

/// Which engine entry point a lookup goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Name plus record type
    Query { rrtype: u16 },
    Address,
    /// Reverse lookup; the name is an address literal
    Hostname,
    Service,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query { rrtype } => write!(f, "query (type {rrtype})"),
            Self::Address => f.write_str("address lookup"),
            Self::Hostname => f.write_str("hostname lookup"),
            Self::Service => f.write_str("service lookup"),
        }
    }
}

/// Counted strong reference to a context, held by each pending callback.
pub(crate) struct ContextRef {
    shared: Arc<ContextShared>,
}

impl ContextRef {
    pub(crate) fn new(shared: &Arc<ContextShared>) -> Self {
        shared.outstanding.fetch_add(1, Ordering::SeqCst);
        Self {
            shared: Arc::clone(shared),
        }
    }
}

impl Drop for ContextRef {
    fn drop(&mut self) {
        self.shared.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}
