//! The contract every resolution engine fulfils.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::error::{EngineError, EngineResult};
use crate::item::{Dict, Item};
use crate::types::{CallbackKind, ResolutionType, Response, TransactionId, Transport};

/// Unit of work run on the host execution thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Channel into the host event loop.
///
/// An attached context posts every completion here instead of running it on
/// its own worker threads.
#[derive(Clone)]
pub struct EventSink {
    tx: UnboundedSender<Task>,
}

impl EventSink {
    #[must_use]
    pub const fn new(tx: UnboundedSender<Task>) -> Self {
        Self { tx }
    }

    /// Queue a task. Returns the task back when the loop is gone.
    pub fn post(&self, task: Task) -> Result<(), Task> {
        self.tx.send(task).map_err(|e| e.0)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Receives the outcome of exactly one request.
///
/// Both methods consume the handler: whichever runs first is the only one
/// that ever runs.
pub trait CompletionHandler: Send {
    /// Called by the engine once the request has finished, failed, timed out
    /// or been cancelled.
    fn complete(
        self: Box<Self>,
        kind: CallbackKind,
        response: Option<Response>,
        transaction: TransactionId,
    );

    /// Called by the submitter when the engine refused the request, so no
    /// transaction exists.
    fn abandon(self: Box<Self>, error: EngineError);
}

/// A request the engine refused at submission time. The handler is returned
/// untouched so its owner can release it.
pub struct Rejected {
    pub error: EngineError,
    pub handler: Box<dyn CompletionHandler>,
}

impl Rejected {
    #[must_use]
    pub fn new(error: EngineError, handler: Box<dyn CompletionHandler>) -> Self {
        Self { error, handler }
    }
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Result of submitting a request.
pub type Submission = std::result::Result<TransactionId, Rejected>;

/// Resolution state owned by an engine.
pub trait EngineContext: Send + Sync {
    fn set_resolution_type(&self, value: ResolutionType) -> EngineResult<()>;

    fn set_dns_transport(&self, value: Transport) -> EngineResult<()>;

    /// Per-query timeout in milliseconds.
    fn set_timeout(&self, millis: u64) -> EngineResult<()>;

    /// Maximum number of concurrently running requests; `0` lifts the limit.
    fn set_limit_outstanding_queries(&self, limit: u16) -> EngineResult<()>;

    fn set_use_threads(&self, enabled: bool) -> EngineResult<()>;

    fn set_return_dnssec_status(&self, enabled: bool) -> EngineResult<()>;

    fn set_edns_extended_rcode(&self, value: u8) -> EngineResult<()>;

    fn set_edns_version(&self, value: u8) -> EngineResult<()>;

    fn set_edns_do_bit(&self, value: u8) -> EngineResult<()>;

    fn set_edns_maximum_udp_payload_size(&self, value: u16) -> EngineResult<()>;

    /// Replace the upstream list. Each item is an endpoint dictionary; the
    /// list is installed as a whole or not at all.
    fn set_upstream_recursive_servers(&self, upstreams: &[Item]) -> EngineResult<()>;

    /// Route completions through the host event loop.
    fn attach(&self, sink: EventSink) -> EngineResult<()>;

    fn issue_query(
        &self,
        name: &str,
        rrtype: u16,
        extension: Option<Dict>,
        handler: Box<dyn CompletionHandler>,
    ) -> Submission;

    fn issue_address_lookup(
        &self,
        name: &str,
        extension: Option<Dict>,
        handler: Box<dyn CompletionHandler>,
    ) -> Submission;

    fn issue_hostname_lookup(
        &self,
        address: &Dict,
        extension: Option<Dict>,
        handler: Box<dyn CompletionHandler>,
    ) -> Submission;

    fn issue_service_lookup(
        &self,
        name: &str,
        extension: Option<Dict>,
        handler: Box<dyn CompletionHandler>,
    ) -> Submission;

    /// Cancel an outstanding request. The handler still fires, with
    /// [`CallbackKind::Cancel`], unless the request already completed.
    fn cancel(&self, transaction: TransactionId) -> EngineResult<()>;

    /// Tear the context down. Outstanding requests are cancelled. Calling
    /// this more than once is a no-op.
    fn destroy(&self);
}

/// Factory for engine contexts.
pub trait ResolutionEngine: Send + Sync {
    /// Engine identifier, for logs
    fn id(&self) -> &'static str;

    /// Create a fresh context. With `set_from_os` the context starts from the
    /// host operating system's resolver configuration.
    fn create_context(&self, set_from_os: bool) -> EngineResult<Arc<dyn EngineContext>>;
}
