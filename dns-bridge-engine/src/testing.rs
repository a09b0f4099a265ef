//! In-memory engine for tests.
//!
//! [`MockContext`] never touches the network. Requests stay pending until the
//! test finishes them with [`MockContext::complete`] or [`MockContext::fail`],
//! and every setter call is recorded for inspection.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::item::{Dict, Item};
use crate::traits::{
    CompletionHandler, EngineContext, EventSink, Rejected, ResolutionEngine, Submission,
};
use crate::types::{CallbackKind, Request, ResolutionType, Response, TransactionId, Transport};

/// First id handed out by a mock context. Non-trivial in every byte so that
/// byte-order mistakes show up.
pub const FIRST_TRANSACTION_ID: u64 = 0x0102_0304_0506_0700;

/// One recorded setter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetterCall {
    ResolutionType(ResolutionType),
    DnsTransport(Transport),
    Timeout(u64),
    LimitOutstandingQueries(u16),
    UseThreads(bool),
    ReturnDnssecStatus(bool),
    EdnsExtendedRcode(u8),
    EdnsVersion(u8),
    EdnsDoBit(u8),
    EdnsMaximumUdpPayloadSize(u16),
    UpstreamRecursiveServers(Vec<Item>),
}

impl SetterCall {
    /// Option name this setter backs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ResolutionType(_) => "resolution_type",
            Self::DnsTransport(_) => "dns_transport",
            Self::Timeout(_) => "timeout",
            Self::LimitOutstandingQueries(_) => "limit_outstanding_queries",
            Self::UseThreads(_) => "use_threads",
            Self::ReturnDnssecStatus(_) => "return_dnssec_status",
            Self::EdnsExtendedRcode(_) => "edns_extended_rcode",
            Self::EdnsVersion(_) => "edns_version",
            Self::EdnsDoBit(_) => "edns_do_bit",
            Self::EdnsMaximumUdpPayloadSize(_) => "edns_maximum_udp_payload_size",
            Self::UpstreamRecursiveServers(_) => "upstream_recursive_servers",
        }
    }
}

/// A request accepted by a mock context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub id: TransactionId,
    pub request: Request,
    pub extension: Option<Dict>,
}

/// Engine producing [`MockContext`]s.
#[derive(Default)]
pub struct MockEngine {
    create_error: Mutex<Option<EngineError>>,
    attach_error: Mutex<Option<EngineError>>,
    contexts: Mutex<Vec<Arc<MockContext>>>,
}

impl MockEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `create_context` fail.
    pub fn fail_create(&self, error: EngineError) {
        *self.create_error.lock() = Some(error);
    }

    /// Make `attach` fail on contexts created from now on.
    pub fn fail_attach(&self, error: EngineError) {
        *self.attach_error.lock() = Some(error);
    }

    /// Every context created so far, oldest first.
    pub fn contexts(&self) -> Vec<Arc<MockContext>> {
        self.contexts.lock().clone()
    }

    pub fn last_context(&self) -> Option<Arc<MockContext>> {
        self.contexts.lock().last().cloned()
    }
}

impl ResolutionEngine for MockEngine {
    fn id(&self) -> &'static str {
        "mock"
    }

    fn create_context(&self, set_from_os: bool) -> EngineResult<Arc<dyn EngineContext>> {
        if let Some(error) = *self.create_error.lock() {
            return Err(error);
        }
        let context = Arc::new(MockContext::new(set_from_os, *self.attach_error.lock()));
        self.contexts.lock().push(Arc::clone(&context));
        Ok(context)
    }
}

/// Scriptable engine context.
pub struct MockContext {
    from_os: bool,
    attach_error: Option<EngineError>,
    sink: Mutex<Option<EventSink>>,
    setter_calls: Mutex<Vec<SetterCall>>,
    setter_errors: Mutex<HashMap<&'static str, EngineError>>,
    next_rejection: Mutex<Option<EngineError>>,
    submitted: Mutex<Vec<Submitted>>,
    pending: Mutex<BTreeMap<TransactionId, Box<dyn CompletionHandler>>>,
    cancels: Mutex<Vec<TransactionId>>,
    next_id: AtomicU64,
    released: Arc<AtomicUsize>,
    destroy_calls: AtomicUsize,
    destroyed: AtomicBool,
}

impl MockContext {
    fn new(from_os: bool, attach_error: Option<EngineError>) -> Self {
        Self {
            from_os,
            attach_error,
            sink: Mutex::new(None),
            setter_calls: Mutex::new(Vec::new()),
            setter_errors: Mutex::new(HashMap::new()),
            next_rejection: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
            pending: Mutex::new(BTreeMap::new()),
            cancels: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(FIRST_TRANSACTION_ID),
            released: Arc::new(AtomicUsize::new(0)),
            destroy_calls: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
        }
    }

    // ===== test controls =====

    /// Reject the setter behind option `name` with `error`.
    pub fn reject_setter(&self, name: &'static str, error: EngineError) {
        self.setter_errors.lock().insert(name, error);
    }

    /// Reject the next submission with `error`.
    pub fn reject_next(&self, error: EngineError) {
        *self.next_rejection.lock() = Some(error);
    }

    /// Finish `id` successfully with `dict`. Returns `false` when the
    /// transaction is not pending.
    pub fn complete(&self, id: TransactionId, dict: Dict) -> bool {
        let Some(handler) = self.take(id) else {
            return false;
        };
        let released = Arc::clone(&self.released);
        let response = Response::with_release_hook(dict, move || {
            released.fetch_add(1, Ordering::SeqCst);
        });
        self.dispatch(handler, id, CallbackKind::Complete, Some(response));
        true
    }

    /// Finish `id` without a response.
    pub fn fail(&self, id: TransactionId, kind: CallbackKind) -> bool {
        self.finish(id, kind, None)
    }

    // ===== inspection =====

    pub const fn from_os(&self) -> bool {
        self.from_os
    }

    pub fn is_attached(&self) -> bool {
        self.sink.lock().is_some()
    }

    pub fn setter_calls(&self) -> Vec<SetterCall> {
        self.setter_calls.lock().clone()
    }

    /// Accepted submissions, oldest first.
    pub fn submitted(&self) -> Vec<Submitted> {
        self.submitted.lock().clone()
    }

    pub fn pending_ids(&self) -> Vec<TransactionId> {
        self.pending.lock().keys().copied().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Transactions cancelled through [`EngineContext::cancel`] or destroy.
    pub fn cancels(&self) -> Vec<TransactionId> {
        self.cancels.lock().clone()
    }

    /// Number of responses whose resources have been released.
    pub fn released_responses(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    // ===== internals =====

    fn ensure_live(&self) -> EngineResult<()> {
        if self.is_destroyed() {
            Err(EngineError::BadContext)
        } else {
            Ok(())
        }
    }

    fn record(&self, call: SetterCall) -> EngineResult<()> {
        self.ensure_live()?;
        let error = self.setter_errors.lock().get(call.name()).copied();
        self.setter_calls.lock().push(call);
        error.map_or(Ok(()), Err)
    }

    fn submit(
        &self,
        request: Request,
        extension: Option<Dict>,
        handler: Box<dyn CompletionHandler>,
    ) -> Submission {
        if let Err(error) = self.ensure_live() {
            return Err(Rejected::new(error, handler));
        }
        if let Some(error) = self.next_rejection.lock().take() {
            return Err(Rejected::new(error, handler));
        }
        let id = TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let submitted = Submitted {
            id,
            request,
            extension,
        };
        self.submitted.lock().push(submitted);
        self.pending.lock().insert(id, handler);
        Ok(id)
    }

    fn take(&self, id: TransactionId) -> Option<Box<dyn CompletionHandler>> {
        self.pending.lock().remove(&id)
    }

    fn finish(&self, id: TransactionId, kind: CallbackKind, response: Option<Response>) -> bool {
        match self.take(id) {
            Some(handler) => {
                self.dispatch(handler, id, kind, response);
                true
            }
            None => false,
        }
    }

    fn dispatch(
        &self,
        handler: Box<dyn CompletionHandler>,
        id: TransactionId,
        kind: CallbackKind,
        response: Option<Response>,
    ) {
        let task: Box<dyn FnOnce() + Send> =
            Box::new(move || handler.complete(kind, response, id));
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => {
                if let Err(task) = sink.post(task) {
                    task();
                }
            }
            None => task(),
        }
    }
}

impl EngineContext for MockContext {
    fn set_resolution_type(&self, value: ResolutionType) -> EngineResult<()> {
        self.record(SetterCall::ResolutionType(value))
    }

    fn set_dns_transport(&self, value: Transport) -> EngineResult<()> {
        self.record(SetterCall::DnsTransport(value))
    }

    fn set_timeout(&self, millis: u64) -> EngineResult<()> {
        self.record(SetterCall::Timeout(millis))
    }

    fn set_limit_outstanding_queries(&self, limit: u16) -> EngineResult<()> {
        self.record(SetterCall::LimitOutstandingQueries(limit))
    }

    fn set_use_threads(&self, enabled: bool) -> EngineResult<()> {
        self.record(SetterCall::UseThreads(enabled))
    }

    fn set_return_dnssec_status(&self, enabled: bool) -> EngineResult<()> {
        self.record(SetterCall::ReturnDnssecStatus(enabled))
    }

    fn set_edns_extended_rcode(&self, value: u8) -> EngineResult<()> {
        self.record(SetterCall::EdnsExtendedRcode(value))
    }

    fn set_edns_version(&self, value: u8) -> EngineResult<()> {
        self.record(SetterCall::EdnsVersion(value))
    }

    fn set_edns_do_bit(&self, value: u8) -> EngineResult<()> {
        self.record(SetterCall::EdnsDoBit(value))
    }

    fn set_edns_maximum_udp_payload_size(&self, value: u16) -> EngineResult<()> {
        self.record(SetterCall::EdnsMaximumUdpPayloadSize(value))
    }

    fn set_upstream_recursive_servers(&self, upstreams: &[Item]) -> EngineResult<()> {
        self.record(SetterCall::UpstreamRecursiveServers(upstreams.to_vec()))
    }

    fn attach(&self, sink: EventSink) -> EngineResult<()> {
        self.ensure_live()?;
        if let Some(error) = self.attach_error {
            return Err(error);
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn issue_query(
        &self,
        name: &str,
        rrtype: u16,
        extension: Option<Dict>,
        handler: Box<dyn CompletionHandler>,
    ) -> Submission {
        let request = Request::Query {
            name: name.to_string(),
            rrtype,
        };
        self.submit(request, extension, handler)
    }

    fn issue_address_lookup(
        &self,
        name: &str,
        extension: Option<Dict>,
        handler: Box<dyn CompletionHandler>,
    ) -> Submission {
        let request = Request::Address {
            name: name.to_string(),
        };
        self.submit(request, extension, handler)
    }

    fn issue_hostname_lookup(
        &self,
        address: &Dict,
        extension: Option<Dict>,
        handler: Box<dyn CompletionHandler>,
    ) -> Submission {
        let request = Request::Hostname {
            address: address.clone(),
        };
        self.submit(request, extension, handler)
    }

    fn issue_service_lookup(
        &self,
        name: &str,
        extension: Option<Dict>,
        handler: Box<dyn CompletionHandler>,
    ) -> Submission {
        let request = Request::Service {
            name: name.to_string(),
        };
        self.submit(request, extension, handler)
    }

    fn cancel(&self, transaction: TransactionId) -> EngineResult<()> {
        self.ensure_live()?;
        if !self.pending.lock().contains_key(&transaction) {
            return Err(EngineError::UnknownTransaction);
        }
        self.cancels.lock().push(transaction);
        self.finish(transaction, CallbackKind::Cancel, None);
        Ok(())
    }

    fn destroy(&self) {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        for id in self.pending_ids() {
            self.cancels.lock().push(id);
            self.finish(id, CallbackKind::Cancel, None);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::mpsc;

    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    struct Probe(mpsc::Sender<(CallbackKind, Option<Dict>, TransactionId)>);

    impl CompletionHandler for Probe {
        fn complete(
            self: Box<Self>,
            kind: CallbackKind,
            response: Option<Response>,
            transaction: TransactionId,
        ) {
            let dict = response.as_ref().map(|r| r.dict().clone());
            self.0.send((kind, dict, transaction)).unwrap();
        }

        fn abandon(self: Box<Self>, _error: EngineError) {}
    }

    #[test]
    fn test_complete_releases_response() {
        let engine = MockEngine::new();
        let ctx = engine.create_context(true).unwrap();
        let mock = engine.last_context().unwrap();
        assert!(mock.from_os());

        let (tx, rx) = mpsc::channel();
        let id = ctx
            .issue_address_lookup("example.com", None, Box::new(Probe(tx)))
            .unwrap();
        assert_eq!(id, TransactionId(FIRST_TRANSACTION_ID));

        let mut dict = Dict::new();
        dict.insert("status".to_string(), Item::from(900_u32));
        assert!(mock.complete(id, dict.clone()));
        assert!(!mock.complete(id, Dict::new()));

        assert_eq!(rx.recv().unwrap(), (CallbackKind::Complete, Some(dict), id));
        assert_eq!(mock.released_responses(), 1);
    }

    #[test]
    fn test_completing_an_unknown_id_releases_nothing() {
        let engine = MockEngine::new();
        let _ctx = engine.create_context(false).unwrap();
        let mock = engine.last_context().unwrap();
        assert!(!mock.complete(TransactionId(FIRST_TRANSACTION_ID), Dict::new()));
        assert_eq!(mock.released_responses(), 0);
    }

    #[test]
    fn test_attached_completions_wait_for_the_loop() {
        let engine = MockEngine::new();
        let ctx = engine.create_context(false).unwrap();
        let mock = engine.last_context().unwrap();
        let (sink_tx, mut sink_rx) = unbounded_channel();
        ctx.attach(EventSink::new(sink_tx)).unwrap();

        let (tx, rx) = mpsc::channel();
        let id = ctx
            .issue_query("example.com", 1, None, Box::new(Probe(tx)))
            .unwrap();
        ctx.cancel(id).unwrap();
        assert!(rx.try_recv().is_err());

        let task = sink_rx.try_recv().unwrap();
        task();
        assert_eq!(rx.recv().unwrap().0, CallbackKind::Cancel);
        assert_eq!(mock.cancels(), vec![id]);
    }

    #[test]
    fn test_rejections() {
        let engine = MockEngine::new();
        let ctx = engine.create_context(false).unwrap();
        let mock = engine.last_context().unwrap();

        mock.reject_setter("timeout", EngineError::InvalidParameter);
        assert_eq!(ctx.set_timeout(5), Err(EngineError::InvalidParameter));
        assert_eq!(mock.setter_calls(), vec![SetterCall::Timeout(5)]);

        mock.reject_next(EngineError::BadDomainName);
        let (tx, _rx) = mpsc::channel();
        let rejected = ctx
            .issue_service_lookup("bad..name", None, Box::new(Probe(tx)))
            .unwrap_err();
        assert_eq!(rejected.error, EngineError::BadDomainName);
        assert!(mock.submitted().is_empty());

        engine.fail_create(EngineError::Memory);
        assert_eq!(
            engine.create_context(false).err().map(EngineError::code),
            Some(310)
        );
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let engine = MockEngine::new();
        let ctx = engine.create_context(false).unwrap();
        let mock = engine.last_context().unwrap();
        let (tx, rx) = mpsc::channel();
        ctx.issue_address_lookup("a.example", None, Box::new(Probe(tx)))
            .unwrap();

        ctx.destroy();
        ctx.destroy();
        assert_eq!(rx.recv().unwrap().0, CallbackKind::Cancel);
        assert!(rx.try_recv().is_err());
        assert_eq!(mock.destroy_calls(), 2);
        assert_eq!(ctx.set_use_threads(true), Err(EngineError::BadContext));
    }
}
