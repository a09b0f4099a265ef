//! Resolution engine backed by `hickory-resolver`.
//!
//! Requests run as tokio tasks on the runtime handed to [`HickoryEngine`].
//! Completion, cancellation and destroy all go through one in-flight table,
//! so whichever removes a transaction first is the one that fires its
//! handler.

mod response;
mod settings;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hickory_resolver::{proto::rr::Name, TokioResolver};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;

use crate::error::{EngineError, EngineResult};
use crate::item::{Dict, Endpoint, Item};
use crate::traits::{
    CompletionHandler, EngineContext, EventSink, Rejected, ResolutionEngine, Submission,
};
use crate::types::{CallbackKind, Request, ResolutionType, Response, TransactionId, Transport};

use response::QueryFlags;
use settings::Settings;

/// Engine factory bound to a tokio runtime.
#[derive(Debug, Clone)]
pub struct HickoryEngine {
    runtime: Handle,
}

impl HickoryEngine {
    #[must_use]
    pub const fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Bind to the runtime the caller is running on.
    pub fn from_current() -> EngineResult<Self> {
        Handle::try_current().map(Self::new).map_err(|e| {
            log::warn!("No tokio runtime available for the hickory engine: {e}");
            EngineError::Generic
        })
    }
}

impl ResolutionEngine for HickoryEngine {
    fn id(&self) -> &'static str {
        "hickory"
    }

    fn create_context(&self, set_from_os: bool) -> EngineResult<Arc<dyn EngineContext>> {
        Ok(Arc::new(HickoryContext::new(
            self.runtime.clone(),
            set_from_os,
        )))
    }
}

struct InFlight {
    handler: Box<dyn CompletionHandler>,
    task: Option<AbortHandle>,
}

/// State shared between the context and its running tasks.
#[derive(Default)]
struct Shared {
    inflight: Mutex<HashMap<TransactionId, InFlight>>,
    sink: Mutex<Option<EventSink>>,
}

impl Shared {
    /// Fire the handler of `id` if nobody has yet.
    fn finish(&self, id: TransactionId, kind: CallbackKind, response: Option<Response>) {
        let Some(entry) = self.inflight.lock().remove(&id) else {
            log::debug!("transaction {id} already finished");
            return;
        };
        if kind == CallbackKind::Cancel {
            if let Some(task) = entry.task {
                task.abort();
            }
        }
        self.dispatch(entry.handler, kind, response, id);
    }

    fn dispatch(
        &self,
        handler: Box<dyn CompletionHandler>,
        kind: CallbackKind,
        response: Option<Response>,
        id: TransactionId,
    ) {
        let task: Box<dyn FnOnce() + Send> = Box::new(move || handler.complete(kind, response, id));
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => {
                if let Err(task) = sink.post(task) {
                    log::warn!("host loop is gone, completing transaction {id} in place");
                    task();
                }
            }
            None => task(),
        }
    }
}

/// One resolution context.
pub struct HickoryContext {
    runtime: Handle,
    settings: Mutex<Settings>,
    resolver: Mutex<Option<TokioResolver>>,
    limiter: Mutex<Option<Arc<Semaphore>>>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    destroyed: AtomicBool,
}

impl HickoryContext {
    fn new(runtime: Handle, from_os: bool) -> Self {
        Self {
            runtime,
            settings: Mutex::new(Settings::new(from_os)),
            resolver: Mutex::new(None),
            limiter: Mutex::new(None),
            shared: Arc::new(Shared::default()),
            next_id: AtomicU64::new(1),
            destroyed: AtomicBool::new(false),
        }
    }

    fn ensure_live(&self) -> EngineResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(EngineError::BadContext)
        } else {
            Ok(())
        }
    }

    /// Apply a settings change and drop the cached resolver.
    fn update(&self, change: impl FnOnce(&mut Settings)) -> EngineResult<()> {
        self.ensure_live()?;
        change(&mut *self.settings.lock());
        *self.resolver.lock() = None;
        Ok(())
    }

    /// Settings hickory has no knob for. The value is checked against a live
    /// context and otherwise dropped.
    fn accept_inert(&self, name: &str, value: &dyn fmt::Display) -> EngineResult<()> {
        self.ensure_live()?;
        log::debug!("{name}={value} has no effect on the hickory engine");
        Ok(())
    }

    fn resolver(&self, validate: bool) -> TokioResolver {
        let _guard = self.runtime.enter();
        let settings = self.settings.lock().clone();
        if validate && !settings.return_dnssec_status {
            // Per-query DNSSEC on a non-validating context.
            let mut validating = settings;
            validating.return_dnssec_status = true;
            return validating.build_resolver();
        }
        self.resolver
            .lock()
            .get_or_insert_with(|| settings.build_resolver())
            .clone()
    }

    fn submit(
        &self,
        request: Request,
        extension: Option<Dict>,
        handler: Box<dyn CompletionHandler>,
    ) -> Submission {
        if let Err(error) = self.validate(&request) {
            return Err(Rejected::new(error, handler));
        }
        let context_dnssec = self.settings.lock().return_dnssec_status;
        let flags = match QueryFlags::from_extension(extension.as_ref(), context_dnssec) {
            Ok(flags) => flags,
            Err(error) => return Err(Rejected::new(error, handler)),
        };

        let id = TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let resolver = self.resolver(flags.needs_validation());
        let limiter = self.limiter.lock().clone();
        let shared = Arc::clone(&self.shared);
        let label = request.label();

        // Hold the table lock across spawn so the task cannot finish before
        // its entry exists.
        let mut inflight = self.shared.inflight.lock();
        let task = self.runtime.spawn(async move {
            let _permit = match limiter {
                Some(limiter) => limiter.acquire_owned().await.ok(),
                None => None,
            };
            match response::resolve(&resolver, &request, flags).await {
                Ok(dict) => shared.finish(id, CallbackKind::Complete, Some(Response::new(dict))),
                Err(kind) => shared.finish(id, kind, None),
            }
        });
        inflight.insert(
            id,
            InFlight {
                handler,
                task: Some(task.abort_handle()),
            },
        );
        drop(inflight);

        log::debug!("issued {label} transaction {id}");
        Ok(id)
    }

    fn validate(&self, request: &Request) -> EngineResult<()> {
        self.ensure_live()?;
        match request {
            Request::Query { name, .. }
            | Request::Address { name }
            | Request::Service { name } => {
                Name::from_utf8(name).map_err(|_| EngineError::BadDomainName)?;
            }
            Request::Hostname { address } => {
                Endpoint::from_dict(address).ok_or(EngineError::InvalidParameter)?;
            }
        }
        Ok(())
    }
}

impl EngineContext for HickoryContext {
    fn set_resolution_type(&self, value: ResolutionType) -> EngineResult<()> {
        Settings::check_resolution_type(value)?;
        self.update(|s| s.resolution_type = value)
    }

    fn set_dns_transport(&self, value: Transport) -> EngineResult<()> {
        Settings::check_transport(value)?;
        self.update(|s| s.transport = value)
    }

    fn set_timeout(&self, millis: u64) -> EngineResult<()> {
        if millis == 0 {
            return Err(EngineError::InvalidParameter);
        }
        self.update(|s| s.timeout = Some(Duration::from_millis(millis)))
    }

    fn set_limit_outstanding_queries(&self, limit: u16) -> EngineResult<()> {
        self.ensure_live()?;
        *self.limiter.lock() = (limit > 0).then(|| Arc::new(Semaphore::new(usize::from(limit))));
        Ok(())
    }

    /// Accepted with no effect: requests always run on the runtime's workers.
    fn set_use_threads(&self, enabled: bool) -> EngineResult<()> {
        self.accept_inert("use_threads", &enabled)
    }

    fn set_return_dnssec_status(&self, enabled: bool) -> EngineResult<()> {
        self.update(|s| s.return_dnssec_status = enabled)
    }

    /// Accepted with no effect: hickory always sends extended rcode 0.
    fn set_edns_extended_rcode(&self, value: u8) -> EngineResult<()> {
        self.accept_inert("edns_extended_rcode", &value)
    }

    /// Accepted with no effect: hickory always sends EDNS version 0.
    fn set_edns_version(&self, value: u8) -> EngineResult<()> {
        self.accept_inert("edns_version", &value)
    }

    fn set_edns_do_bit(&self, value: u8) -> EngineResult<()> {
        if value > 1 {
            return Err(EngineError::InvalidParameter);
        }
        self.update(|s| s.edns_do_bit = value)
    }

    /// Any non-zero size turns EDNS0 on; the advertised size stays hickory's
    /// own.
    fn set_edns_maximum_udp_payload_size(&self, value: u16) -> EngineResult<()> {
        self.update(|s| s.edns_maximum_udp_payload_size = value)
    }

    fn set_upstream_recursive_servers(&self, upstreams: &[Item]) -> EngineResult<()> {
        let upstreams = Settings::parse_upstreams(upstreams)?;
        self.update(|s| s.upstreams = upstreams)
    }

    fn attach(&self, sink: EventSink) -> EngineResult<()> {
        self.ensure_live()?;
        *self.shared.sink.lock() = Some(sink);
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
        if !self.shared.inflight.lock().contains_key(&transaction) {
            return Err(EngineError::UnknownTransaction);
        }
        log::debug!("cancelling transaction {transaction}");
        self.shared.finish(transaction, CallbackKind::Cancel, None);
        Ok(())
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let ids: Vec<TransactionId> = self.shared.inflight.lock().keys().copied().collect();
        if !ids.is_empty() {
            log::debug!("destroying context with {} outstanding transactions", ids.len());
        }
        for id in ids {
            self.shared.finish(id, CallbackKind::Cancel, None);
        }
        *self.resolver.lock() = None;
    }
}

impl Drop for HickoryContext {
    fn drop(&mut self) {
        self.destroy();
    }
}
