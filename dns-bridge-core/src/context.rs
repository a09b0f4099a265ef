//! Host-facing resolution context.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dns_bridge_engine::{Dict, EngineContext, Rejected, ResolutionEngine, TransactionId};
use parking_lot::Mutex;

use crate::config::ContextOptions;
use crate::convert::{host_to_dict, transaction_to_host};
use crate::error::{BindingError, BindingResult};
use crate::host::{HostFunction, HostLoop, HostValue, LoopHandle};
use crate::lookup::{self, ContextRef, PendingCallback, RequestKind};
use crate::options::OptionRegistry;

/// State shared by a [`Context`] and its pending callbacks.
pub(crate) struct ContextShared {
    engine: Mutex<Option<Arc<dyn EngineContext>>>,
    pub(crate) outstanding: AtomicUsize,
    engine_id: &'static str,
}

impl ContextShared {
    fn new(engine: Arc<dyn EngineContext>, engine_id: &'static str) -> Self {
        Self {
            engine: Mutex::new(Some(engine)),
            outstanding: AtomicUsize::new(0),
            engine_id,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(engine_id: &'static str) -> Self {
        Self {
            engine: Mutex::new(None),
            outstanding: AtomicUsize::new(0),
            engine_id,
        }
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    fn engine(&self) -> Option<Arc<dyn EngineContext>> {
        self.engine.lock().clone()
    }

    fn destroy(&self) {
        // Release the lock first: destroying fires cancellations.
        let engine = self.engine.lock().take();
        if let Some(engine) = engine {
            log::debug!(
                "Destroying {} context with {} outstanding requests",
                self.engine_id,
                self.outstanding()
            );
            engine.destroy();
        }
    }
}

impl Drop for ContextShared {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// A resolution context as exposed to the host.
///
/// Active from successful construction until [`Context::destroy`]. Every
/// lookup reports through its callback as `(error, result, transaction)`;
/// only malformed calls fail synchronously.
pub struct Context {
    shared: Arc<ContextShared>,
    host: LoopHandle,
    registry: &'static OptionRegistry,
}

impl Context {
    /// Create an engine context, attach it to `host_loop` and apply the
    /// `options` record. Any failure destroys the engine context before
    /// returning.
    pub fn new(
        engine: &dyn ResolutionEngine,
        host_loop: &HostLoop,
        options: &HostValue,
    ) -> BindingResult<Self> {
        let engine_ctx = engine.create_context(true).map_err(|e| {
            log::warn!("Failed to create {} context: {e}", engine.id());
            BindingError::ContextCreate(e)
        })?;

        let host = host_loop.handle();
        if let Err(e) = engine_ctx.attach(host.sink()) {
            log::warn!("Failed to attach {} context to the host loop: {e}", engine.id());
            engine_ctx.destroy();
            return Err(BindingError::Attach(e));
        }

        let context = Self {
            shared: Arc::new(ContextShared::new(engine_ctx, engine.id())),
            host,
            registry: OptionRegistry::global(),
        };
        if let Err(e) = context.apply_options(options) {
            log::warn!("Failed to apply context options: {e}");
            context.destroy();
            return Err(e);
        }
        log::debug!("Created {} context", engine.id());
        Ok(context)
    }

    /// Create a context from typed configuration.
    pub fn with_options(
        engine: &dyn ResolutionEngine,
        host_loop: &HostLoop,
        options: &ContextOptions,
    ) -> BindingResult<Self> {
        Self::new(engine, host_loop, &options.to_host_value())
    }

    fn apply_options(&self, options: &HostValue) -> BindingResult<()> {
        let Some(options) = options.as_object() else {
            return Ok(());
        };
        for (name, value) in options {
            self.set_option(name, value)?;
        }
        Ok(())
    }

    /// Assign one option, as a property assignment on the host object would.
    pub fn set_option(&self, name: &str, value: &HostValue) -> BindingResult<()> {
        let engine = self.shared.engine().ok_or(BindingError::ContextInvalid)?;
        self.registry.apply(engine.as_ref(), name, value)
    }

    /// Names accepted by [`Context::set_option`].
    pub fn option_names(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    pub fn is_active(&self) -> bool {
        self.shared.engine.lock().is_some()
    }

    /// Requests issued through this context whose callback has not fired.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding()
    }

    pub fn engine_id(&self) -> &'static str {
        self.shared.engine_id
    }

    /// `lookup(name, type, [extension], callback)`
    ///
    /// Returns the transaction buffer, or `undefined` when the request failed
    /// before reaching the engine (the callback has then already run).
    #[allow(clippy::cast_possible_truncation)]
    pub fn lookup(&self, args: &[HostValue]) -> BindingResult<HostValue> {
        if args.len() < 3 {
            return Err(BindingError::Argument(
                "At least 3 arguments are required.".to_string(),
            ));
        }
        let callback = Self::final_callback(args)?;
        let Some(engine) = self.shared.engine() else {
            return Self::fail_early(&callback, &BindingError::ContextInvalid);
        };
        let name = args[0].to_host_string();
        if !args[1].is_number() {
            let err = BindingError::Argument("Second argument must be a number".to_string());
            return Self::fail_early(&callback, &err);
        }
        let rrtype = args[1].to_uint32() as u16;
        let extension = Self::extension(args, 2);
        self.issue(engine.as_ref(), RequestKind::Query { rrtype }, &name, extension, callback)
    }

    /// `getAddress(name, [extension], callback)`
    pub fn get_address(&self, args: &[HostValue]) -> BindingResult<HostValue> {
        self.helper_lookup(RequestKind::Address, args)
    }

    /// `getHostname(address, [extension], callback)`
    pub fn get_hostname(&self, args: &[HostValue]) -> BindingResult<HostValue> {
        self.helper_lookup(RequestKind::Hostname, args)
    }

    /// `getService(name, [extension], callback)`
    pub fn get_service(&self, args: &[HostValue]) -> BindingResult<HostValue> {
        self.helper_lookup(RequestKind::Service, args)
    }

    fn helper_lookup(&self, kind: RequestKind, args: &[HostValue]) -> BindingResult<HostValue> {
        if args.len() < 2 {
            return Err(BindingError::Argument(
                "At least 2 arguments are required.".to_string(),
            ));
        }
        let callback = Self::final_callback(args)?;
        let Some(engine) = self.shared.engine() else {
            return Self::fail_early(&callback, &BindingError::ContextInvalid);
        };
        let name = args[0].to_host_string();
        let extension = Self::extension(args, 1);
        self.issue(engine.as_ref(), kind, &name, extension, callback)
    }

    fn final_callback(args: &[HostValue]) -> BindingResult<HostFunction> {
        args.last()
            .and_then(HostValue::as_function)
            .cloned()
            .ok_or_else(|| BindingError::Argument("Final argument must be a function.".to_string()))
    }

    /// Optional extension record at `index`, only when a callback follows it.
    fn extension(args: &[HostValue], index: usize) -> Option<Dict> {
        if args.len() > index + 1 && args[index].is_object() {
            host_to_dict(&args[index])
        } else {
            None
        }
    }

    /// Report an error that happened before any request existed.
    fn fail_early(callback: &HostFunction, err: &BindingError) -> BindingResult<HostValue> {
        log::debug!("Lookup failed before issuance: {err}");
        callback.call(&[err.to_host_value(), HostValue::Null, HostValue::Undefined])?;
        Ok(HostValue::Undefined)
    }

    fn issue(
        &self,
        engine: &dyn EngineContext,
        kind: RequestKind,
        name: &str,
        extension: Option<Dict>,
        callback: HostFunction,
    ) -> BindingResult<HostValue> {
        let pending = PendingCallback::new(
            callback,
            ContextRef::new(&self.shared),
            self.host.clone(),
        );
        match lookup::issue(engine, kind, name, extension, Box::new(pending)) {
            Ok(id) => {
                log::debug!("Issued {kind} for {name} as transaction {id}");
                Ok(transaction_to_host(id))
            }
            Err(Rejected { error, handler }) => {
                log::warn!("Engine refused {kind} for {name}: {error} ({})", error.code());
                handler.abandon(error);
                match self.host.take_fault() {
                    Some(fault) => Err(fault.into()),
                    None => Ok(HostValue::Undefined),
                }
            }
        }
    }

    /// `cancel(transactionBuffer)`. `false` when the context is not active,
    /// no buffer was given, the buffer is not 8 bytes long or the engine
    /// does not know the transaction.
    pub fn cancel(&self, args: &[HostValue]) -> bool {
        let Some(engine) = self.shared.engine() else {
            return false;
        };
        args.first()
            .is_some_and(|id| lookup::cancel(engine.as_ref(), id))
    }

    pub fn cancel_transaction(&self, id: TransactionId) -> bool {
        self.shared
            .engine()
            .is_some_and(|engine| lookup::cancel_id(engine.as_ref(), id))
    }

    /// Destroy the engine context. Outstanding requests complete with a
    /// cancellation. Always `true`; repeated calls do nothing.
    pub fn destroy(&self) -> bool {
        self.shared.destroy();
        true
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("engine", &self.engine_id())
            .field("active", &self.is_active())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
