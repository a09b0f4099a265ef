//! Delivery of one request's outcome to its host callback.

use dns_bridge_engine::{CallbackKind, CompletionHandler, EngineError, Response, TransactionId};

use super::ContextRef;
use crate::convert::{dict_to_host, transaction_to_host};
use crate::error::BindingError;
use crate::host::{HostFunction, HostObject, HostValue, LoopHandle, PendingGuard};

/// The host callback of one request plus the context reference it holds.
///
/// Consumed by whichever of [`CompletionHandler::complete`] or
/// [`CompletionHandler::abandon`] runs; dropping it releases the context.
pub(crate) struct PendingCallback {
    callback: HostFunction,
    host: LoopHandle,
    _context: ContextRef,
    _pending: PendingGuard,
}

impl PendingCallback {
    pub(crate) fn new(callback: HostFunction, context: ContextRef, host: LoopHandle) -> Self {
        let pending = host.track();
        Self {
            callback,
            host,
            _context: context,
            _pending: pending,
        }
    }

    /// Call the host callback; a fault it raises goes to the host loop.
    fn invoke(self, args: &[HostValue]) {
        if let Err(fault) = self.callback.call(args) {
            self.host.report_fault(fault);
        }
    }
}

impl CompletionHandler for PendingCallback {
    fn complete(
        self: Box<Self>,
        kind: CallbackKind,
        response: Option<Response>,
        transaction: TransactionId,
    ) {
        log::debug!("Transaction {transaction} finished: {kind:?}");
        let (error, result) = if kind == CallbackKind::Complete {
            let result = response.as_ref().map_or_else(
                || HostValue::Object(HostObject::new()),
                |r| dict_to_host(r.dict()),
            );
            (HostValue::Null, result)
        } else {
            (BindingError::Completion { kind }.to_host_value(), HostValue::Null)
        };
        // Engine resource goes back before the host sees the result.
        drop(response);
        (*self).invoke(&[error, result, transaction_to_host(transaction)]);
    }

    fn abandon(self: Box<Self>, error: EngineError) {
        let error = BindingError::Issuance { code: error.code() }.to_host_value();
        (*self).invoke(&[error, HostValue::Null, HostValue::Undefined]);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use dns_bridge_engine::{Dict, Item};

    use super::*;
    use crate::context::ContextShared;
    use crate::host::{HostFault, HostLoop};

    type Calls = Arc<Mutex<Vec<Vec<HostValue>>>>;

    fn recorder() -> (HostFunction, Calls) {
        let calls: Calls = Arc::default();
        let sink = Arc::clone(&calls);
        let f = HostFunction::new(move |args| {
            sink.lock().unwrap().push(args.to_vec());
            Ok(())
        });
        (f, calls)
    }

    fn pending(callback: HostFunction, shared: &Arc<ContextShared>, host: &HostLoop) -> Box<PendingCallback> {
        Box::new(PendingCallback::new(callback, ContextRef::new(shared), host.handle()))
    }

    #[test]
    fn test_success_shape_and_release() {
        let host = HostLoop::new();
        let shared = Arc::new(ContextShared::detached("test"));
        let (callback, calls) = recorder();
        let handler = pending(callback, &shared, &host);
        assert_eq!(shared.outstanding(), 1);
        assert_eq!(host.pending(), 1);

        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let mut dict = Dict::new();
        dict.insert("status".into(), Item::from(900_u32));
        let response = Response::with_release_hook(dict, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handler.complete(CallbackKind::Complete, Some(response), TransactionId(7));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let args = &calls[0];
        assert_eq!(args[0], HostValue::Null);
        assert_eq!(args[1].get("status"), Some(&HostValue::Number(900.0)));
        assert_eq!(args[2], HostValue::Buffer(7_u64.to_ne_bytes().to_vec()));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(shared.outstanding(), 0);
        assert_eq!(host.pending(), 0);
    }

    #[test]
    fn test_failure_shape() {
        let host = HostLoop::new();
        let shared = Arc::new(ContextShared::detached("test"));
        let (callback, calls) = recorder();
        pending(callback, &shared, &host).complete(CallbackKind::Timeout, None, TransactionId(1));

        let calls = calls.lock().unwrap();
        let args = &calls[0];
        assert_eq!(args[0].get("msg"), Some(&HostValue::from("Lookup failed.")));
        assert_eq!(args[0].get("code"), Some(&HostValue::Number(702.0)));
        assert_eq!(args[1], HostValue::Null);
        assert_eq!(args[2].as_buffer().map(<[u8]>::len), Some(8));
    }

    #[test]
    fn test_abandon_reports_issuance_error() {
        let host = HostLoop::new();
        let shared = Arc::new(ContextShared::detached("test"));
        let (callback, calls) = recorder();
        pending(callback, &shared, &host).abandon(EngineError::BadDomainName);

        let calls = calls.lock().unwrap();
        let args = &calls[0];
        assert_eq!(args[0].get("msg"), Some(&HostValue::from("Error issuing query")));
        assert_eq!(args[0].get("code"), Some(&HostValue::Number(300.0)));
        assert_eq!(args[2], HostValue::Undefined);
        assert_eq!(shared.outstanding(), 0);
    }

    #[test]
    fn test_callback_fault_reaches_the_loop() {
        let mut host = HostLoop::new();
        let shared = Arc::new(ContextShared::detached("test"));
        let callback = HostFunction::new(|_| Err(HostFault::new("callback threw")));
        pending(callback, &shared, &host).complete(CallbackKind::Cancel, None, TransactionId(2));

        assert_eq!(host.run_pending(), Err(HostFault::new("callback threw")));
        assert_eq!(shared.outstanding(), 0);
    }
}
