//! Submitting requests to the engine and cancelling them.

use dns_bridge_engine::{
    CompletionHandler, Dict, EngineContext, EngineError, Rejected, Submission, TransactionId,
};

use super::RequestKind;
use crate::convert::{endpoint_from_str, transaction_from_host};
use crate::host::HostValue;

/// Hand a request to the engine.
///
/// On rejection the handler comes back inside [`Rejected`]; the caller owns
/// releasing it.
pub(crate) fn issue(
    context: &dyn EngineContext,
    kind: RequestKind,
    name: &str,
    extension: Option<Dict>,
    handler: Box<dyn CompletionHandler>,
) -> Submission {
    match kind {
        RequestKind::Query { rrtype } => context.issue_query(name, rrtype, extension, handler),
        RequestKind::Address => context.issue_address_lookup(name, extension, handler),
        RequestKind::Service => context.issue_service_lookup(name, extension, handler),
        RequestKind::Hostname => match endpoint_from_str(name) {
            Some(address) => context.issue_hostname_lookup(&address, extension, handler),
            None => {
                log::debug!("Not an address literal: {name}");
                Err(Rejected::new(EngineError::Generic, handler))
            }
        },
    }
}

/// Cancel by buffer. Anything but an 8-byte buffer is refused without
/// contacting the engine.
pub(crate) fn cancel(context: &dyn EngineContext, transaction: &HostValue) -> bool {
    match transaction_from_host(transaction) {
        Some(id) => cancel_id(context, id),
        None => {
            log::debug!("Cancel ignored: not a transaction id buffer");
            false
        }
    }
}

pub(crate) fn cancel_id(context: &dyn EngineContext, id: TransactionId) -> bool {
    match context.cancel(id) {
        Ok(()) => {
            log::debug!("Cancelled transaction {id}");
            true
        }
        Err(e) => {
            log::debug!("Cancel of transaction {id} refused: {e}");
            false
        }
    }
}
