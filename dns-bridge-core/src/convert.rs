//! Conversion between engine items and host values.
//!
//! Dictionaries and lists keep their order in both directions. Byte data is
//! copied as-is, never re-encoded.

use dns_bridge_engine::{Dict, Endpoint, ExtensionFlag, Item, TransactionId};

use crate::host::{HostObject, HostValue};

/// Convert an engine item to a host value.
#[allow(clippy::cast_precision_loss)]
pub fn item_to_host(item: &Item) -> HostValue {
    match item {
        Item::Dict(dict) => dict_to_host(dict),
        Item::List(items) => HostValue::Array(items.iter().map(item_to_host).collect()),
        Item::Int(n) => HostValue::Number(*n as f64),
        Item::Bindata(bytes) => HostValue::Buffer(bytes.clone()),
        Item::String(s) => HostValue::String(s.clone()),
    }
}

/// Convert an engine dictionary to a host record.
pub fn dict_to_host(dict: &Dict) -> HostValue {
    HostValue::Object(
        dict.iter()
            .map(|(k, v)| (k.clone(), item_to_host(v)))
            .collect::<HostObject>(),
    )
}

/// Convert a host value to an engine item.
///
/// Booleans become extension flags and numbers are truncated to integers.
/// Values with no engine form (undefined, null, functions, non-finite
/// numbers) yield `None` and are left out of the enclosing container.
#[allow(clippy::cast_possible_truncation)]
pub fn host_to_item(value: &HostValue) -> Option<Item> {
    match value {
        HostValue::Undefined | HostValue::Null | HostValue::Function(_) => None,
        HostValue::Bool(b) => Some(Item::from(ExtensionFlag::from(*b).code())),
        HostValue::Number(n) if n.is_finite() => Some(Item::Int(n.trunc() as i64)),
        HostValue::Number(_) => None,
        HostValue::String(s) => Some(Item::String(s.clone())),
        HostValue::Buffer(bytes) => Some(Item::Bindata(bytes.clone())),
        HostValue::Array(items) => Some(Item::List(items.iter().filter_map(host_to_item).collect())),
        HostValue::Object(obj) => Some(Item::Dict(object_to_dict(obj))),
    }
}

/// Convert a host record to an engine dictionary. Anything that is not a
/// plain record yields `None`.
pub fn host_to_dict(value: &HostValue) -> Option<Dict> {
    value.as_object().map(object_to_dict)
}

fn object_to_dict(obj: &HostObject) -> Dict {
    obj.iter()
        .filter_map(|(k, v)| host_to_item(v).map(|item| (k.clone(), item)))
        .collect()
}

/// The 8-byte buffer form of a transaction id.
pub fn transaction_to_host(id: TransactionId) -> HostValue {
    HostValue::Buffer(id.to_bytes().to_vec())
}

/// Read a transaction id back from its buffer form. Anything but an 8-byte
/// buffer is rejected.
pub fn transaction_from_host(value: &HostValue) -> Option<TransactionId> {
    value.as_buffer().and_then(TransactionId::from_bytes)
}

/// Parse an address literal (IPv4 first, then IPv6) into an endpoint
/// dictionary without a port.
pub fn endpoint_from_str(literal: &str) -> Option<Dict> {
    Endpoint::parse(literal).map(|ep| ep.to_dict())
}
