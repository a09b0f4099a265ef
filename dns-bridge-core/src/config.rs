//! Typed context configuration.
//!
//! [`ContextOptions`] mirrors the options record a host passes to the
//! context constructor, so configuration files and host records go through
//! the same dispatch.

use serde::{Deserialize, Serialize};

use crate::error::BindingResult;
use crate::host::HostValue;

/// One upstream resolver: `"addr"` or `["addr", port]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Upstream {
    Address(String),
    WithPort(String, u16),
}

impl Upstream {
    fn to_host_value(&self) -> HostValue {
        match self {
            Self::Address(addr) => HostValue::from(addr.as_str()),
            Self::WithPort(addr, port) => HostValue::from(vec![
                HostValue::from(addr.as_str()),
                HostValue::from(u32::from(*port)),
            ]),
        }
    }
}

/// Context configuration. Every field is optional; absent fields leave the
/// engine default in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// `true` selects stub resolution, `false` recursion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stub: Option<bool>,

    /// Numeric resolution type code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_type: Option<u32>,

    /// Also read from `upstream_recursive_servers`. A document naming both
    /// keys is rejected as a duplicate field, unlike a host record where the
    /// later key wins.
    #[serde(
        alias = "upstream_recursive_servers",
        skip_serializing_if = "Option::is_none"
    )]
    pub upstreams: Option<Vec<Upstream>>,

    /// Per-query timeout, milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_threads: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_dnssec_status: Option<bool>,

    /// Numeric transport code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_transport: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub edns_extended_rcode: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub edns_version: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub edns_do_bit: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_outstanding_queries: Option<u16>,

    #[serde(
        alias = "edns_maximum_udp_payloadSize",
        skip_serializing_if = "Option::is_none"
    )]
    pub edns_maximum_udp_payload_size: Option<u16>,
}

impl ContextOptions {
    /// Parse a JSON document. Unknown keys are ignored.
    pub fn from_json_str(json: &str) -> BindingResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The options record the context constructor consumes. `stub` comes
    /// before `resolution_type`, so an explicit code wins when both are set.
    pub fn to_host_value(&self) -> HostValue {
        let mut entries: Vec<(&'static str, HostValue)> = Vec::new();
        let mut push = |key: &'static str, value: Option<HostValue>| {
            if let Some(value) = value {
                entries.push((key, value));
            }
        };
        push("stub", self.stub.map(HostValue::from));
        push("resolution_type", self.resolution_type.map(HostValue::from));
        push(
            "upstreams",
            self.upstreams
                .as_ref()
                .map(|list| HostValue::Array(list.iter().map(Upstream::to_host_value).collect())),
        );
        push("timeout", self.timeout.map(HostValue::from));
        push("use_threads", self.use_threads.map(HostValue::from));
        push("return_dnssec_status", self.return_dnssec_status.map(HostValue::from));
        push("dns_transport", self.dns_transport.map(HostValue::from));
        push("edns_extended_rcode", self.edns_extended_rcode.map(|v| HostValue::from(u32::from(v))));
        push("edns_version", self.edns_version.map(|v| HostValue::from(u32::from(v))));
        push("edns_do_bit", self.edns_do_bit.map(|v| HostValue::from(u32::from(v))));
        push(
            "limit_outstanding_queries",
            self.limit_outstanding_queries.map(|v| HostValue::from(u32::from(v))),
        );
        push(
            "edns_maximum_udp_payload_size",
            self.edns_maximum_udp_payload_size.map(|v| HostValue::from(u32::from(v))),
        );
        HostValue::object(entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::BindingError;

    #[test]
    fn test_from_json() {
        let options = ContextOptions::from_json_str(
            r#"{
                "stub": true,
                "timeout": 500,
                "upstream_recursive_servers": ["1.1.1.1", ["2606:4700::1111", 5353]],
                "edns_maximum_udp_payloadSize": 1232,
                "dnssec_trust_anchors": []
            }"#,
        )
        .unwrap();
        assert_eq!(options.stub, Some(true));
        assert_eq!(options.timeout, Some(500));
        assert_eq!(
            options.upstreams,
            Some(vec![
                Upstream::Address("1.1.1.1".into()),
                Upstream::WithPort("2606:4700::1111".into(), 5353)
            ])
        );
        assert_eq!(options.edns_maximum_udp_payload_size, Some(1232));
    }

    #[test]
    fn test_bad_json() {
        let err = ContextOptions::from_json_str(r#"{"timeout": "soon"}"#).unwrap_err();
        assert!(matches!(err, BindingError::Config(_)));
    }

    #[test]
    fn test_both_upstream_spellings_are_a_duplicate() {
        let err = ContextOptions::from_json_str(
            r#"{"upstreams": ["1.1.1.1"], "upstream_recursive_servers": ["8.8.8.8"]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, BindingError::Config(ref msg) if msg.contains("duplicate field")));
    }

    #[test]
    fn test_to_host_value() {
        let options = ContextOptions {
            stub: Some(false),
            resolution_type: Some(520),
            upstreams: Some(vec![Upstream::WithPort("::1".into(), 53)]),
            edns_do_bit: Some(1),
            ..ContextOptions::default()
        };
        let record = options.to_host_value();
        let keys: Vec<_> = record.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["stub", "resolution_type", "upstreams", "edns_do_bit"]);
        assert_eq!(
            record.get("upstreams"),
            Some(&HostValue::from(vec![HostValue::from(vec![
                HostValue::from("::1"),
                HostValue::Number(53.0)
            ])]))
        );
        assert_eq!(ContextOptions::default().to_host_value(), HostValue::object::<&str, _>([]));
    }

    #[test]
    fn test_serialize_skips_unset() {
        let options = ContextOptions {
            timeout: Some(250),
            ..ContextOptions::default()
        };
        assert_eq!(serde_json::to_string(&options).unwrap(), r#"{"timeout":250}"#);
    }
}
