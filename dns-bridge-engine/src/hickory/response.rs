//! Runs requests against hickory and shapes the answers into dictionaries.

use hickory_resolver::{
    lookup::Lookup,
    proto::{
        dnssec::Proof,
        rr::{RData, Record, RecordType},
        ProtoErrorKind,
    },
    ResolveError, TokioResolver,
};

use crate::item::{Dict, Endpoint, Item};
use crate::types::{
    CallbackKind, DnssecStatus, ExtensionFlag, Request, ResponseStatus, NAMETYPE_DNS,
};

/// Per-request switches read from the extension dictionary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct QueryFlags {
    pub dnssec_status: bool,
    pub only_secure: bool,
}

/// Extensions this engine understands. Anything else is refused at
/// submission.
pub(crate) const KNOWN_EXTENSIONS: &[&str] = &[
    "dnssec_return_status",
    "dnssec_return_only_secure",
    "return_both_v4_and_v6",
];

impl QueryFlags {
    pub fn from_extension(
        extension: Option<&Dict>,
        context_dnssec: bool,
    ) -> Result<Self, crate::error::EngineError> {
        use crate::error::EngineError;

        let mut flags = Self {
            dnssec_status: context_dnssec,
            only_secure: false,
        };
        let Some(extension) = extension else {
            return Ok(flags);
        };
        for (name, value) in extension {
            if !KNOWN_EXTENSIONS.contains(&name.as_str()) {
                return Err(EngineError::NoSuchExtension);
            }
            let enabled = value
                .as_int()
                .and_then(|code| u32::try_from(code).ok())
                .and_then(|code| ExtensionFlag::try_from(code).ok())
                .ok_or(EngineError::ExtensionMisformat)?
                == ExtensionFlag::True;
            match name.as_str() {
                "dnssec_return_status" => flags.dnssec_status |= enabled,
                "dnssec_return_only_secure" => flags.only_secure = enabled,
                _ => {}
            }
        }
        Ok(flags)
    }

    pub const fn needs_validation(self) -> bool {
        self.dnssec_status || self.only_secure
    }
}

/// Execute one request. `Ok` carries the response dictionary of a complete
/// answer (including negative answers); `Err` the completion kind of a
/// failure.
pub(crate) async fn resolve(
    resolver: &TokioResolver,
    request: &Request,
    flags: QueryFlags,
) -> Result<Dict, CallbackKind> {
    match request {
        Request::Query { name, rrtype } => {
            match resolver.lookup(name.as_str(), RecordType::from(*rrtype)).await {
                Ok(lookup) => Ok(build_response(name, &lookup, None, flags)),
                Err(e) => negative_response(name, &e),
            }
        }
        Request::Address { name } => match resolver.lookup_ip(name.as_str()).await {
            Ok(ips) => {
                let answers = ips
                    .iter()
                    .map(|ip| Item::Dict(Endpoint::new(ip).to_dict()))
                    .collect();
                Ok(build_response(name, ips.as_lookup(), Some(answers), flags))
            }
            Err(e) => negative_response(name, &e),
        },
        Request::Hostname { address } => {
            let Some(endpoint) = Endpoint::from_dict(address) else {
                return Err(CallbackKind::Error);
            };
            let name = endpoint.addr.to_string();
            match resolver.reverse_lookup(endpoint.addr).await {
                Ok(lookup) => Ok(build_response(&name, lookup.as_lookup(), None, flags)),
                Err(e) => negative_response(&name, &e),
            }
        }
        Request::Service { name } => match resolver.srv_lookup(name.as_str()).await {
            Ok(lookup) => Ok(build_response(name, lookup.as_lookup(), None, flags)),
            Err(e) => negative_response(name, &e),
        },
    }
}

fn negative_response(name: &str, err: &ResolveError) -> Result<Dict, CallbackKind> {
    if err.is_no_records_found() || err.is_nx_domain() {
        let rcode = match err.proto().map(|proto| proto.kind()) {
            Some(ProtoErrorKind::NoRecordsFound { response_code, .. }) => {
                u16::from(*response_code)
            }
            _ => 0,
        };
        log::debug!("{name}: no records (rcode {rcode})");
        return Ok(empty_response(name, ResponseStatus::NoName, rcode));
    }
    if matches!(
        err.proto().map(|proto| proto.kind()),
        Some(ProtoErrorKind::Timeout)
    ) {
        log::debug!("{name}: timed out");
        return Err(CallbackKind::Timeout);
    }
    log::warn!("{name}: lookup failed: {err}");
    Err(CallbackKind::Error)
}

fn header(rcode: u16) -> Item {
    let mut header = Dict::new();
    header.insert("rcode".to_string(), Item::Int(i64::from(rcode)));
    Item::Dict(header)
}

fn envelope(name: &str, status: ResponseStatus, replies: Vec<Item>) -> Dict {
    let mut response = Dict::new();
    response.insert(
        "answer_type".to_string(),
        Item::Int(i64::from(NAMETYPE_DNS)),
    );
    response.insert("canonical_name".to_string(), Item::from(name));
    response.insert("replies_tree".to_string(), Item::List(replies));
    response.insert("status".to_string(), Item::from(status.code()));
    response
}

fn empty_response(name: &str, status: ResponseStatus, rcode: u16) -> Dict {
    let mut reply = Dict::new();
    reply.insert("header".to_string(), header(rcode));
    reply.insert("answer".to_string(), Item::List(Vec::new()));
    envelope(name, status, vec![Item::Dict(reply)])
}

pub(crate) fn build_response(
    name: &str,
    lookup: &Lookup,
    just_address_answers: Option<Vec<Item>>,
    flags: QueryFlags,
) -> Dict {
    let canonical = lookup.query().name().to_string();
    let records: Vec<&Record> = lookup.record_iter().collect();
    let dnssec = dnssec_status(&records);

    if flags.only_secure && dnssec != DnssecStatus::Secure {
        return empty_response(name, ResponseStatus::NoSecureAnswers, 0);
    }

    let mut reply = Dict::new();
    reply.insert("header".to_string(), header(0));
    reply.insert(
        "answer".to_string(),
        Item::List(records.iter().map(|r| record_to_item(r)).collect()),
    );
    reply.insert("canonical_name".to_string(), Item::from(canonical.as_str()));
    if flags.dnssec_status {
        reply.insert("dnssec_status".to_string(), Item::from(dnssec.code()));
    }

    let mut response = envelope(&canonical, ResponseStatus::Good, vec![Item::Dict(reply)]);
    if let Some(answers) = just_address_answers {
        response.insert("just_address_answers".to_string(), Item::List(answers));
    }
    response
}

/// Aggregate per-record proofs: any bogus record makes the reply bogus, and
/// only an all-secure, non-empty answer is secure.
fn dnssec_status(records: &[&Record]) -> DnssecStatus {
    let mut status = DnssecStatus::Secure;
    if records.is_empty() {
        return DnssecStatus::Indeterminate;
    }
    for record in records {
        match record.proof() {
            Proof::Secure => {}
            Proof::Bogus => return DnssecStatus::Bogus,
            Proof::Insecure => status = DnssecStatus::Insecure,
            _ => {
                if status == DnssecStatus::Secure {
                    status = DnssecStatus::Indeterminate;
                }
            }
        }
    }
    status
}

pub(crate) fn record_to_item(record: &Record) -> Item {
    let mut rr = Dict::new();
    rr.insert("name".to_string(), Item::from(record.name().to_string()));
    rr.insert(
        "type".to_string(),
        Item::Int(i64::from(u16::from(record.record_type()))),
    );
    rr.insert(
        "class".to_string(),
        Item::Int(i64::from(u16::from(record.dns_class()))),
    );
    rr.insert("ttl".to_string(), Item::from(record.ttl()));
    rr.insert("rdata".to_string(), Item::Dict(rdata_to_dict(record.data())));
    Item::Dict(rr)
}

fn rdata_to_dict(data: &RData) -> Dict {
    let mut rdata = Dict::new();
    let mut put = |key: &str, value: Item| {
        rdata.insert(key.to_string(), value);
    };
    match data {
        RData::A(a) => put("ipv4_address", Item::Bindata(a.0.octets().to_vec())),
        RData::AAAA(aaaa) => put("ipv6_address", Item::Bindata(aaaa.0.octets().to_vec())),
        RData::CNAME(cname) => put("cname", Item::from(cname.0.to_string())),
        RData::NS(ns) => put("nsdname", Item::from(ns.0.to_string())),
        RData::PTR(ptr) => put("ptrdname", Item::from(ptr.0.to_string())),
        RData::MX(mx) => {
            put("preference", Item::Int(i64::from(mx.preference())));
            put("exchange", Item::from(mx.exchange().to_string()));
        }
        RData::SRV(srv) => {
            put("priority", Item::Int(i64::from(srv.priority())));
            put("weight", Item::Int(i64::from(srv.weight())));
            put("port", Item::Int(i64::from(srv.port())));
            put("target", Item::from(srv.target().to_string()));
        }
        RData::TXT(txt) => put(
            "txt_strings",
            Item::List(txt.iter().map(|s| Item::Bindata(s.to_vec())).collect()),
        ),
        RData::SOA(soa) => {
            put("mname", Item::from(soa.mname().to_string()));
            put("rname", Item::from(soa.rname().to_string()));
            put("serial", Item::from(soa.serial()));
            put("refresh", Item::Int(i64::from(soa.refresh())));
            put("retry", Item::Int(i64::from(soa.retry())));
            put("expire", Item::Int(i64::from(soa.expire())));
            put("minimum", Item::from(soa.minimum()));
        }
        other => put("rdata_text", Item::from(other.to_string())),
    }
    rdata
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    use hickory_resolver::proto::rr::{
        rdata::{A, MX},
        Name,
    };

    use super::*;

    fn item_dict(item: &Item) -> &Dict {
        item.as_dict().unwrap()
    }

    #[test]
    fn test_a_record_to_item() {
        let name = Name::from_str("example.com.").unwrap();
        let record = Record::from_rdata(name, 300, RData::A(A(Ipv4Addr::new(192, 0, 2, 7))));
        let item = record_to_item(&record);
        let rr = item_dict(&item);

        assert_eq!(rr.get("name"), Some(&Item::from("example.com.")));
        assert_eq!(rr.get("type"), Some(&Item::Int(1)));
        assert_eq!(rr.get("class"), Some(&Item::Int(1)));
        assert_eq!(rr.get("ttl"), Some(&Item::Int(300)));
        let rdata = item_dict(rr.get("rdata").unwrap());
        assert_eq!(
            rdata.get("ipv4_address"),
            Some(&Item::Bindata(vec![192, 0, 2, 7]))
        );
    }

    #[test]
    fn test_mx_record_keeps_field_order() {
        let name = Name::from_str("example.com.").unwrap();
        let exchange = Name::from_str("mail.example.com.").unwrap();
        let record = Record::from_rdata(name, 60, RData::MX(MX::new(10, exchange)));
        let item = record_to_item(&record);
        let rdata = item_dict(item_dict(&item).get("rdata").unwrap());
        let keys: Vec<&str> = rdata.keys().map(String::as_str).collect();
        assert_eq!(keys, ["preference", "exchange"]);
        assert_eq!(rdata.get("preference"), Some(&Item::Int(10)));
    }

    #[test]
    fn test_empty_response_shape() {
        let response = empty_response("nx.example.", ResponseStatus::NoName, 3);
        assert_eq!(response.get("status"), Some(&Item::Int(901)));
        assert_eq!(response.get("answer_type"), Some(&Item::Int(800)));
        let replies = response.get("replies_tree").unwrap().as_list().unwrap();
        let header = item_dict(item_dict(&replies[0]).get("header").unwrap());
        assert_eq!(header.get("rcode"), Some(&Item::Int(3)));
    }

    #[test]
    fn test_query_flags_from_extension() {
        let mut ext = Dict::new();
        ext.insert(
            "dnssec_return_only_secure".to_string(),
            Item::from(ExtensionFlag::True.code()),
        );
        let flags = QueryFlags::from_extension(Some(&ext), false).unwrap();
        assert!(flags.only_secure);
        assert!(!flags.dnssec_status);
        assert!(flags.needs_validation());

        assert_eq!(
            QueryFlags::from_extension(None, true).unwrap(),
            QueryFlags {
                dnssec_status: true,
                only_secure: false
            }
        );
    }

    #[test]
    fn test_query_flags_reject_unknown_and_misformed() {
        use crate::error::EngineError;

        let mut ext = Dict::new();
        ext.insert("no_such_thing".to_string(), Item::from(1000_u32));
        assert_eq!(
            QueryFlags::from_extension(Some(&ext), false),
            Err(EngineError::NoSuchExtension)
        );

        let mut ext = Dict::new();
        ext.insert("dnssec_return_status".to_string(), Item::from("yes"));
        assert_eq!(
            QueryFlags::from_extension(Some(&ext), false),
            Err(EngineError::ExtensionMisformat)
        );
    }

    #[test]
    fn test_dnssec_status_of_empty_answer() {
        assert_eq!(dnssec_status(&[]), DnssecStatus::Indeterminate);
    }
}
