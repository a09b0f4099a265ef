//! Context settings and the resolver they produce.

use std::net::SocketAddr;
use std::time::Duration;

use hickory_resolver::{
    config::{NameServerConfig, NameServerConfigGroup, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    proto::xfer::Protocol,
    TokioResolver,
};

use crate::error::{EngineError, EngineResult};
use crate::item::{Endpoint, Item};
use crate::types::{ResolutionType, Transport};

const DNS_PORT: u16 = 53;

/// Everything a context can be configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub from_os: bool,
    pub resolution_type: ResolutionType,
    pub transport: Transport,
    pub timeout: Option<Duration>,
    pub return_dnssec_status: bool,
    pub edns_do_bit: u8,
    pub edns_maximum_udp_payload_size: u16,
    pub upstreams: Vec<Endpoint>,
}

impl Settings {
    pub fn new(from_os: bool) -> Self {
        Self {
            from_os,
            resolution_type: ResolutionType::Stub,
            transport: Transport::UdpFirstAndFallBackToTcp,
            timeout: None,
            return_dnssec_status: false,
            edns_do_bit: 0,
            edns_maximum_udp_payload_size: 0,
            upstreams: Vec::new(),
        }
    }

    /// Only stub resolution is available: recursion is delegated to the
    /// configured upstreams.
    pub fn check_resolution_type(value: ResolutionType) -> EngineResult<()> {
        match value {
            ResolutionType::Stub => Ok(()),
            ResolutionType::Recursing => Err(EngineError::NotImplemented),
        }
    }

    pub fn check_transport(value: Transport) -> EngineResult<()> {
        match value {
            Transport::TlsOnlyKeepConnectionsOpen
            | Transport::TlsFirstAndFallBackToTcpKeepConnectionsOpen => {
                Err(EngineError::NotImplemented)
            }
            _ => Ok(()),
        }
    }

    /// Decode an upstream list. Any malformed entry rejects the whole list.
    pub fn parse_upstreams(items: &[Item]) -> EngineResult<Vec<Endpoint>> {
        items
            .iter()
            .map(|item| {
                item.as_dict()
                    .and_then(Endpoint::from_dict)
                    .ok_or(EngineError::InvalidParameter)
            })
            .collect()
    }

    fn apply_options(&self, opts: &mut ResolverOpts) {
        if let Some(timeout) = self.timeout {
            opts.timeout = timeout;
        }
        opts.edns0 = self.edns_do_bit != 0 || self.edns_maximum_udp_payload_size > 0;
        opts.validate = self.return_dnssec_status;
    }

    fn name_servers(&self) -> NameServerConfigGroup {
        let protocols: &[Protocol] = match self.transport {
            Transport::UdpOnly => &[Protocol::Udp],
            Transport::TcpOnly | Transport::TcpOnlyKeepConnectionsOpen => &[Protocol::Tcp],
            _ => &[Protocol::Udp, Protocol::Tcp],
        };
        let mut servers = Vec::with_capacity(self.upstreams.len() * protocols.len());
        for upstream in &self.upstreams {
            let addr = SocketAddr::new(upstream.addr, upstream.port.unwrap_or(DNS_PORT));
            for protocol in protocols {
                let mut server = NameServerConfig::new(addr, *protocol);
                server.trust_negative_responses = true;
                servers.push(server);
            }
        }
        NameServerConfigGroup::from(servers)
    }

    /// Build a resolver for the current settings.
    ///
    /// Without upstreams a context created from the OS uses the host system
    /// configuration (falling back to Hickory defaults when it cannot be
    /// read); a context created empty uses Hickory defaults directly.
    pub fn build_resolver(&self) -> TokioResolver {
        #[cfg(any(unix, target_os = "windows"))]
        {
            if self.upstreams.is_empty() && self.from_os {
                match TokioResolver::builder_tokio() {
                    Ok(mut builder) => {
                        self.apply_options(builder.options_mut());
                        return builder.build();
                    }
                    Err(e) => {
                        log::warn!(
                            "Failed to load system DNS configuration, falling back to defaults: {e}"
                        );
                    }
                }
            }
        }

        let config = if self.upstreams.is_empty() {
            ResolverConfig::default()
        } else {
            ResolverConfig::from_parts(None, vec![], self.name_servers())
        };
        let mut opts = ResolverOpts::default();
        self.apply_options(&mut opts);
        TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn upstream(literal: &str, port: Option<u16>) -> Endpoint {
        let ep = Endpoint::parse(literal).unwrap();
        match port {
            Some(port) => ep.with_port(port),
            None => ep,
        }
    }

    #[test]
    fn test_recursing_not_supported() {
        assert!(Settings::check_resolution_type(ResolutionType::Stub).is_ok());
        assert_eq!(
            Settings::check_resolution_type(ResolutionType::Recursing),
            Err(EngineError::NotImplemented)
        );
    }

    #[test]
    fn test_tls_transports_not_supported() {
        assert!(Settings::check_transport(Transport::TcpOnly).is_ok());
        assert_eq!(
            Settings::check_transport(Transport::TlsOnlyKeepConnectionsOpen),
            Err(EngineError::NotImplemented)
        );
    }

    #[test]
    fn test_parse_upstreams_all_or_nothing() {
        let good = Item::Dict(upstream("9.9.9.9", Some(5353)).to_dict());
        let parsed = Settings::parse_upstreams(std::slice::from_ref(&good)).unwrap();
        assert_eq!(parsed, vec![upstream("9.9.9.9", Some(5353))]);

        let bad = Item::from("9.9.9.9");
        assert_eq!(
            Settings::parse_upstreams(&[good, bad]),
            Err(EngineError::InvalidParameter)
        );
    }

    #[test]
    fn test_name_servers_follow_transport() {
        let mut settings = Settings::new(false);
        settings.upstreams = vec![upstream("192.0.2.53", None), upstream("2001:db8::53", Some(54))];

        let group = settings.name_servers();
        assert_eq!(group.len(), 4, "UDP and TCP per upstream");
        assert_eq!(group[0].socket_addr, "192.0.2.53:53".parse().unwrap());
        assert_eq!(group[2].socket_addr, "[2001:db8::53]:54".parse().unwrap());

        settings.transport = Transport::TcpOnly;
        let group = settings.name_servers();
        assert_eq!(group.len(), 2);
        assert!(group.iter().all(|ns| ns.protocol == Protocol::Tcp));
    }

    #[test]
    fn test_apply_options() {
        let mut settings = Settings::new(false);
        settings.timeout = Some(Duration::from_millis(500));
        settings.edns_do_bit = 1;
        settings.return_dnssec_status = true;

        let mut opts = ResolverOpts::default();
        settings.apply_options(&mut opts);
        assert_eq!(opts.timeout, Duration::from_millis(500));
        assert!(opts.edns0);
        assert!(opts.validate);
    }

    #[test]
    fn test_build_resolver_with_upstreams() {
        let mut settings = Settings::new(false);
        settings.upstreams = vec![upstream("1.1.1.1", None)];
        // Should not panic
        let _resolver = settings.build_resolver();
    }

    #[test]
    fn test_build_resolver_from_os() {
        // Should not panic -- falls back to defaults when no system config
        let _resolver = Settings::new(true).build_resolver();
    }
}
