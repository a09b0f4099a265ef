//! Name → option lookup.

use std::sync::LazyLock;

use dns_bridge_engine::{EngineContext, ResolutionType};
use hashlink::LinkedHashMap;

use super::{ContextOption, EndpointListOption, EnumOption, FlagOption, Uint16Option, Uint8Option};
use crate::error::BindingResult;
use crate::host::HostValue;

static DEFAULT_REGISTRY: LazyLock<OptionRegistry> = LazyLock::new(OptionRegistry::with_defaults);

type Table = LinkedHashMap<&'static str, Box<dyn ContextOption>>;

/// Option tables, checked in a fixed order: generic, then 8-bit, then
/// 16-bit. The numeric tables are only consulted for numeric values.
#[derive(Default)]
pub struct OptionRegistry {
    generic: Table,
    uint8: Table,
    uint16: Table,
}

impl OptionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry contexts dispatch through, built on first use.
    pub fn global() -> &'static Self {
        &DEFAULT_REGISTRY
    }

    fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register_generic(FlagOption::new("stub", |c, stub| {
                c.set_resolution_type(if stub {
                    ResolutionType::Stub
                } else {
                    ResolutionType::Recursing
                })
            }))
            .register_generic(EndpointListOption::new("upstreams"))
            .register_generic(EndpointListOption::new("upstream_recursive_servers"))
            .register_generic(EnumOption::new("timeout", |c, ms| {
                c.set_timeout(u64::from(ms))
            }))
            .register_generic(FlagOption::new("use_threads", |c, v| c.set_use_threads(v)))
            .register_generic(FlagOption::new("return_dnssec_status", |c, v| {
                c.set_return_dnssec_status(v)
            }))
            .register_generic(EnumOption::new("dns_transport", |c, code| {
                c.set_dns_transport(code.try_into()?)
            }))
            .register_generic(EnumOption::new("resolution_type", |c, code| {
                c.set_resolution_type(code.try_into()?)
            }));

        registry
            .register_uint8(Uint8Option::new("edns_extended_rcode", |c, v| {
                c.set_edns_extended_rcode(v)
            }))
            .register_uint8(Uint8Option::new("edns_version", |c, v| c.set_edns_version(v)))
            .register_uint8(Uint8Option::new("edns_do_bit", |c, v| c.set_edns_do_bit(v)));

        registry
            .register_uint16(Uint16Option::new("limit_outstanding_queries", |c, v| {
                c.set_limit_outstanding_queries(v)
            }))
            .register_uint16(Uint16Option::new("edns_maximum_udp_payload_size", |c, v| {
                c.set_edns_maximum_udp_payload_size(v)
            }))
            // Historical spelling, still accepted
            .register_uint16(Uint16Option::new("edns_maximum_udp_payloadSize", |c, v| {
                c.set_edns_maximum_udp_payload_size(v)
            }));
        registry
    }

    pub fn register_generic(&mut self, option: impl ContextOption + 'static) -> &mut Self {
        self.generic.insert(option.name(), Box::new(option));
        self
    }

    pub fn register_uint8(&mut self, option: impl ContextOption + 'static) -> &mut Self {
        self.uint8.insert(option.name(), Box::new(option));
        self
    }

    pub fn register_uint16(&mut self, option: impl ContextOption + 'static) -> &mut Self {
        self.uint16.insert(option.name(), Box::new(option));
        self
    }

    fn lookup(&self, name: &str, numeric: bool) -> Option<&dyn ContextOption> {
        if let Some(option) = self.generic.get(name) {
            return Some(option.as_ref());
        }
        if !numeric {
            return None;
        }
        let option = self.uint8.get(name).or_else(|| self.uint16.get(name))?;
        Some(option.as_ref())
    }

    /// Apply one named value. Names no table knows are ignored.
    pub fn apply(
        &self,
        context: &dyn EngineContext,
        name: &str,
        value: &HostValue,
    ) -> BindingResult<()> {
        match self.lookup(name, value.is_number()) {
            Some(option) => option.apply(context, value),
            None => {
                log::debug!("Ignoring unknown option {name}");
                Ok(())
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.generic.contains_key(name)
            || self.uint8.contains_key(name)
            || self.uint16.contains_key(name)
    }

    /// Every registered name, in table order.
    pub fn names(&self) -> Vec<&'static str> {
        self.generic
            .keys()
            .chain(self.uint8.keys())
            .chain(self.uint16.keys())
            .copied()
            .collect()
    }
}
