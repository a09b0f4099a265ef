//! Named context options and the setters behind them.
//!
//! Each option kind is a [`ContextOption`] implementation; the
//! [`OptionRegistry`] maps names onto them. Engine refusals of a single value
//! are logged and otherwise ignored, so one bad option never aborts the rest
//! of an options record. Only the upstream list reports malformed input.

mod registry;

use dns_bridge_engine::{EngineContext, EngineResult, Item, PORT};

use crate::convert::endpoint_from_str;
use crate::error::{BindingError, BindingResult};
use crate::host::HostValue;

pub use registry::OptionRegistry;

/// A configurable property of a context.
pub trait ContextOption: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, context: &dyn EngineContext, value: &HostValue) -> BindingResult<()>;
}

fn log_rejection(name: &str, value: &HostValue, result: EngineResult<()>) {
    if let Err(e) = result {
        log::warn!(
            "Engine rejected option {name}={}: {e} ({})",
            value.to_host_string(),
            e.code()
        );
    }
}

type FlagSetter = fn(&dyn EngineContext, bool) -> EngineResult<()>;

/// Two-state option. Anything but boolean `true` selects the false state.
pub struct FlagOption {
    name: &'static str,
    setter: FlagSetter,
}

impl FlagOption {
    pub const fn new(name: &'static str, setter: FlagSetter) -> Self {
        Self { name, setter }
    }
}

impl ContextOption for FlagOption {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, context: &dyn EngineContext, value: &HostValue) -> BindingResult<()> {
        log_rejection(self.name, value, (self.setter)(context, value.is_true()));
        Ok(())
    }
}

type EnumSetter = fn(&dyn EngineContext, u32) -> EngineResult<()>;

/// Numeric option passed through as an unsigned 32-bit code. Non-numeric
/// values are ignored.
pub struct EnumOption {
    name: &'static str,
    setter: EnumSetter,
}

impl EnumOption {
    pub const fn new(name: &'static str, setter: EnumSetter) -> Self {
        Self { name, setter }
    }
}

impl ContextOption for EnumOption {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, context: &dyn EngineContext, value: &HostValue) -> BindingResult<()> {
        if value.is_number() {
            log_rejection(self.name, value, (self.setter)(context, value.to_uint32()));
        }
        Ok(())
    }
}

type Uint8Setter = fn(&dyn EngineContext, u8) -> EngineResult<()>;

/// 8-bit numeric option. The value is truncated to the low byte.
pub struct Uint8Option {
    name: &'static str,
    setter: Uint8Setter,
}

impl Uint8Option {
    pub const fn new(name: &'static str, setter: Uint8Setter) -> Self {
        Self { name, setter }
    }
}

impl ContextOption for Uint8Option {
    fn name(&self) -> &'static str {
        self.name
    }

    #[allow(clippy::cast_possible_truncation)]
    fn apply(&self, context: &dyn EngineContext, value: &HostValue) -> BindingResult<()> {
        if value.is_number() {
            let narrowed = value.to_uint32() as u8;
            log_rejection(self.name, value, (self.setter)(context, narrowed));
        }
        Ok(())
    }
}

type Uint16Setter = fn(&dyn EngineContext, u16) -> EngineResult<()>;

/// 16-bit numeric option. The value is truncated to the low two bytes.
pub struct Uint16Option {
    name: &'static str,
    setter: Uint16Setter,
}

impl Uint16Option {
    pub const fn new(name: &'static str, setter: Uint16Setter) -> Self {
        Self { name, setter }
    }
}

impl ContextOption for Uint16Option {
    fn name(&self) -> &'static str {
        self.name
    }

    #[allow(clippy::cast_possible_truncation)]
    fn apply(&self, context: &dyn EngineContext, value: &HostValue) -> BindingResult<()> {
        if value.is_number() {
            let narrowed = value.to_uint32() as u16;
            log_rejection(self.name, value, (self.setter)(context, narrowed));
        }
        Ok(())
    }
}

/// Upstream resolver list.
///
/// Elements are address strings or `[address, port]` pairs. The list is
/// built in full before it reaches the engine, so a bad element leaves the
/// context untouched. A numeric port outside `0..=65535` (negative ports wrap
/// out of range) makes its element invalid, reported as
/// `Upstream value is invalid: <element>`.
pub struct EndpointListOption {
    name: &'static str,
}

impl EndpointListOption {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    fn endpoint(element: &HostValue) -> Option<Item> {
        let dict = match element {
            HostValue::Array(tuple) => {
                let mut dict = endpoint_from_str(&tuple.first()?.to_host_string())?;
                if let Some(port) = tuple.get(1).filter(|p| p.is_number()) {
                    let port = u16::try_from(port.to_uint32()).ok()?;
                    dict.insert(PORT.to_string(), Item::from(u32::from(port)));
                }
                dict
            }
            other => endpoint_from_str(&other.to_host_string())?,
        };
        Some(Item::Dict(dict))
    }

    /// Build the engine form of an upstream list.
    pub fn build(elements: &[HostValue]) -> BindingResult<Vec<Item>> {
        elements
            .iter()
            .map(|element| {
                Self::endpoint(element).ok_or_else(|| {
                    BindingError::Conversion(format!(
                        "Upstream value is invalid: {}",
                        element.to_host_string()
                    ))
                })
            })
            .collect()
    }
}

impl ContextOption for EndpointListOption {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, context: &dyn EngineContext, value: &HostValue) -> BindingResult<()> {
        let elements = match value {
            HostValue::Array(elements) => elements,
            HostValue::Undefined | HostValue::Null => return Ok(()),
            other => {
                return Err(BindingError::Conversion(format!(
                    "Upstream value is invalid: {}",
                    other.to_host_string()
                )))
            }
        };
        let upstreams = Self::build(elements)?;
        context
            .set_upstream_recursive_servers(&upstreams)
            .map_err(|e| {
                log::warn!("Engine rejected {} upstreams: {e}", upstreams.len());
                BindingError::Conversion("Failed to set upstreams.".to_string())
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use dns_bridge_engine::testing::{MockContext, MockEngine, SetterCall};
    use dns_bridge_engine::{EngineError, Endpoint, ResolutionEngine};

    use super::*;

    fn mock() -> (Arc<dyn EngineContext>, Arc<MockContext>) {
        let engine = MockEngine::new();
        let ctx = engine.create_context(true).unwrap();
        (ctx, engine.last_context().unwrap())
    }

    fn endpoint(literal: &str, port: Option<u16>) -> Item {
        let ep = Endpoint::parse(literal).unwrap();
        let ep = match port {
            Some(port) => ep.with_port(port),
            None => ep,
        };
        Item::Dict(ep.to_dict())
    }

    #[test]
    fn test_flag_is_strict() {
        let (ctx, mock) = mock();
        let option = FlagOption::new("use_threads", |c, v| c.set_use_threads(v));
        option.apply(ctx.as_ref(), &HostValue::Bool(true)).unwrap();
        option.apply(ctx.as_ref(), &HostValue::Number(1.0)).unwrap();
        option.apply(ctx.as_ref(), &HostValue::from("yes")).unwrap();
        assert_eq!(
            mock.setter_calls(),
            vec![
                SetterCall::UseThreads(true),
                SetterCall::UseThreads(false),
                SetterCall::UseThreads(false)
            ]
        );
    }

    #[test]
    fn test_numeric_options_ignore_non_numbers() {
        let (ctx, mock) = mock();
        let timeout = EnumOption::new("timeout", |c, v| c.set_timeout(u64::from(v)));
        timeout.apply(ctx.as_ref(), &HostValue::from("500")).unwrap();
        timeout.apply(ctx.as_ref(), &HostValue::Number(500.7)).unwrap();
        let version = Uint8Option::new("edns_version", |c, v| c.set_edns_version(v));
        version.apply(ctx.as_ref(), &HostValue::Null).unwrap();
        version.apply(ctx.as_ref(), &HostValue::Number(257.0)).unwrap();
        let limit = Uint16Option::new("limit_outstanding_queries", |c, v| {
            c.set_limit_outstanding_queries(v)
        });
        limit.apply(ctx.as_ref(), &HostValue::Number(65_537.0)).unwrap();
        assert_eq!(
            mock.setter_calls(),
            vec![
                SetterCall::Timeout(500),
                SetterCall::EdnsVersion(1),
                SetterCall::LimitOutstandingQueries(1)
            ]
        );
    }

    #[test]
    fn test_engine_rejection_is_not_an_error() {
        let (ctx, mock) = mock();
        mock.reject_setter("dns_transport", EngineError::InvalidParameter);
        let transport = EnumOption::new("dns_transport", |c, v| {
            c.set_dns_transport(v.try_into()?)
        });
        assert!(transport.apply(ctx.as_ref(), &HostValue::Number(541.0)).is_ok());
        assert_eq!(mock.setter_calls().len(), 1);
    }

    #[test]
    fn test_upstream_list_shapes() {
        let (ctx, mock) = mock();
        let option = EndpointListOption::new("upstreams");
        let value = HostValue::from(vec![
            HostValue::from("1.2.3.4"),
            HostValue::from(vec![HostValue::from("2001:db8::1"), HostValue::from(5353_u32)]),
            HostValue::from(vec![HostValue::from("9.9.9.9"), HostValue::from("53")]),
        ]);
        option.apply(ctx.as_ref(), &value).unwrap();
        assert_eq!(
            mock.setter_calls(),
            vec![SetterCall::UpstreamRecursiveServers(vec![
                endpoint("1.2.3.4", None),
                endpoint("2001:db8::1", Some(5353)),
                endpoint("9.9.9.9", None),
            ])]
        );
    }

    #[test]
    fn test_bad_upstream_commits_nothing() {
        let (ctx, mock) = mock();
        let option = EndpointListOption::new("upstreams");
        let value = HostValue::from(vec![HostValue::from("1.2.3.4"), HostValue::from("not-an-ip")]);
        let err = option.apply(ctx.as_ref(), &value).unwrap_err();
        assert_eq!(
            err,
            BindingError::Conversion("Upstream value is invalid: not-an-ip".into())
        );
        assert!(err.is_type_error());

        let empty_tuple = HostValue::from(vec![HostValue::Array(vec![])]);
        assert!(option.apply(ctx.as_ref(), &empty_tuple).is_err());
        assert!(mock.setter_calls().is_empty());
    }

    #[test]
    fn test_out_of_range_port_invalidates_the_element() {
        let (ctx, mock) = mock();
        let option = EndpointListOption::new("upstreams");
        let too_large = HostValue::from(vec![HostValue::from(vec![
            HostValue::from("1.2.3.4"),
            HostValue::from(70_000_u32),
        ])]);
        assert_eq!(
            option.apply(ctx.as_ref(), &too_large),
            Err(BindingError::Conversion(
                "Upstream value is invalid: 1.2.3.4,70000".into()
            ))
        );
        let negative = HostValue::from(vec![HostValue::from(vec![
            HostValue::from("1.2.3.4"),
            HostValue::Number(-1.0),
        ])]);
        assert_eq!(
            option.apply(ctx.as_ref(), &negative),
            Err(BindingError::Conversion(
                "Upstream value is invalid: 1.2.3.4,-1".into()
            ))
        );
        assert!(mock.setter_calls().is_empty());
    }

    #[test]
    fn test_upstreams_refused_by_engine() {
        let (ctx, mock) = mock();
        mock.reject_setter("upstream_recursive_servers", EngineError::InvalidParameter);
        let option = EndpointListOption::new("upstreams");
        let err = option
            .apply(ctx.as_ref(), &HostValue::from(vec![HostValue::from("::1")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to set upstreams.");
    }

    #[test]
    fn test_upstreams_non_array() {
        let (ctx, mock) = mock();
        let option = EndpointListOption::new("upstreams");
        assert!(option.apply(ctx.as_ref(), &HostValue::Null).is_ok());
        assert!(option.apply(ctx.as_ref(), &HostValue::from("1.1.1.1")).is_err());
        assert!(mock.setter_calls().is_empty());
    }
}
