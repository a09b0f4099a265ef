//! Shared helpers for the context integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use dns_bridge_core::{Context, HostFault, HostLoop, HostValue};
use dns_bridge_engine::testing::{MockContext, MockEngine};
use dns_bridge_engine::{Dict, Item};

/// Host callback that records every invocation.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Vec<HostValue>>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> HostValue {
        let calls = Arc::clone(&self.calls);
        HostValue::function(move |args| {
            calls.lock().unwrap().push(args.to_vec());
            Ok(())
        })
    }

    /// A callback that records and then raises `msg`.
    pub fn throwing(&self, msg: &'static str) -> HostValue {
        let calls = Arc::clone(&self.calls);
        HostValue::function(move |args| {
            calls.lock().unwrap().push(args.to_vec());
            Err(HostFault::new(msg))
        })
    }

    pub fn calls(&self) -> Vec<Vec<HostValue>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Error object `code` of call `index`.
    pub fn error_code(&self, index: usize) -> Option<f64> {
        match self.calls().get(index)?.first()?.get("code")? {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// A context on a mock engine, plus the engine side of it.
pub struct Fixture {
    pub engine: MockEngine,
    pub host: HostLoop,
    pub ctx: Context,
    pub mock: Arc<MockContext>,
}

impl Fixture {
    pub fn new(options: &HostValue) -> Self {
        let engine = MockEngine::new();
        let host = HostLoop::new();
        let ctx = Context::new(&engine, &host, options).unwrap();
        let mock = engine.last_context().unwrap();
        Self {
            engine,
            host,
            ctx,
            mock,
        }
    }

    pub fn empty() -> Self {
        Self::new(&HostValue::Undefined)
    }
}

/// Minimal address response as an engine would produce it.
pub fn address_response(addr: &str) -> Dict {
    let mut answer = Dict::new();
    answer.insert("address_type".into(), Item::from("IPv4"));
    answer.insert(
        "address_data".into(),
        Item::Bindata(addr.parse::<std::net::Ipv4Addr>().unwrap().octets().to_vec()),
    );
    let mut dict = Dict::new();
    dict.insert("status".into(), Item::from(900_u32));
    dict.insert("just_address_answers".into(), Item::List(vec![Item::Dict(answer)]));
    dict
}
