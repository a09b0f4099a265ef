//! The host's native value model.

use std::fmt;
use std::sync::Arc;

use hashlink::LinkedHashMap;
use thiserror::Error;

/// Insertion-ordered host record.
pub type HostObject = LinkedHashMap<String, HostValue>;

/// Fault raised by a host callback while it runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HostFault(pub String);

impl HostFault {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

type Callable = dyn Fn(&[HostValue]) -> Result<(), HostFault> + Send + Sync;

/// A callable host value.
#[derive(Clone)]
pub struct HostFunction(Arc<Callable>);

impl HostFunction {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[HostValue]) -> Result<(), HostFault> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, args: &[HostValue]) -> Result<(), HostFault> {
        (self.0)(args)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostFunction")
    }
}

/// Identity comparison, like host object equality.
impl PartialEq for HostFunction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A value as the scripting host sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Fixed-length byte buffer
    Buffer(Vec<u8>),
    Array(Vec<HostValue>),
    /// Plain key-value record
    Object(HostObject),
    Function(HostFunction),
}

impl HostValue {
    /// Build a record from key-value pairs, keeping their order.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, HostValue)>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[HostValue]) -> Result<(), HostFault> + Send + Sync + 'static,
    {
        Self::Function(HostFunction::new(f))
    }

    /// Member of a record; `None` for anything else.
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        match self {
            Self::Object(obj) => obj.get(key),
            _ => None,
        }
    }

    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// Strictly the boolean `true`; truthy values do not count.
    pub const fn is_true(&self) -> bool {
        matches!(self, Self::Bool(true))
    }

    pub const fn is_function(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Anything with identity: records, arrays, buffers and functions.
    pub const fn is_object(&self) -> bool {
        matches!(
            self,
            Self::Object(_) | Self::Array(_) | Self::Buffer(_) | Self::Function(_)
        )
    }

    /// A plain record, not an array, buffer or function.
    pub const fn is_dictionary_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub const fn as_function(&self) -> Option<&HostFunction> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&[u8]> {
        match self {
            Self::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Host `ToNumber`.
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    0.0
                } else {
                    s.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// Host `ToUint32`: truncate toward zero, wrap modulo 2^32, non-finite is 0.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_uint32(&self) -> u32 {
        const TWO_32: f64 = 4_294_967_296.0;
        let n = self.to_number();
        if !n.is_finite() {
            return 0;
        }
        n.trunc().rem_euclid(TWO_32) as u32
    }

    /// Host `ToString`.
    pub fn to_host_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => number_to_string(*n),
            Self::String(s) => s.clone(),
            Self::Buffer(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Self::Array(items) => items
                .iter()
                .map(|v| match v {
                    Self::Undefined | Self::Null => String::new(),
                    other => other.to_host_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => "[object Object]".to_string(),
            Self::Function(_) => "function () { [native code] }".to_string(),
        }
    }
}

#[allow(clippy::float_cmp)]
fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        // Covers -0 too
        format!("{:.0}", if n == 0.0 { 0.0 } else { n })
    } else {
        n.to_string()
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for HostValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(value: Vec<HostValue>) -> Self {
        Self::Array(value)
    }
}

impl From<HostFunction> for HostValue {
    fn from(value: HostFunction) -> Self {
        Self::Function(value)
    }
}

/// JSON documents map onto host values the way the host's own parser does.
impl From<serde_json::Value> for HostValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::object(map.into_iter().map(|(k, v)| (k, Self::from(v)))),
        }
    }
}
