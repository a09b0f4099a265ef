//! Engine-side structured values.
//!
//! Every response, extension and address record exchanged with an engine is
//! an [`Item`] tree. Dictionaries keep insertion order so that a value
//! converted to the host and back lists its keys in the same order.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use hashlink::LinkedHashMap;

/// Insertion-ordered dictionary of named items.
pub type Dict = LinkedHashMap<String, Item>;

/// Recursive structured value understood by a resolution engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// Named members, in insertion order
    Dict(Dict),
    /// Ordered list
    List(Vec<Item>),
    /// Signed or unsigned integer
    Int(i64),
    /// Raw bytes (addresses, wire-format names, opaque data)
    Bindata(Vec<u8>),
    /// UTF-8 text
    String(String),
}

impl Item {
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Self::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Item]> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bindata(&self) -> Option<&[u8]> {
        match self {
            Self::Bindata(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Dict> for Item {
    fn from(dict: Dict) -> Self {
        Self::Dict(dict)
    }
}

impl From<Vec<Item>> for Item {
    fn from(list: Vec<Item>) -> Self {
        Self::List(list)
    }
}

impl From<i64> for Item {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Item {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Item {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Item {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Dictionary key carrying the address family.
pub const ADDRESS_TYPE: &str = "address_type";
/// Dictionary key carrying the raw address bytes.
pub const ADDRESS_DATA: &str = "address_data";
/// Dictionary key carrying an optional port.
pub const PORT: &str = "port";

const IPV4: &str = "IPv4";
const IPV6: &str = "IPv6";

/// An address plus optional port, as used for upstream lists and reverse
/// lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: Option<u16>,
}

impl Endpoint {
    #[must_use]
    pub const fn new(addr: IpAddr) -> Self {
        Self { addr, port: None }
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Parse an address literal, trying the 4-byte form before the 16-byte
    /// form. Anything else (host names, CIDR, bracketed forms) is rejected.
    pub fn parse(literal: &str) -> Option<Self> {
        if let Ok(v4) = literal.parse::<Ipv4Addr>() {
            return Some(Self::new(IpAddr::V4(v4)));
        }
        literal
            .parse::<Ipv6Addr>()
            .ok()
            .map(|v6| Self::new(IpAddr::V6(v6)))
    }

    /// Render as `{ address_type, address_data[, port] }`.
    #[must_use]
    pub fn to_dict(&self) -> Dict {
        let (family, bytes) = match self.addr {
            IpAddr::V4(v4) => (IPV4, v4.octets().to_vec()),
            IpAddr::V6(v6) => (IPV6, v6.octets().to_vec()),
        };
        let mut dict = Dict::new();
        dict.insert(ADDRESS_TYPE.to_string(), Item::from(family));
        dict.insert(ADDRESS_DATA.to_string(), Item::Bindata(bytes));
        if let Some(port) = self.port {
            dict.insert(PORT.to_string(), Item::Int(i64::from(port)));
        }
        dict
    }

    /// Read an endpoint dictionary back. The raw byte length decides the
    /// family; `address_type`, when present, must agree with it.
    pub fn from_dict(dict: &Dict) -> Option<Self> {
        let data = dict.get(ADDRESS_DATA)?.as_bindata()?;
        let addr = match data.len() {
            4 => {
                let octets: [u8; 4] = data.try_into().ok()?;
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            16 => {
                let octets: [u8; 16] = data.try_into().ok()?;
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            _ => return None,
        };
        if let Some(family) = dict.get(ADDRESS_TYPE) {
            let expected = if addr.is_ipv4() { IPV4 } else { IPV6 };
            if family.as_str()? != expected {
                return None;
            }
        }
        let port = match dict.get(PORT) {
            Some(item) => Some(u16::try_from(item.as_int()?).ok()?),
            None => None,
        };
        Some(Self { addr, port })
    }
}
