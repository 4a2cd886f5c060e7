//! Typed values stored under a key

use std::fmt;

/// Native value type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// REG_SZ
    String,
    /// REG_DWORD
    U32,
    /// REG_QWORD
    U64,
    /// REG_BINARY
    Binary,
}

/// A named value's data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    U32(u32),
    U64(u64),
    Binary(Vec<u8>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::U32(_) => ValueKind::U32,
            Value::U64(_) => ValueKind::U64,
            Value::Binary(_) => ValueKind::Binary,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::Binary(b) => f.write_str(&hex::encode(b)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_are_type_strict() {
        let v = Value::from(7u32);
        assert_eq!(v.kind(), ValueKind::U32);
        assert_eq!(v.as_u32(), Some(7));
        assert_eq!(v.as_u64(), None);
        assert_eq!(v.as_str(), None);

        let v = Value::from("hello");
        assert_eq!(v.as_str(), Some("hello"));
        assert_eq!(v.as_bytes(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(vec![0xde, 0xad]).to_string(), "dead");
        assert_eq!(Value::from(vec![0x00, 0x0f]).to_string(), "000f");
        assert_eq!(Value::from(Vec::new()).to_string(), "");
        assert_eq!(Value::from(12u64).to_string(), "12");
        assert_eq!(Value::from("x").to_string(), "\"x\"");
    }
}
