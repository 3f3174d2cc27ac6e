//! Tagged values stored in the property cache.
//!
//! Every property read from the bus lands here as a [`Value`]. Bindings read
//! them back through [`FromValue`], which refuses to convert between tags:
//! a `u32` property is never silently handed out as an `i64`.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use zvariant::OwnedObjectPath;

use crate::Result;
use crate::api::models::BusError;

/// Property name as stored in the cache.
///
/// Shared between the cache and the events that mention a key, so cloning
/// it is a reference-count bump.
pub type PropertyName = Arc<str>;

/// A string-keyed dictionary of values, as returned by `GetProperties`.
pub type PropertyMap = HashMap<PropertyName, Value>;

/// Wire signature of each cached property, as the service sent it.
pub type PropertyKinds = HashMap<PropertyName, ValueKind>;

/// A decoded D-Bus value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Str(String),
    ObjectPath(String),
    Array(Vec<Value>),
    Dict(PropertyMap),
}

/// The static type of a value, parsed from a D-Bus signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    Str,
    ObjectPath,
    /// `g`. Decoded into [`Value::Str`].
    Signature,
    /// `v`, any value.
    Variant,
    Array(Box<ValueKind>),
    /// `a{s?}`. Keys are always strings in this layer.
    Dict(Box<ValueKind>),
    /// `(...)`. Decoded into [`Value::Array`] of the fields.
    Struct(Vec<ValueKind>),
}

impl Value {
    /// Returns the natural kind of this value.
    ///
    /// Arrays whose elements disagree, and empty arrays, are `av`; the same
    /// rule applies to dictionary values.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Byte(_) => ValueKind::Byte,
            Value::Int16(_) => ValueKind::Int16,
            Value::UInt16(_) => ValueKind::UInt16,
            Value::Int32(_) => ValueKind::Int32,
            Value::UInt32(_) => ValueKind::UInt32,
            Value::Int64(_) => ValueKind::Int64,
            Value::UInt64(_) => ValueKind::UInt64,
            Value::Double(_) => ValueKind::Double,
            Value::Str(_) => ValueKind::Str,
            Value::ObjectPath(_) => ValueKind::ObjectPath,
            Value::Array(items) => ValueKind::Array(Box::new(common_kind(items.iter()))),
            Value::Dict(map) => ValueKind::Dict(Box::new(common_kind(map.values()))),
        }
    }

    /// Short tag name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::Int16(_) => "int16",
            Value::UInt16(_) => "uint16",
            Value::Int32(_) => "int32",
            Value::UInt32(_) => "uint32",
            Value::Int64(_) => "int64",
            Value::UInt64(_) => "uint64",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::ObjectPath(_) => "object-path",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
        }
    }

    /// Returns the object path, if this is one.
    pub fn as_object_path(&self) -> Option<&str> {
        match self {
            Value::ObjectPath(p) => Some(p),
            _ => None,
        }
    }

    /// Returns the string, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Collects every object path held by this value.
    ///
    /// Looks at a scalar object path or an array of them; the null path `/`
    /// is skipped since services use it to mean "none".
    pub fn object_paths(&self) -> Vec<&str> {
        match self {
            Value::ObjectPath(p) if p != "/" => vec![p.as_str()],
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_object_path)
                .filter(|p| *p != "/")
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn common_kind<'a>(mut values: impl Iterator<Item = &'a Value>) -> ValueKind {
    let Some(first) = values.next() else {
        return ValueKind::Variant;
    };
    let kind = first.kind();
    if values.all(|v| v.kind() == kind) {
        kind
    } else {
        ValueKind::Variant
    }
}

impl ValueKind {
    /// Parses a complete D-Bus signature describing a single type.
    ///
    /// ```
    /// use busrs::ValueKind;
    ///
    /// let kind = ValueKind::parse("a{sv}").unwrap();
    /// assert_eq!(kind, ValueKind::Dict(Box::new(ValueKind::Variant)));
    /// ```
    pub fn parse(signature: &str) -> Result<Self> {
        let bytes = signature.as_bytes();
        let (kind, used) = parse_one(bytes, 0)
            .ok_or_else(|| BusError::UnsupportedSignature(signature.to_string()))?;
        if used != bytes.len() {
            return Err(BusError::UnsupportedSignature(signature.to_string()));
        }
        Ok(kind)
    }

    /// Whether `value` may be stored in (or sent as) this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueKind::Variant, _) => true,
            (ValueKind::Bool, Value::Bool(_))
            | (ValueKind::Byte, Value::Byte(_))
            | (ValueKind::Int16, Value::Int16(_))
            | (ValueKind::UInt16, Value::UInt16(_))
            | (ValueKind::Int32, Value::Int32(_))
            | (ValueKind::UInt32, Value::UInt32(_))
            | (ValueKind::Int64, Value::Int64(_))
            | (ValueKind::UInt64, Value::UInt64(_))
            | (ValueKind::Double, Value::Double(_))
            | (ValueKind::Str, Value::Str(_))
            | (ValueKind::Signature, Value::Str(_))
            | (ValueKind::ObjectPath, Value::ObjectPath(_)) => true,
            (ValueKind::Array(elem), Value::Array(items)) => items.iter().all(|v| elem.accepts(v)),
            (ValueKind::Dict(elem), Value::Dict(map)) => map.values().all(|v| elem.accepts(v)),
            (ValueKind::Struct(fields), Value::Array(items)) => {
                fields.len() == items.len() && fields.iter().zip(items).all(|(k, v)| k.accepts(v))
            }
            _ => false,
        }
    }
}

fn parse_one(sig: &[u8], at: usize) -> Option<(ValueKind, usize)> {
    let kind = match *sig.get(at)? {
        b'b' => ValueKind::Bool,
        b'y' => ValueKind::Byte,
        b'n' => ValueKind::Int16,
        b'q' => ValueKind::UInt16,
        b'i' => ValueKind::Int32,
        b'u' => ValueKind::UInt32,
        b'x' => ValueKind::Int64,
        b't' => ValueKind::UInt64,
        b'd' => ValueKind::Double,
        b's' => ValueKind::Str,
        b'o' => ValueKind::ObjectPath,
        b'g' => ValueKind::Signature,
        b'v' => ValueKind::Variant,
        b'a' if sig.get(at + 1) == Some(&b'{') => {
            // Only string-like keys are representable in the cache.
            if !matches!(sig.get(at + 2), Some(b's' | b'o' | b'g')) {
                return None;
            }
            let (value, next) = parse_one(sig, at + 3)?;
            if sig.get(next) != Some(&b'}') {
                return None;
            }
            return Some((ValueKind::Dict(Box::new(value)), next + 1));
        }
        b'a' => {
            let (elem, next) = parse_one(sig, at + 1)?;
            return Some((ValueKind::Array(Box::new(elem)), next));
        }
        b'(' => {
            let mut fields = Vec::new();
            let mut next = at + 1;
            while *sig.get(next)? != b')' {
                let (field, after) = parse_one(sig, next)?;
                fields.push(field);
                next = after;
            }
            if fields.is_empty() {
                return None;
            }
            return Some((ValueKind::Struct(fields), next + 1));
        }
        _ => return None,
    };
    Some((kind, at + 1))
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::Bool => write!(f, "b"),
            ValueKind::Byte => write!(f, "y"),
            ValueKind::Int16 => write!(f, "n"),
            ValueKind::UInt16 => write!(f, "q"),
            ValueKind::Int32 => write!(f, "i"),
            ValueKind::UInt32 => write!(f, "u"),
            ValueKind::Int64 => write!(f, "x"),
            ValueKind::UInt64 => write!(f, "t"),
            ValueKind::Double => write!(f, "d"),
            ValueKind::Str => write!(f, "s"),
            ValueKind::ObjectPath => write!(f, "o"),
            ValueKind::Signature => write!(f, "g"),
            ValueKind::Variant => write!(f, "v"),
            ValueKind::Array(elem) => write!(f, "a{elem}"),
            ValueKind::Dict(elem) => write!(f, "a{{s{elem}}}"),
            ValueKind::Struct(fields) => {
                write!(f, "(")?;
                for field in fields {
                    write!(f, "{field}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Conversion out of a cached [`Value`] with strict tag checking.
pub trait FromValue: Sized {
    /// Name of the expected tag, for error messages.
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;

    /// Converts or fails with [`BusError::TypeMismatch`].
    fn try_from_value(value: &Value) -> Result<Self> {
        Self::from_value(value).ok_or_else(|| BusError::TypeMismatch {
            expected: Self::EXPECTED.to_string(),
            found: value.type_name().to_string(),
        })
    }
}

macro_rules! scalar_from_value {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl FromValue for $ty {
            const EXPECTED: &'static str = $name;

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

scalar_from_value!(bool, Bool, "bool");
scalar_from_value!(u8, Byte, "byte");
scalar_from_value!(i16, Int16, "int16");
scalar_from_value!(u16, UInt16, "uint16");
scalar_from_value!(i32, Int32, "int32");
scalar_from_value!(u32, UInt32, "uint32");
scalar_from_value!(i64, Int64, "int64");
scalar_from_value!(u64, UInt64, "uint64");
scalar_from_value!(f64, Double, "double");
scalar_from_value!(String, Str, "string");
scalar_from_value!(Vec<Value>, Array, "array");
scalar_from_value!(PropertyMap, Dict, "dict");

impl FromValue for OwnedObjectPath {
    const EXPECTED: &'static str = "object-path";

    fn from_value(value: &Value) -> Option<Self> {
        OwnedObjectPath::try_from(value.as_object_path()?.to_string()).ok()
    }
}

impl FromValue for Vec<String> {
    const EXPECTED: &'static str = "array of strings";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.iter().map(|v| v.as_str().map(String::from)).collect(),
            _ => None,
        }
    }
}

impl FromValue for Vec<OwnedObjectPath> {
    const EXPECTED: &'static str = "array of object paths";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.iter().map(OwnedObjectPath::from_value).collect(),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    };
}

value_from!(bool, Bool);
value_from!(u8, Byte);
value_from!(i16, Int16);
value_from!(u16, UInt16);
value_from!(i32, Int32);
value_from!(u32, UInt32);
value_from!(i64, Int64);
value_from!(u64, UInt64);
value_from!(f64, Double);
value_from!(String, Str);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<OwnedObjectPath> for Value {
    fn from(v: OwnedObjectPath) -> Self {
        Value::ObjectPath(v.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scalar_signatures() {
        assert_eq!(ValueKind::parse("b").unwrap(), ValueKind::Bool);
        assert_eq!(ValueKind::parse("u").unwrap(), ValueKind::UInt32);
        assert_eq!(ValueKind::parse("o").unwrap(), ValueKind::ObjectPath);
        assert_eq!(ValueKind::parse("g").unwrap(), ValueKind::Signature);
    }

    #[test]
    fn parse_container_signatures() {
        assert_eq!(
            ValueKind::parse("ao").unwrap(),
            ValueKind::Array(Box::new(ValueKind::ObjectPath))
        );
        assert_eq!(
            ValueKind::parse("a{sa{sv}}").unwrap(),
            ValueKind::Dict(Box::new(ValueKind::Dict(Box::new(ValueKind::Variant))))
        );
        assert_eq!(
            ValueKind::parse("(uu)").unwrap(),
            ValueKind::Struct(vec![ValueKind::UInt32, ValueKind::UInt32])
        );
    }

    #[test]
    fn parse_rejects_malformed_signatures() {
        for sig in ["", "a", "a{s", "a{uv}", "()", "uu", "h", "(u"] {
            assert!(
                matches!(ValueKind::parse(sig), Err(BusError::UnsupportedSignature(_))),
                "signature {sig:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_round_trips_through_parse() {
        for sig in ["b", "as", "a{sv}", "(uas)", "aa{sv}"] {
            assert_eq!(ValueKind::parse(sig).unwrap().to_string(), sig);
        }
    }

    #[test]
    fn natural_kind_of_arrays() {
        let paths = Value::Array(vec![
            Value::ObjectPath("/a".into()),
            Value::ObjectPath("/b".into()),
        ]);
        assert_eq!(paths.kind(), ValueKind::Array(Box::new(ValueKind::ObjectPath)));

        let mixed = Value::Array(vec![Value::Bool(true), Value::UInt32(1)]);
        assert_eq!(mixed.kind(), ValueKind::Array(Box::new(ValueKind::Variant)));

        assert_eq!(
            Value::Array(Vec::new()).kind(),
            ValueKind::Array(Box::new(ValueKind::Variant))
        );
    }

    #[test]
    fn accepts_is_strict_about_tags() {
        assert!(ValueKind::Bool.accepts(&Value::Bool(false)));
        assert!(!ValueKind::Bool.accepts(&Value::Str("true".into())));
        assert!(!ValueKind::UInt32.accepts(&Value::Int32(1)));
        assert!(ValueKind::Variant.accepts(&Value::Str("anything".into())));
        assert!(
            ValueKind::Struct(vec![ValueKind::UInt32, ValueKind::UInt32])
                .accepts(&Value::Array(vec![Value::UInt32(100), Value::UInt32(0)]))
        );
    }

    #[test]
    fn from_value_reports_type_mismatch() {
        let v = Value::Str("on".into());
        assert_eq!(String::try_from_value(&v).unwrap(), "on");
        match bool::try_from_value(&v) {
            Err(BusError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, "bool");
                assert_eq!(found, "string");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn object_paths_skips_null_path() {
        let v = Value::Array(vec![
            Value::ObjectPath("/org/bluez/hci0".into()),
            Value::ObjectPath("/".into()),
        ]);
        assert_eq!(v.object_paths(), vec!["/org/bluez/hci0"]);
        assert!(Value::ObjectPath("/".into()).object_paths().is_empty());
        assert!(Value::Str("/not/a/path".into()).object_paths().is_empty());
    }

    #[test]
    fn object_path_vectors() {
        let v = Value::Array(vec![Value::ObjectPath("/x".into())]);
        let paths = Vec::<OwnedObjectPath>::try_from_value(&v).unwrap();
        assert_eq!(paths[0].as_str(), "/x");
        assert!(Vec::<String>::try_from_value(&v).is_err());
    }
}
