//! Conversion between wire values and cached [`Value`]s.
//!
//! Decoding never hands back a half-built container: either the whole value
//! converts or the caller gets an error and must drop the message.

use std::collections::HashMap;

use zbus::Message;
use zvariant::{ObjectPath, Structure, StructureBuilder};

use crate::Result;
use crate::api::models::BusError;
use crate::dbus::{Argument, WireValue};
use crate::types::value::{FromValue, PropertyKinds, PropertyMap, PropertyName, Value, ValueKind};

type Wire = zvariant::Value<'static>;

/// Decodes one complete wire value.
///
/// Nested variants are unwrapped, structures become arrays of their fields.
pub fn decode(wire: &zvariant::Value<'_>) -> Result<Value> {
    use zvariant::Value as W;

    Ok(match wire {
        W::Bool(b) => Value::Bool(*b),
        W::U8(v) => Value::Byte(*v),
        W::I16(v) => Value::Int16(*v),
        W::U16(v) => Value::UInt16(*v),
        W::I32(v) => Value::Int32(*v),
        W::U32(v) => Value::UInt32(*v),
        W::I64(v) => Value::Int64(*v),
        W::U64(v) => Value::UInt64(*v),
        W::F64(v) => Value::Double(*v),
        W::Str(s) => Value::Str(s.as_str().to_string()),
        W::Signature(s) => Value::Str(s.to_string()),
        W::ObjectPath(p) => Value::ObjectPath(p.as_str().to_string()),
        W::Value(inner) => decode(inner)?,
        W::Array(items) => Value::Array(items.iter().map(decode).collect::<Result<_>>()?),
        W::Dict(dict) => {
            let mut map = PropertyMap::new();
            for (key, value) in dict.iter() {
                map.insert(dict_key(key)?.into(), decode(value)?);
            }
            Value::Dict(map)
        }
        W::Structure(fields) => {
            Value::Array(fields.fields().iter().map(decode).collect::<Result<_>>()?)
        }
        other => {
            return Err(BusError::TypeMismatch {
                expected: "representable value".into(),
                found: other.value_signature().to_string(),
            });
        }
    })
}

fn dict_key(key: &zvariant::Value<'_>) -> Result<String> {
    use zvariant::Value as W;

    match key {
        W::Str(s) => Ok(s.as_str().to_string()),
        W::ObjectPath(p) => Ok(p.as_str().to_string()),
        W::Signature(s) => Ok(s.to_string()),
        W::Value(inner) => dict_key(inner),
        other => Err(BusError::TypeMismatch {
            expected: "string dictionary key".into(),
            found: other.value_signature().to_string(),
        }),
    }
}

/// Decodes a value together with the signature it travelled under.
///
/// Variants are looked through, so `v "dhcp"` yields `s`.
pub fn decode_typed(wire: &zvariant::Value<'_>) -> Result<(Value, ValueKind)> {
    if let zvariant::Value::Value(inner) = wire {
        return decode_typed(inner);
    }
    let kind = ValueKind::parse(&wire.value_signature().to_string())?;
    Ok((decode(wire)?, kind))
}

/// Decodes a string-keyed dictionary, keeping the signature of every entry.
pub fn decode_properties(wire: &zvariant::Value<'_>) -> Result<(PropertyMap, PropertyKinds)> {
    let zvariant::Value::Dict(dict) = wire else {
        return Err(BusError::TypeMismatch {
            expected: "a{sv}".into(),
            found: wire.value_signature().to_string(),
        });
    };
    let mut props = PropertyMap::new();
    let mut kinds = PropertyKinds::new();
    for (key, value) in dict.iter() {
        let key: PropertyName = dict_key(key)?.into();
        let (value, kind) = decode_typed(value)?;
        kinds.insert(key.clone(), kind);
        props.insert(key, value);
    }
    Ok((props, kinds))
}

/// Decodes every argument of a reply or signal.
pub fn decode_all(args: &[WireValue]) -> Result<Vec<Value>> {
    args.iter().map(|arg| decode(arg)).collect()
}

/// Extracts the property dictionary, with signatures, from a
/// `GetProperties` or `GetAll` reply.
pub fn properties_from_wire(args: &[WireValue]) -> Result<(PropertyMap, PropertyKinds)> {
    match args.first() {
        Some(dict) => decode_properties(dict),
        None => Err(BusError::TypeMismatch {
            expected: "a{sv}".into(),
            found: "empty reply".into(),
        }),
    }
}

/// Decodes a wire value and checks it against the expected kind.
pub fn decode_as(wire: &zvariant::Value<'_>, expected: &ValueKind) -> Result<Value> {
    let value = decode(wire)?;
    if !expected.accepts(&value) {
        return Err(BusError::TypeMismatch {
            expected: expected.to_string(),
            found: value.kind().to_string(),
        });
    }
    Ok(value)
}

/// Extracts the property dictionary from a decoded `GetProperties` reply.
pub fn properties_from_reply(args: Vec<Value>) -> Result<PropertyMap> {
    match args.into_iter().next() {
        Some(Value::Dict(map)) => Ok(map),
        Some(other) => Err(BusError::TypeMismatch {
            expected: "a{sv}".into(),
            found: other.kind().to_string(),
        }),
        None => Err(BusError::TypeMismatch {
            expected: "a{sv}".into(),
            found: "empty reply".into(),
        }),
    }
}

/// Splits a message body into owned arguments, signatures intact.
pub fn wire_body(message: &Message) -> Result<Vec<WireValue>> {
    let body = message.body();
    if body.signature().to_string().is_empty() {
        return Ok(Vec::new());
    }
    let fields: Structure<'_> = body.deserialize()?;
    fields
        .into_fields()
        .into_iter()
        .map(|field| Ok(WireValue::try_from(field)?))
        .collect()
}

/// Encodes a value for a target of static type `kind`.
///
/// Fails with [`BusError::SignatureMismatch`] when the value's tag cannot be
/// stored in `kind`, e.g. a string written into a boolean property.
pub fn encode(value: &Value, kind: &ValueKind) -> Result<Wire> {
    if !kind.accepts(value) {
        return Err(BusError::SignatureMismatch {
            expected: kind.to_string(),
            found: value.kind().to_string(),
        });
    }
    encode_checked(value, kind)
}

fn encode_checked(value: &Value, kind: &ValueKind) -> Result<Wire> {
    Ok(match (kind, value) {
        (ValueKind::Variant, v) => encode_checked(v, &v.kind())?,
        (ValueKind::Struct(_) | ValueKind::Signature, _) => {
            return Err(BusError::UnsupportedSignature(kind.to_string()));
        }
        (_, Value::Bool(v)) => Wire::Bool(*v),
        (_, Value::Byte(v)) => Wire::U8(*v),
        (_, Value::Int16(v)) => Wire::I16(*v),
        (_, Value::UInt16(v)) => Wire::U16(*v),
        (_, Value::Int32(v)) => Wire::I32(*v),
        (_, Value::UInt32(v)) => Wire::U32(*v),
        (_, Value::Int64(v)) => Wire::I64(*v),
        (_, Value::UInt64(v)) => Wire::U64(*v),
        (_, Value::Double(v)) => Wire::F64(*v),
        (_, Value::Str(s)) => Wire::from(s.clone()),
        (_, Value::ObjectPath(p)) => Wire::ObjectPath(object_path(p)?),
        (ValueKind::Array(elem), Value::Array(items)) => encode_array(elem, items)?,
        (ValueKind::Dict(elem), Value::Dict(map)) => encode_dict(elem, map)?,
        _ => {
            return Err(BusError::SignatureMismatch {
                expected: kind.to_string(),
                found: value.kind().to_string(),
            });
        }
    })
}

fn object_path(path: &str) -> Result<ObjectPath<'static>> {
    ObjectPath::try_from(path.to_string()).map_err(|_| BusError::TypeMismatch {
        expected: "object-path".into(),
        found: format!("malformed path {path:?}"),
    })
}

fn collect<T: FromValue>(items: &[Value]) -> Result<Vec<T>> {
    items.iter().map(T::try_from_value).collect()
}

fn encode_array(elem: &ValueKind, items: &[Value]) -> Result<Wire> {
    Ok(match elem {
        ValueKind::Bool => Wire::from(collect::<bool>(items)?),
        ValueKind::Byte => Wire::from(collect::<u8>(items)?),
        ValueKind::Int16 => Wire::from(collect::<i16>(items)?),
        ValueKind::UInt16 => Wire::from(collect::<u16>(items)?),
        ValueKind::Int32 => Wire::from(collect::<i32>(items)?),
        ValueKind::UInt32 => Wire::from(collect::<u32>(items)?),
        ValueKind::Int64 => Wire::from(collect::<i64>(items)?),
        ValueKind::UInt64 => Wire::from(collect::<u64>(items)?),
        ValueKind::Double => Wire::from(collect::<f64>(items)?),
        ValueKind::Str => Wire::from(collect::<String>(items)?),
        ValueKind::ObjectPath => {
            let paths = items
                .iter()
                .map(|v| object_path(v.as_object_path().unwrap_or_default()))
                .collect::<Result<Vec<_>>>()?;
            Wire::from(paths)
        }
        ValueKind::Variant => {
            let values = items
                .iter()
                .map(|v| encode_checked(v, &v.kind()))
                .collect::<Result<Vec<Wire>>>()?;
            Wire::from(values)
        }
        other => return Err(BusError::UnsupportedSignature(format!("a{other}"))),
    })
}

fn encode_dict(elem: &ValueKind, map: &PropertyMap) -> Result<Wire> {
    Ok(match elem {
        ValueKind::Variant => {
            let mut out: HashMap<String, Wire> = HashMap::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.to_string(), encode_checked(value, &value.kind())?);
            }
            Wire::from(out)
        }
        ValueKind::Str => {
            let mut out: HashMap<String, String> = HashMap::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.to_string(), String::try_from_value(value)?);
            }
            Wire::from(out)
        }
        other => return Err(BusError::UnsupportedSignature(format!("a{{s{other}}}"))),
    })
}

/// Encodes one method argument, boxing it into a variant when requested.
pub(crate) fn encode_argument(arg: &Argument) -> Result<Wire> {
    let wire = encode(&arg.value, &arg.kind)?;
    Ok(if arg.variant {
        Wire::Value(Box::new(wire))
    } else {
        wire
    })
}

/// Builds a message body out of the arguments, `None` for an empty body.
pub(crate) fn encode_arguments(args: &[Argument]) -> Result<Option<Structure<'static>>> {
    if args.is_empty() {
        return Ok(None);
    }
    let mut builder = StructureBuilder::new();
    for arg in args {
        builder = builder.append_field(encode_argument(arg)?);
    }
    Ok(Some(builder.build()?))
}
