//! Host-side values: what items carry after decoding and before binding.

use std::any::{Any, TypeId};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use uuid::Uuid;

use super::numeric::{CqlDuration, Decimal, Varint};
use super::wire::WireValue;

// ---------------------------------------------------------------------------
// HostType
// ---------------------------------------------------------------------------

/// Identity of a user-defined host type carried in [`Value::Opaque`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpaqueType {
    pub id: TypeId,
    pub name: &'static str,
}

/// The host representation a value has, or a record field wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostType {
    Str,
    Int8,
    Int16,
    Int32,
    Int64,
    Bool,
    Float32,
    Float64,
    Varint,
    Decimal,
    Date,
    Timestamp,
    Uuid,
    Bytes,
    Inet,
    Duration,
    Composite,
    List,
    Set,
    Map,
    Opaque(OpaqueType),
    /// A wire value passed through untouched.
    Native,
    /// No preference; whatever the wire type decodes to.
    Any,
}

impl HostType {
    pub fn opaque<T: Any>() -> Self {
        HostType::Opaque(OpaqueType {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        })
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostType::Opaque(t) => f.write_str(t.name),
            other => write!(f, "{other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Opaque / Composite
// ---------------------------------------------------------------------------

/// A user value produced or consumed by a custom codec.
#[derive(Clone)]
pub struct Opaque {
    typ: OpaqueType,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            typ: OpaqueType {
                id: TypeId::of::<T>(),
                name: std::any::type_name::<T>(),
            },
            inner: Arc::new(value),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    pub fn opaque_type(&self) -> OpaqueType {
        self.typ
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({})", self.typ.name)
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Handle over a tuple or user-defined-type value; fields stay in wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite(WireValue);

impl Composite {
    /// Returns `None` unless `value` is a tuple or UDT.
    pub fn new(value: WireValue) -> Option<Self> {
        matches!(value, WireValue::Tuple(_) | WireValue::Udt { .. }).then_some(Self(value))
    }

    pub fn tuple(fields: Vec<Option<WireValue>>) -> Self {
        Self(WireValue::Tuple(fields))
    }

    /// Field values in declaration order, named for UDTs.
    pub fn fields(&self) -> Vec<(Option<&str>, Option<&WireValue>)> {
        match &self.0 {
            WireValue::Tuple(values) => values.iter().map(|v| (None, v.as_ref())).collect(),
            WireValue::Udt { fields, .. } => fields
                .iter()
                .map(|(name, v)| (Some(name.as_str()), v.as_ref()))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn as_wire(&self) -> &WireValue {
        &self.0
    }

    pub fn into_wire(self) -> WireValue {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Str(String),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Bool(bool),
    Float32(f32),
    Float64(f64),
    Varint(Varint),
    Decimal(Decimal),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Bytes(Bytes),
    Inet(IpAddr),
    Duration(CqlDuration),
    Composite(Composite),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Opaque(Opaque),
    Native(WireValue),
}

impl Value {
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Value::Opaque(Opaque::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `None` for [`Value::Null`], which has no host type.
    pub fn host_type(&self) -> Option<HostType> {
        let typ = match self {
            Value::Null => return None,
            Value::Str(_) => HostType::Str,
            Value::Int8(_) => HostType::Int8,
            Value::Int16(_) => HostType::Int16,
            Value::Int32(_) => HostType::Int32,
            Value::Int64(_) => HostType::Int64,
            Value::Bool(_) => HostType::Bool,
            Value::Float32(_) => HostType::Float32,
            Value::Float64(_) => HostType::Float64,
            Value::Varint(_) => HostType::Varint,
            Value::Decimal(_) => HostType::Decimal,
            Value::Date(_) => HostType::Date,
            Value::Timestamp(_) => HostType::Timestamp,
            Value::Uuid(_) => HostType::Uuid,
            Value::Bytes(_) => HostType::Bytes,
            Value::Inet(_) => HostType::Inet,
            Value::Duration(_) => HostType::Duration,
            Value::Composite(_) => HostType::Composite,
            Value::List(_) => HostType::List,
            Value::Set(_) => HostType::Set,
            Value::Map(_) => HostType::Map,
            Value::Opaque(o) => HostType::Opaque(o.opaque_type()),
            Value::Native(_) => HostType::Native,
        };
        Some(typ)
    }

    /// Text rendering for scalar values; `None` for values with no canonical text form.
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            Value::Str(s) => s.clone(),
            Value::Int8(v) => v.to_string(),
            Value::Int16(v) => v.to_string(),
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Float32(v) => v.to_string(),
            Value::Float64(v) => v.to_string(),
            Value::Varint(v) => v.to_string(),
            Value::Decimal(v) => v.to_string(),
            Value::Date(v) => v.to_string(),
            Value::Timestamp(v) => v.to_rfc3339(),
            Value::Uuid(v) => v.to_string(),
            Value::Inet(v) => v.to_string(),
            Value::Duration(v) => v.to_string(),
            _ => return None,
        };
        Some(text)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = self.as_text() {
            return f.write_str(&text);
        }
        match self {
            Value::Null => f.write_str("null"),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Composite(c) => write!(f, "{}", c.as_wire()),
            Value::List(values) => write!(f, "[{}]", values.iter().join(", ")),
            Value::Set(values) => write!(f, "{{{}}}", values.iter().join(", ")),
            Value::Map(entries) => write!(
                f,
                "{{{}}}",
                entries.iter().map(|(k, v)| format!("{k}: {v}")).join(", ")
            ),
            Value::Opaque(o) => write!(f, "{o:?}"),
            Value::Native(w) => write!(f, "{w}"),
            _ => Ok(()),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    String => Str,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    bool => Bool,
    f32 => Float32,
    f64 => Float64,
    Varint => Varint,
    Decimal => Decimal,
    NaiveDate => Date,
    DateTime<Utc> => Timestamp,
    Uuid => Uuid,
    Bytes => Bytes,
    IpAddr => Inet,
    CqlDuration => Duration,
    Composite => Composite,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
