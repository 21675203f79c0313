//! Object mode: user types described once as a table of field accessors.

use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, LazyLock, Mutex};

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use unicase::UniCase;
use uuid::Uuid;

use crate::base::{Composite, CqlDuration, Decimal, HostType, Value, Varint};
use crate::error::{Error, Result};
use crate::internal::typemap::TypeMap;

// ---------------------------------------------------------------------------
// HostValue
// ---------------------------------------------------------------------------

/// A Rust type that can sit in a record field.
pub trait HostValue: Sized {
    /// Passed to codecs as the desired type when decoding into this field.
    fn host_type() -> HostType;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self>;
}

fn unexpected<T>(value: &Value) -> Error {
    Error::conversion(format!(
        "cannot assign `{value}` to a field of type {}",
        std::any::type_name::<T>()
    ))
}

macro_rules! host_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl HostValue for $ty {
                fn host_type() -> HostType {
                    HostType::$variant
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(unexpected::<Self>(&other)),
                    }
                }
            }
        )*
    };
}

host_value! {
    String => Str,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    bool => Bool,
    f32 => Float32,
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

impl HostValue for i64 {
    fn host_type() -> HostType {
        HostType::Int64
    }

    fn into_value(self) -> Value {
        Value::Int64(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int8(v) => Ok(v.into()),
            Value::Int16(v) => Ok(v.into()),
            Value::Int32(v) => Ok(v.into()),
            Value::Int64(v) => Ok(v),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

impl HostValue for f64 {
    fn host_type() -> HostType {
        HostType::Float64
    }

    fn into_value(self) -> Value {
        Value::Float64(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float32(v) => Ok(v.into()),
            Value::Float64(v) => Ok(v),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

/// `None` writes as null and reads back from null.
impl<T: HostValue> HostValue for Option<T> {
    fn host_type() -> HostType {
        T::host_type()
    }

    fn into_value(self) -> Value {
        self.map_or(Value::Null, T::into_value)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            value => T::from_value(value).map(Some),
        }
    }
}

/// Accepts both lists and sets on read; writes as a list.
impl<T: HostValue> HostValue for Vec<T> {
    fn host_type() -> HostType {
        HostType::List
    }

    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(T::into_value).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(items) | Value::Set(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

impl HostValue for Value {
    fn host_type() -> HostType {
        HostType::Any
    }

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One failed constraint on a materialized record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub value: String,
    pub message: String,
}

impl Violation {
    pub fn new(
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}: {}", self.field, self.value, self.message)
    }
}

/// A user type read and written in object mode.
///
/// ```
/// use cocoindex_cassandra::{Record, RecordSchemaBuilder};
///
/// #[derive(Default)]
/// struct Trade {
///     symbol: String,
///     price: Option<f64>,
/// }
///
/// impl Record for Trade {
///     fn describe(schema: &mut RecordSchemaBuilder<Self>) {
///         schema
///             .field("symbol", |t| &t.symbol, |t| &mut t.symbol)
///             .field("price", |t| &t.price, |t| &mut t.price);
///     }
/// }
/// ```
pub trait Record: Default + Send + 'static {
    fn describe(schema: &mut RecordSchemaBuilder<Self>);

    /// Runs after every mapped column has been assigned on read.
    fn validate(&self) -> std::result::Result<(), Vec<Violation>> {
        Ok(())
    }
}

/// Placeholder record for readers and writers that never use object mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Untyped;

impl Record for Untyped {
    fn describe(_: &mut RecordSchemaBuilder<Self>) {}
}

// ---------------------------------------------------------------------------
// RecordSchema
// ---------------------------------------------------------------------------

type Getter<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, Value) -> Result<()> + Send + Sync>;

pub struct FieldAccessor<T> {
    name: String,
    host_type: HostType,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> FieldAccessor<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host_type(&self) -> &HostType {
        &self.host_type
    }

    pub fn get(&self, record: &T) -> Value {
        (self.get)(record)
    }

    pub fn set(&self, record: &mut T, value: Value) -> Result<()> {
        (self.set)(record, value).map_err(|e| match e {
            Error::Conversion(msg) => Error::conversion(format!("field `{}`: {msg}", self.name)),
            other => other,
        })
    }
}

impl<T> fmt::Debug for FieldAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("name", &self.name)
            .field("host_type", &self.host_type)
            .finish_non_exhaustive()
    }
}

pub struct RecordSchemaBuilder<T> {
    fields: IndexMap<String, FieldAccessor<T>>,
}

impl<T: 'static> RecordSchemaBuilder<T> {
    fn new() -> Self {
        Self {
            fields: IndexMap::new(),
        }
    }

    /// Declares a readable and writable field. Later declarations of the same name win.
    pub fn field<F>(&mut self, name: &str, get: fn(&T) -> &F, get_mut: fn(&mut T) -> &mut F) -> &mut Self
    where
        F: HostValue + Clone + 'static,
    {
        let accessor = FieldAccessor {
            name: name.to_owned(),
            host_type: F::host_type(),
            get: Box::new(move |record| get(record).clone().into_value()),
            set: Box::new(move |record, value| {
                *get_mut(record) = F::from_value(value)?;
                Ok(())
            }),
        };
        self.fields.insert(name.to_owned(), accessor);
        self
    }
}

static SCHEMAS: LazyLock<Mutex<TypeMap>> = LazyLock::new(|| Mutex::new(TypeMap::new()));

/// The accessor table of a [`Record`] type, built once per process.
pub struct RecordSchema<T> {
    type_name: &'static str,
    fields: IndexMap<String, FieldAccessor<T>>,
}

impl<T: Record> RecordSchema<T> {
    pub fn of() -> Arc<Self> {
        if let Some(schema) = Self::cached() {
            return schema;
        }
        // `describe` is user code; keep it outside the lock.
        let mut builder = RecordSchemaBuilder::new();
        T::describe(&mut builder);
        let schema = Arc::new(RecordSchema {
            type_name: std::any::type_name::<T>(),
            fields: builder.fields,
        });
        SCHEMAS
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_or_insert(schema)
    }

    fn cached() -> Option<Arc<Self>> {
        SCHEMAS.lock().unwrap_or_else(|e| e.into_inner()).get::<Self>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Exact name first, then ignoring case.
    pub fn field(&self, name: &str) -> Option<&FieldAccessor<T>> {
        self.fields.get(name).or_else(|| {
            let name = UniCase::new(name);
            self.fields
                .values()
                .find(|f| UniCase::new(f.name.as_str()) == name)
        })
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldAccessor<T>> {
        self.fields.values()
    }

    /// Every field of `record`, keyed by field name.
    pub fn to_map(&self, record: &T) -> IndexMap<String, Value> {
        self.fields
            .values()
            .map(|f| (f.name.clone(), f.get(record)))
            .collect()
    }
}

impl<T> fmt::Debug for RecordSchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSchema")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}
