//! Wire-level column types and the client's native value representation.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, TimeDelta};
use itertools::Itertools;
use uuid::Uuid;

use super::numeric::{CqlDuration, Decimal, Varint};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// WireType
// ---------------------------------------------------------------------------

/// The closed set of column types a store reports in result and statement metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WireType {
    Ascii,
    Text,
    Varchar,
    Int,
    BigInt,
    Counter,
    Time,
    Boolean,
    Double,
    Float,
    Varint,
    TinyInt,
    SmallInt,
    Decimal,
    Date,
    Timestamp,
    Uuid,
    TimeUuid,
    Blob,
    Inet,
    Duration,
    Tuple(Vec<WireType>),
    Udt {
        keyspace: String,
        name: String,
        fields: Vec<(String, WireType)>,
    },
    List(Box<WireType>),
    Set(Box<WireType>),
    Map(Box<WireType>, Box<WireType>),
    /// Any type the client reports that is not part of the enumeration above.
    Custom(String),
}

impl WireType {
    fn scalar_from_name(name: &str) -> Option<Self> {
        let typ = match name {
            "ascii" => WireType::Ascii,
            "text" => WireType::Text,
            "varchar" => WireType::Varchar,
            "int" => WireType::Int,
            "bigint" => WireType::BigInt,
            "counter" => WireType::Counter,
            "time" => WireType::Time,
            "boolean" => WireType::Boolean,
            "double" => WireType::Double,
            "float" => WireType::Float,
            "varint" => WireType::Varint,
            "tinyint" => WireType::TinyInt,
            "smallint" => WireType::SmallInt,
            "decimal" => WireType::Decimal,
            "date" => WireType::Date,
            "timestamp" => WireType::Timestamp,
            "uuid" => WireType::Uuid,
            "timeuuid" => WireType::TimeUuid,
            "blob" => WireType::Blob,
            "inet" => WireType::Inet,
            "duration" => WireType::Duration,
            _ => return None,
        };
        Some(typ)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, WireType::List(_) | WireType::Set(_) | WireType::Map(..))
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireType::Ascii => "ascii",
            WireType::Text => "text",
            WireType::Varchar => "varchar",
            WireType::Int => "int",
            WireType::BigInt => "bigint",
            WireType::Counter => "counter",
            WireType::Time => "time",
            WireType::Boolean => "boolean",
            WireType::Double => "double",
            WireType::Float => "float",
            WireType::Varint => "varint",
            WireType::TinyInt => "tinyint",
            WireType::SmallInt => "smallint",
            WireType::Decimal => "decimal",
            WireType::Date => "date",
            WireType::Timestamp => "timestamp",
            WireType::Uuid => "uuid",
            WireType::TimeUuid => "timeuuid",
            WireType::Blob => "blob",
            WireType::Inet => "inet",
            WireType::Duration => "duration",
            WireType::Tuple(elems) => return write!(f, "tuple<{}>", elems.iter().join(", ")),
            WireType::Udt { keyspace, name, .. } if keyspace.is_empty() => {
                return write!(f, "frozen<{name}>");
            }
            WireType::Udt { keyspace, name, .. } => return write!(f, "frozen<{keyspace}.{name}>"),
            WireType::List(elem) => return write!(f, "list<{elem}>"),
            WireType::Set(elem) => return write!(f, "set<{elem}>"),
            WireType::Map(k, v) => return write!(f, "map<{k}, {v}>"),
            WireType::Custom(class) => return write!(f, "'{class}'"),
        };
        f.write_str(name)
    }
}

impl FromStr for WireType {
    type Err = Error;

    /// Parses CQL type syntax, e.g. `map<text, frozen<list<int>>>`.
    /// Names outside the enumeration become [`WireType::Custom`].
    fn from_str(s: &str) -> Result<Self> {
        let mut parser = TypeParser { src: s, pos: 0 };
        let typ = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(typ)
    }
}

struct TypeParser<'a> {
    src: &'a str,
    pos: usize,
}

impl TypeParser<'_> {
    fn error(&self, msg: &str) -> Error {
        Error::config("type", format!("{msg} at offset {} in `{}`", self.pos, self.src))
    }

    fn skip_ws(&mut self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.src[self.pos..].starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<&str> {
        self.skip_ws();
        let rest = &self.src[self.pos..];
        if let Some(quoted) = rest.strip_prefix('\'') {
            let end = quoted
                .find('\'')
                .ok_or_else(|| self.error("unterminated quoted type"))?;
            self.pos += end + 2;
            return Ok(&rest[1..=end]);
        }
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected type name"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn args(&mut self) -> Result<Vec<WireType>> {
        let mut args = vec![self.parse_type()?];
        while self.eat(',') {
            args.push(self.parse_type()?);
        }
        if !self.eat('>') {
            return Err(self.error("expected `>`"));
        }
        Ok(args)
    }

    fn parse_type(&mut self) -> Result<WireType> {
        let quoted = self.src[self.pos..].trim_start().starts_with('\'');
        let name = self.ident()?.to_owned();
        if quoted {
            return Ok(WireType::Custom(name));
        }
        let lower = name.to_ascii_lowercase();
        if !self.eat('<') {
            return Ok(WireType::scalar_from_name(&lower).unwrap_or(WireType::Custom(name)));
        }
        let mut args = self.args()?;
        let argc = args.len();
        let arity_error = |expected: usize| {
            Error::config(
                "type",
                format!("`{name}` takes {expected} type argument(s), got {argc}"),
            )
        };
        let typ = match lower.as_str() {
            "frozen" if args.len() == 1 => args.remove(0),
            "list" if args.len() == 1 => WireType::List(Box::new(args.remove(0))),
            "set" if args.len() == 1 => WireType::Set(Box::new(args.remove(0))),
            "map" if args.len() == 2 => {
                let value = args.remove(1);
                WireType::Map(Box::new(args.remove(0)), Box::new(value))
            }
            "tuple" => WireType::Tuple(args),
            "frozen" | "list" | "set" => return Err(arity_error(1)),
            "map" => return Err(arity_error(2)),
            _ => return Err(self.error(&format!("`{name}` is not a parameterized type"))),
        };
        Ok(typ)
    }
}

// ---------------------------------------------------------------------------
// ColumnSpec
// ---------------------------------------------------------------------------

/// One (name, wire type) entry of a result schema or a prepared statement's variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnSpec {
    pub name: String,
    pub typ: WireType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, typ: WireType) -> Self {
        Self {
            name: name.into(),
            typ,
        }
    }
}

// ---------------------------------------------------------------------------
// WireValue
// ---------------------------------------------------------------------------

/// A non-null column value in the client's native representation.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Ascii(String),
    Text(String),
    Int(i32),
    BigInt(i64),
    Counter(i64),
    /// Nanoseconds since midnight.
    Time(i64),
    Boolean(bool),
    Double(f64),
    Float(f32),
    Varint(Varint),
    TinyInt(i8),
    SmallInt(i16),
    Decimal(Decimal),
    /// Days since the Unix epoch.
    Date(i32),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Uuid(Uuid),
    TimeUuid(Uuid),
    Blob(Bytes),
    Inet(IpAddr),
    Duration(CqlDuration),
    Tuple(Vec<Option<WireValue>>),
    Udt {
        keyspace: String,
        type_name: String,
        fields: Vec<(String, Option<WireValue>)>,
    },
    List(Vec<WireValue>),
    Set(Vec<WireValue>),
    Map(Vec<(WireValue, WireValue)>),
    Custom {
        class_name: String,
        bytes: Bytes,
    },
}

pub const MILLIS_PER_DAY: i64 = 86_400_000;

pub fn epoch_date() -> NaiveDate {
    NaiveDate::default()
}

impl WireValue {
    /// Whether this value may be stored in a column of `typ`.
    pub fn conforms_to(&self, typ: &WireType) -> bool {
        match (self, typ) {
            (WireValue::Ascii(s), WireType::Ascii) => s.is_ascii(),
            (WireValue::Text(_), WireType::Text | WireType::Varchar)
            | (WireValue::Int(_), WireType::Int)
            | (WireValue::BigInt(_), WireType::BigInt)
            | (WireValue::Counter(_), WireType::Counter)
            | (WireValue::Time(_), WireType::Time)
            | (WireValue::Boolean(_), WireType::Boolean)
            | (WireValue::Double(_), WireType::Double)
            | (WireValue::Float(_), WireType::Float)
            | (WireValue::Varint(_), WireType::Varint)
            | (WireValue::TinyInt(_), WireType::TinyInt)
            | (WireValue::SmallInt(_), WireType::SmallInt)
            | (WireValue::Decimal(_), WireType::Decimal)
            | (WireValue::Date(_), WireType::Date)
            | (WireValue::Timestamp(_), WireType::Timestamp)
            | (WireValue::Uuid(_), WireType::Uuid)
            | (WireValue::TimeUuid(_), WireType::TimeUuid)
            | (WireValue::Blob(_), WireType::Blob)
            | (WireValue::Inet(_), WireType::Inet)
            | (WireValue::Duration(_), WireType::Duration) => true,
            (WireValue::Tuple(values), WireType::Tuple(types)) => {
                values.len() == types.len()
                    && values
                        .iter()
                        .zip(types)
                        .all(|(v, t)| v.as_ref().is_none_or(|v| v.conforms_to(t)))
            }
            (
                WireValue::Udt {
                    type_name, fields, ..
                },
                WireType::Udt {
                    name,
                    fields: field_types,
                    ..
                },
            ) => {
                type_name == name
                    && fields.iter().all(|(field, value)| {
                        field_types.iter().any(|(n, t)| {
                            n == field && value.as_ref().is_none_or(|v| v.conforms_to(t))
                        })
                    })
            }
            (WireValue::List(values), WireType::List(elem))
            | (WireValue::Set(values), WireType::Set(elem)) => {
                values.iter().all(|v| v.conforms_to(elem))
            }
            (WireValue::Map(entries), WireType::Map(k, v)) => entries
                .iter()
                .all(|(key, value)| key.conforms_to(k) && value.conforms_to(v)),
            (WireValue::Custom { class_name, .. }, WireType::Custom(name)) => class_name == name,
            _ => false,
        }
    }
}

fn fmt_optional(value: &Option<WireValue>) -> String {
    value
        .as_ref()
        .map_or_else(|| "NULL".to_owned(), |v| v.to_string())
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::Ascii(s) | WireValue::Text(s) => f.write_str(s),
            WireValue::Int(v) => write!(f, "{v}"),
            WireValue::BigInt(v) | WireValue::Counter(v) => write!(f, "{v}"),
            WireValue::Time(nanos) => write!(f, "{}", TimeDelta::nanoseconds(*nanos)),
            WireValue::Boolean(v) => write!(f, "{v}"),
            WireValue::Double(v) => write!(f, "{v}"),
            WireValue::Float(v) => write!(f, "{v}"),
            WireValue::Varint(v) => write!(f, "{v}"),
            WireValue::TinyInt(v) => write!(f, "{v}"),
            WireValue::SmallInt(v) => write!(f, "{v}"),
            WireValue::Decimal(v) => write!(f, "{v}"),
            WireValue::Date(days) => {
                match epoch_date().checked_add_signed(TimeDelta::days(i64::from(*days))) {
                    Some(date) => write!(f, "{date}"),
                    None => write!(f, "{days}"),
                }
            }
            WireValue::Timestamp(millis) => match DateTime::from_timestamp_millis(*millis) {
                Some(ts) => write!(f, "{}", ts.to_rfc3339()),
                None => write!(f, "{millis}"),
            },
            WireValue::Uuid(v) | WireValue::TimeUuid(v) => write!(f, "{v}"),
            WireValue::Blob(b) => write!(f, "0x{}", hex::encode(b)),
            WireValue::Inet(addr) => write!(f, "{addr}"),
            WireValue::Duration(d) => write!(f, "{d}"),
            WireValue::Tuple(values) => {
                write!(f, "({})", values.iter().map(fmt_optional).join(", "))
            }
            WireValue::Udt { fields, .. } => write!(
                f,
                "{{{}}}",
                fields
                    .iter()
                    .map(|(name, value)| format!("{name}: {}", fmt_optional(value)))
                    .join(", ")
            ),
            WireValue::List(values) => write!(f, "[{}]", values.iter().join(", ")),
            WireValue::Set(values) => write!(f, "{{{}}}", values.iter().join(", ")),
            WireValue::Map(entries) => write!(
                f,
                "{{{}}}",
                entries.iter().map(|(k, v)| format!("{k}: {v}")).join(", ")
            ),
            WireValue::Custom { class_name, bytes } => {
                write!(f, "'{class_name}'(0x{})", hex::encode(bytes))
            }
        }
    }
}
