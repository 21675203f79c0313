//! Built-in coercion table, closed over [`WireType`].

use std::net::IpAddr;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use tracing::warn;
use uuid::Uuid;

use super::CodecRegistry;
use crate::base::wire::{MILLIS_PER_DAY, epoch_date};
use crate::base::{Composite, Decimal, HostType, Value, Varint, WireType, WireValue};
use crate::error::{Error, Result};

/// The host type a wire type decodes to when nothing else is requested.
pub fn canonical_host_type(wire_type: &WireType) -> HostType {
    match wire_type {
        WireType::Ascii | WireType::Text | WireType::Varchar => HostType::Str,
        WireType::Int => HostType::Int32,
        WireType::BigInt | WireType::Counter | WireType::Time => HostType::Int64,
        WireType::Boolean => HostType::Bool,
        WireType::Double => HostType::Float64,
        WireType::Float => HostType::Float32,
        WireType::Varint => HostType::Varint,
        WireType::TinyInt => HostType::Int8,
        WireType::SmallInt => HostType::Int16,
        WireType::Decimal => HostType::Decimal,
        WireType::Date => HostType::Date,
        WireType::Timestamp => HostType::Timestamp,
        WireType::Uuid | WireType::TimeUuid => HostType::Uuid,
        WireType::Blob => HostType::Bytes,
        WireType::Inet => HostType::Inet,
        WireType::Duration => HostType::Duration,
        WireType::Tuple(_) | WireType::Udt { .. } => HostType::Composite,
        WireType::List(_) => HostType::List,
        WireType::Set(_) => HostType::Set,
        WireType::Map(..) => HostType::Map,
        WireType::Custom(_) => HostType::Native,
    }
}

fn mismatch(value: &impl std::fmt::Display, target: &impl std::fmt::Display) -> Error {
    Error::conversion(format!("cannot convert `{value}` to {target}"))
}

fn ascii(text: String) -> Result<WireValue> {
    if !text.is_ascii() {
        return Err(mismatch(&text, &WireType::Ascii));
    }
    Ok(WireValue::Ascii(text))
}

fn date_from_days(days: i32) -> Result<NaiveDate> {
    epoch_date()
        .checked_add_signed(TimeDelta::days(i64::from(days)))
        .ok_or_else(|| Error::conversion(format!("date {days} days from epoch is out of range")))
}

fn days_from_date(date: NaiveDate) -> Result<i32> {
    i32::try_from((date - epoch_date()).num_days())
        .map_err(|_| Error::conversion(format!("date {date} is out of range")))
}

fn timestamp_from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::conversion(format!("timestamp {millis} ms is out of range")))
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn integer_of(value: &Value) -> Option<i128> {
    match value {
        Value::Int8(v) => Some(i128::from(*v)),
        Value::Int16(v) => Some(i128::from(*v)),
        Value::Int32(v) => Some(i128::from(*v)),
        Value::Int64(v) => Some(i128::from(*v)),
        Value::Varint(v) => v.to_i128(),
        _ => None,
    }
}

/// Narrows or widens an integer into an integral wire type, failing when it does not fit.
fn integer_to_wire(n: i128, wire_type: &WireType) -> Option<WireValue> {
    let wire = match wire_type {
        WireType::TinyInt => WireValue::TinyInt(i8::try_from(n).ok()?),
        WireType::SmallInt => WireValue::SmallInt(i16::try_from(n).ok()?),
        WireType::Int => WireValue::Int(i32::try_from(n).ok()?),
        WireType::BigInt => WireValue::BigInt(i64::try_from(n).ok()?),
        WireType::Counter => WireValue::Counter(i64::try_from(n).ok()?),
        WireType::Varint => WireValue::Varint(Varint::from(n)),
        WireType::Decimal => WireValue::Decimal(Decimal::new(Varint::from(n), 0)),
        _ => return None,
    };
    Some(wire)
}

fn parse_text(text: &str, wire_type: &WireType) -> Result<WireValue> {
    let fail = |e: &dyn std::fmt::Display| {
        Error::conversion(format!("cannot parse `{text}` as {wire_type}: {e}"))
    };
    let trimmed = text.trim();
    let wire = match wire_type {
        WireType::TinyInt
        | WireType::SmallInt
        | WireType::Int
        | WireType::BigInt
        | WireType::Counter => {
            let n: i128 = trimmed.parse().map_err(|e| fail(&e))?;
            integer_to_wire(n, wire_type).ok_or_else(|| fail(&"out of range"))?
        }
        WireType::Varint => WireValue::Varint(trimmed.parse().map_err(|e| fail(&e))?),
        WireType::Decimal => WireValue::Decimal(trimmed.parse().map_err(|e| fail(&e))?),
        WireType::Boolean => WireValue::Boolean(trimmed.parse().map_err(|e| fail(&e))?),
        WireType::Double => WireValue::Double(trimmed.parse().map_err(|e| fail(&e))?),
        WireType::Float => WireValue::Float(trimmed.parse().map_err(|e| fail(&e))?),
        WireType::Uuid => WireValue::Uuid(Uuid::parse_str(trimmed).map_err(|e| fail(&e))?),
        WireType::TimeUuid => {
            WireValue::TimeUuid(Uuid::parse_str(trimmed).map_err(|e| fail(&e))?)
        }
        WireType::Inet => WireValue::Inet(trimmed.parse::<IpAddr>().map_err(|e| fail(&e))?),
        WireType::Date => {
            let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|e| fail(&e))?;
            WireValue::Date(days_from_date(date)?)
        }
        WireType::Timestamp => {
            let ts = DateTime::parse_from_rfc3339(trimmed).map_err(|e| fail(&e))?;
            WireValue::Timestamp(ts.timestamp_millis())
        }
        WireType::Blob => {
            let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
            WireValue::Blob(hex::decode(digits).map_err(|e| fail(&e))?.into())
        }
        _ => return Err(mismatch(&text, wire_type)),
    };
    Ok(wire)
}

/// Moves a decoded value toward the host type a caller asked for, where a rule exists.
/// Values with no applicable rule are returned as decoded.
pub(super) fn adapt(value: Value, desired: &HostType) -> Result<Value> {
    let adapted = match (value, desired) {
        (Value::Date(date), HostType::Int64) => {
            Value::Int64((date - epoch_date()).num_days() * MILLIS_PER_DAY)
        }
        (Value::Date(date), HostType::Timestamp) => Value::Timestamp(midnight_utc(date)),
        (Value::Timestamp(ts), HostType::Int64) => Value::Int64(ts.timestamp_millis()),
        (Value::Int8(v), HostType::Int16) => Value::Int16(i16::from(v)),
        (Value::Int8(v), HostType::Int32) => Value::Int32(i32::from(v)),
        (Value::Int16(v), HostType::Int32) => Value::Int32(i32::from(v)),
        (Value::Int8(v), HostType::Int64) => Value::Int64(i64::from(v)),
        (Value::Int16(v), HostType::Int64) => Value::Int64(i64::from(v)),
        (Value::Int32(v), HostType::Int64) => Value::Int64(i64::from(v)),
        (Value::Float32(v), HostType::Float64) => Value::Float64(f64::from(v)),
        (Value::Int64(v), HostType::Varint) => Value::Varint(Varint::from(v)),
        (value, HostType::Str) if !matches!(value, Value::Str(_)) => match value.as_text() {
            Some(text) => Value::Str(text),
            None => value,
        },
        (value, _) => value,
    };
    Ok(adapted)
}

impl CodecRegistry {
    pub(super) fn decode_builtin(&self, value: &WireValue, wire_type: &WireType) -> Result<Value> {
        if let WireType::Custom(name) = wire_type {
            warn!(wire_type = %name, "unsupported wire type, passing through native value");
            return Ok(Value::Native(value.clone()));
        }
        if !value.conforms_to(wire_type) {
            return Err(mismatch(value, wire_type));
        }
        let decoded = match (value, wire_type) {
            (WireValue::Ascii(s) | WireValue::Text(s), _) => Value::Str(s.clone()),
            (WireValue::Int(v), _) => Value::Int32(*v),
            (WireValue::BigInt(v) | WireValue::Counter(v) | WireValue::Time(v), _) => {
                Value::Int64(*v)
            }
            (WireValue::Boolean(v), _) => Value::Bool(*v),
            (WireValue::Double(v), _) => Value::Float64(*v),
            (WireValue::Float(v), _) => Value::Float32(*v),
            (WireValue::Varint(v), _) => Value::Varint(v.clone()),
            (WireValue::TinyInt(v), _) => Value::Int8(*v),
            (WireValue::SmallInt(v), _) => Value::Int16(*v),
            (WireValue::Decimal(v), _) => Value::Decimal(v.clone()),
            (WireValue::Date(days), _) => Value::Date(date_from_days(*days)?),
            (WireValue::Timestamp(millis), _) => Value::Timestamp(timestamp_from_millis(*millis)?),
            (WireValue::Uuid(v) | WireValue::TimeUuid(v), _) => Value::Uuid(*v),
            (WireValue::Blob(b), _) => Value::Bytes(b.clone()),
            (WireValue::Inet(addr), _) => Value::Inet(*addr),
            (WireValue::Duration(d), _) => Value::Duration(*d),
            (WireValue::Tuple(_) | WireValue::Udt { .. }, _) => {
                Value::Composite(Composite::new(value.clone()).ok_or_else(|| mismatch(value, wire_type))?)
            }
            (WireValue::List(items), WireType::List(elem)) => Value::List(
                items
                    .iter()
                    .map(|v| self.decode(Some(v), elem, None))
                    .collect::<Result<_>>()?,
            ),
            (WireValue::Set(items), WireType::Set(elem)) => Value::Set(
                items
                    .iter()
                    .map(|v| self.decode(Some(v), elem, None))
                    .collect::<Result<_>>()?,
            ),
            (WireValue::Map(entries), WireType::Map(k, v)) => Value::Map(
                entries
                    .iter()
                    .map(|(key, value)| {
                        Ok((self.decode(Some(key), k, None)?, self.decode(Some(value), v, None)?))
                    })
                    .collect::<Result<_>>()?,
            ),
            _ => return Err(mismatch(value, wire_type)),
        };
        Ok(decoded)
    }

    /// Lenient match: `Some` when `value` already has the canonical host form of `wire_type`.
    pub(super) fn encode_direct(
        &self,
        value: &Value,
        wire_type: &WireType,
    ) -> Result<Option<WireValue>> {
        let wire = match (value, wire_type) {
            (Value::Str(s), WireType::Ascii) => ascii(s.clone())?,
            (Value::Str(s), WireType::Text | WireType::Varchar) => WireValue::Text(s.clone()),
            (Value::Int32(v), WireType::Int) => WireValue::Int(*v),
            (Value::Int64(v), WireType::BigInt) => WireValue::BigInt(*v),
            (Value::Int64(v), WireType::Counter) => WireValue::Counter(*v),
            (Value::Int64(v), WireType::Time) => WireValue::Time(*v),
            (Value::Bool(v), WireType::Boolean) => WireValue::Boolean(*v),
            (Value::Float64(v), WireType::Double) => WireValue::Double(*v),
            (Value::Float32(v), WireType::Float) => WireValue::Float(*v),
            (Value::Varint(v), WireType::Varint) => WireValue::Varint(v.clone()),
            (Value::Int8(v), WireType::TinyInt) => WireValue::TinyInt(*v),
            (Value::Int16(v), WireType::SmallInt) => WireValue::SmallInt(*v),
            (Value::Decimal(v), WireType::Decimal) => WireValue::Decimal(v.clone()),
            (Value::Date(d), WireType::Date) => WireValue::Date(days_from_date(*d)?),
            (Value::Timestamp(ts), WireType::Timestamp) => WireValue::Timestamp(ts.timestamp_millis()),
            (Value::Uuid(v), WireType::Uuid) => WireValue::Uuid(*v),
            (Value::Uuid(v), WireType::TimeUuid) => WireValue::TimeUuid(*v),
            (Value::Bytes(b), WireType::Blob) => WireValue::Blob(b.clone()),
            (Value::Inet(addr), WireType::Inet) => WireValue::Inet(*addr),
            (Value::Duration(d), WireType::Duration) => WireValue::Duration(*d),
            (Value::Composite(c), WireType::Tuple(_) | WireType::Udt { .. })
                if c.as_wire().conforms_to(wire_type) =>
            {
                c.as_wire().clone()
            }
            (Value::List(items), WireType::List(elem)) => WireValue::List(self.encode_all(items, elem)?),
            (Value::Set(items), WireType::Set(elem)) => WireValue::Set(self.encode_all(items, elem)?),
            (Value::Map(entries), WireType::Map(k, v)) => WireValue::Map(
                entries
                    .iter()
                    .map(|(key, value)| Ok((self.encode(key, k)?, self.encode(value, v)?)))
                    .collect::<Result<_>>()?,
            ),
            (Value::Native(w), _) if w.conforms_to(wire_type) => w.clone(),
            _ => return Ok(None),
        };
        Ok(Some(wire))
    }

    fn encode_all(&self, items: &[Value], elem: &WireType) -> Result<Vec<WireValue>> {
        items
            .iter()
            .map(|item| {
                if item.is_null() {
                    return Err(Error::conversion(format!(
                        "collection of {elem} cannot hold null"
                    )));
                }
                self.encode(item, elem)
            })
            .collect()
    }

    /// Generic typed bind: widening and narrowing, text parsing and rendering,
    /// and the date/timestamp/millis conversions.
    pub(super) fn encode_coerced(&self, value: &Value, wire_type: &WireType) -> Result<WireValue> {
        if let Some(n) = integer_of(value)
            && let Some(wire) = integer_to_wire(n, wire_type)
        {
            return Ok(wire);
        }
        let wire = match (value, wire_type) {
            (Value::Str(s), _) if !matches!(wire_type, WireType::Ascii | WireType::Text | WireType::Varchar) => {
                parse_text(s, wire_type)?
            }
            (Value::Timestamp(ts), WireType::Date) => {
                WireValue::Date(days_from_date(ts.date_naive())?)
            }
            (Value::Int64(millis), WireType::Date) => {
                let days = millis.div_euclid(MILLIS_PER_DAY);
                WireValue::Date(
                    i32::try_from(days).map_err(|_| mismatch(value, wire_type))?,
                )
            }
            (Value::Int64(millis), WireType::Timestamp) => WireValue::Timestamp(*millis),
            (Value::Date(date), WireType::Timestamp) => {
                WireValue::Timestamp(midnight_utc(*date).timestamp_millis())
            }
            (Value::Float32(v), WireType::Double) => WireValue::Double(f64::from(*v)),
            (Value::Int8(v), WireType::Double) => WireValue::Double(f64::from(*v)),
            (Value::Int16(v), WireType::Double) => WireValue::Double(f64::from(*v)),
            (Value::Int32(v), WireType::Double) => WireValue::Double(f64::from(*v)),
            (Value::Int8(v), WireType::Float) => WireValue::Float(f32::from(*v)),
            (Value::Int16(v), WireType::Float) => WireValue::Float(f32::from(*v)),
            (_, WireType::Ascii) if value.as_text().is_some() => {
                ascii(value.as_text().unwrap_or_default())?
            }
            (_, WireType::Text | WireType::Varchar) if value.as_text().is_some() => {
                WireValue::Text(value.as_text().unwrap_or_default())
            }
            (Value::List(items) | Value::Set(items), WireType::List(elem)) => {
                WireValue::List(self.encode_all(items, elem)?)
            }
            (Value::List(items) | Value::Set(items), WireType::Set(elem)) => {
                WireValue::Set(self.encode_all(items, elem)?)
            }
            (Value::Opaque(o), _) => {
                return Err(Error::conversion(format!(
                    "no codec converts {} to {wire_type}",
                    o.opaque_type().name
                )));
            }
            _ => return Err(mismatch(value, wire_type)),
        };
        Ok(wire)
    }
}
