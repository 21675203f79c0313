//! Conversion between wire values and host values.
//!
//! A [`CodecRegistry`] holds user codecs in registration order and falls back
//! to the built-in table in [`builtin`], which is total over [`WireType`].

mod builtin;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

pub use builtin::canonical_host_type;

use crate::base::{HostType, Value, WireType, WireValue};
use crate::client::BoundStatement;
use crate::error::{Error, Result};

/// A user-supplied coercion between some wire types and some host types.
///
/// A codec is used only for (wire type, host type) pairs it accepts on both
/// sides. Failures are reported as [`Error::Codec`].
pub trait Codec: Send + Sync {
    fn name(&self) -> &str;

    fn accepts_wire_type(&self, wire_type: &WireType) -> bool;

    fn accepts_host_type(&self, host_type: &HostType) -> bool;

    fn decode(&self, value: &WireValue, wire_type: &WireType) -> anyhow::Result<Value>;

    fn encode(&self, value: &Value, wire_type: &WireType) -> anyhow::Result<WireValue>;
}

// ---------------------------------------------------------------------------
// CodecRegistry
// ---------------------------------------------------------------------------

/// Populated at construction, read-only afterwards.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    custom: Vec<Arc<dyn Codec>>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.custom.iter().map(|c| c.name()))
            .finish()
    }
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        self.custom.push(codec);
    }

    pub fn custom_codecs(&self) -> &[Arc<dyn Codec>] {
        &self.custom
    }

    fn find_custom(&self, wire_type: &WireType, host_type: &HostType) -> Option<&Arc<dyn Codec>> {
        self.custom
            .iter()
            .find(|c| c.accepts_wire_type(wire_type) && c.accepts_host_type(host_type))
    }

    /// Read path. `None` (a null column) always decodes to [`Value::Null`].
    ///
    /// With a `desired` host type, custom codecs accepting both sides win;
    /// otherwise the built-in table applies and adapts toward `desired` where
    /// a rule exists (e.g. `date` to millis).
    pub fn decode(
        &self,
        value: Option<&WireValue>,
        wire_type: &WireType,
        desired: Option<&HostType>,
    ) -> Result<Value> {
        let Some(value) = value else {
            return Ok(Value::Null);
        };
        if let Some(desired) = desired
            && let Some(codec) = self.find_custom(wire_type, desired)
        {
            return codec
                .decode(value, wire_type)
                .map_err(|e| Error::codec(codec.name(), e));
        }
        let decoded = self.decode_builtin(value, wire_type)?;
        match desired {
            Some(desired) => builtin::adapt(decoded, desired),
            None => Ok(decoded),
        }
    }

    /// Write path. Values already in the wire type's canonical host form bind
    /// directly; everything else goes through custom codecs, then built-in
    /// coercions.
    pub fn encode(&self, value: &Value, wire_type: &WireType) -> Result<WireValue> {
        if let Some(wire) = self.encode_direct(value, wire_type)? {
            return Ok(wire);
        }
        if let Some(host_type) = value.host_type()
            && let Some(codec) = self.find_custom(wire_type, &host_type)
        {
            return codec
                .encode(value, wire_type)
                .map_err(|e| Error::codec(codec.name(), e));
        }
        self.encode_coerced(value, wire_type)
    }

    pub fn bind(&self, statement: &mut BoundStatement, name: &str, value: &Value) -> Result<()> {
        let index = statement.index_of(name).ok_or_else(|| {
            Error::conversion(format!(
                "`{name}` is not a variable of `{}`",
                statement.prepared().cql()
            ))
        })?;
        self.bind_at(statement, index, value)
    }

    /// Null binds an explicit null; use [`BoundStatement`]'s unset default to skip a column.
    pub fn bind_at(&self, statement: &mut BoundStatement, index: usize, value: &Value) -> Result<()> {
        if value.is_null() {
            return statement.set_null_at(index);
        }
        let variable = statement.variable(index)?;
        let wire = self.encode(value, &variable.typ).map_err(|e| match e {
            Error::Conversion(msg) => {
                Error::conversion(format!("variable `{}`: {msg}", variable.name))
            }
            other => other,
        })?;
        statement.set_at(index, wire)
    }
}

// ---------------------------------------------------------------------------
// CodecFactoryRegistry
// ---------------------------------------------------------------------------

pub type CodecFactory = Arc<dyn Fn() -> Arc<dyn Codec> + Send + Sync>;

/// Named codec constructors, resolved from the `custom_codecs` list of a spec.
#[derive(Clone, Default)]
pub struct CodecFactoryRegistry {
    factories: IndexMap<String, CodecFactory>,
}

impl fmt::Debug for CodecFactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl CodecFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any factory already registered under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Codec> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiates the named codecs in list order. Unknown names are configuration errors.
    pub fn build_registry(&self, names: &[String]) -> Result<CodecRegistry> {
        let mut registry = CodecRegistry::new();
        for name in names {
            let factory = self.factories.get(name).ok_or_else(|| {
                Error::config("custom_codecs", format!("no codec registered as `{name}`"))
            })?;
            registry.register(factory());
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{Context, bail};

    use super::*;
    use crate::base::{Composite, Opaque};
    use crate::client::PreparedStatement;
    use crate::base::ColumnSpec;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    /// Stores a point as `tuple<int, int>`.
    struct PointCodec;

    impl Codec for PointCodec {
        fn name(&self) -> &str {
            "point"
        }

        fn accepts_wire_type(&self, wire_type: &WireType) -> bool {
            *wire_type == WireType::Tuple(vec![WireType::Int, WireType::Int])
        }

        fn accepts_host_type(&self, host_type: &HostType) -> bool {
            *host_type == HostType::opaque::<Point>()
        }

        fn decode(&self, value: &WireValue, _: &WireType) -> anyhow::Result<Value> {
            match value {
                WireValue::Tuple(fields) => match fields.as_slice() {
                    [Some(WireValue::Int(x)), Some(WireValue::Int(y))] => {
                        Ok(Value::opaque(Point { x: *x, y: *y }))
                    }
                    _ => bail!("incomplete point"),
                },
                other => bail!("not a tuple: {other}"),
            }
        }

        fn encode(&self, value: &Value, _: &WireType) -> anyhow::Result<WireValue> {
            let point = match value {
                Value::Opaque(o) => o.downcast_ref::<Point>().context("not a point")?,
                other => bail!("not a point: {other}"),
            };
            Ok(WireValue::Tuple(vec![
                Some(WireValue::Int(point.x)),
                Some(WireValue::Int(point.y)),
            ]))
        }
    }

    fn point_type() -> WireType {
        WireType::Tuple(vec![WireType::Int, WireType::Int])
    }

    fn registry() -> CodecRegistry {
        let mut registry = CodecRegistry::new();
        registry.register(Arc::new(PointCodec));
        registry
    }

    #[test]
    fn custom_codec_wins_when_desired_type_matches() {
        let registry = registry();
        let wire = WireValue::Tuple(vec![Some(WireValue::Int(1)), Some(WireValue::Int(2))]);

        let value = registry
            .decode(Some(&wire), &point_type(), Some(&HostType::opaque::<Point>()))
            .unwrap();
        let Value::Opaque(o) = &value else {
            panic!("expected opaque, got {value:?}");
        };
        assert_eq!(o.downcast_ref::<Point>(), Some(&Point { x: 1, y: 2 }));

        // Without a desired type the built-in composite rule applies.
        let value = registry.decode(Some(&wire), &point_type(), None).unwrap();
        assert_eq!(value, Value::Composite(Composite::new(wire.clone()).unwrap()));

        assert_eq!(
            registry.encode(&Value::opaque(Point { x: 1, y: 2 }), &point_type()).unwrap(),
            wire
        );
    }

    #[test]
    fn codec_failures_name_the_codec() {
        let registry = registry();
        let wire = WireValue::Tuple(vec![Some(WireValue::Int(1)), None]);
        let err = registry
            .decode(Some(&wire), &point_type(), Some(&HostType::opaque::<Point>()))
            .unwrap_err();
        assert_eq!(err.to_string(), "codec `point`: incomplete point");
    }

    #[test]
    fn opaque_without_codec_is_a_conversion_error() {
        let err = CodecRegistry::new()
            .encode(&Value::Opaque(Opaque::new(Point { x: 0, y: 0 })), &point_type())
            .unwrap_err();
        assert!(matches!(err, Error::Conversion(_)), "{err}");
    }

    #[test]
    fn bind_by_name_coerces_to_variable_type() {
        let prepared = Arc::new(PreparedStatement::new(
            "INSERT INTO t (id, at, note) VALUES (?, ?, ?)",
            vec![
                ColumnSpec::new("id", WireType::BigInt),
                ColumnSpec::new("at", WireType::Timestamp),
                ColumnSpec::new("note", WireType::Text),
            ],
        ));
        let registry = CodecRegistry::new();
        let mut bound = prepared.bind();
        registry.bind(&mut bound, "ID", &Value::Int32(7)).unwrap();
        registry.bind(&mut bound, "at", &Value::Int64(1_000)).unwrap();
        registry.bind(&mut bound, "note", &Value::Null).unwrap();
        assert_eq!(
            bound.values(),
            &[
                crate::client::BoundValue::Value(WireValue::BigInt(7)),
                crate::client::BoundValue::Value(WireValue::Timestamp(1_000)),
                crate::client::BoundValue::Null,
            ]
        );
        let err = registry
            .bind(&mut bound, "id", &Value::Str("seven".into()))
            .unwrap_err();
        assert!(err.to_string().contains("variable `id`"), "{err}");
        assert!(registry.bind(&mut bound, "missing", &Value::Int32(1)).is_err());
    }

    #[test]
    fn factory_registry_resolves_names_in_order() {
        let mut factories = CodecFactoryRegistry::new();
        factories.register("point", || Arc::new(PointCodec) as Arc<dyn Codec>);
        assert!(factories.contains("point"));

        let registry = factories.build_registry(&["point".to_owned()]).unwrap();
        assert_eq!(registry.custom_codecs().len(), 1);

        let err = factories
            .build_registry(&["point".to_owned(), "com.example.Missing".to_owned()])
            .unwrap_err();
        assert!(err.is_config());
    }
}
