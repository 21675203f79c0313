//! Item shapes and the adapter between rows and items.

pub mod record;

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use record::{
    FieldAccessor, HostValue, Record, RecordSchema, RecordSchemaBuilder, Untyped, Violation,
};

use crate::base::{ColumnSpec, Value};
use crate::client::Row;
use crate::codec::CodecRegistry;
use crate::error::{Error, Result};

/// How one record is represented, fixed per reader or writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ItemShape {
    /// Values in column (or bind marker) order.
    #[serde(rename = "list", alias = "positional")]
    Positional,
    /// Values keyed by mapped field name.
    #[default]
    #[serde(rename = "map", alias = "mapping")]
    Mapping,
    /// A [`Record`] type.
    #[serde(rename = "object")]
    Object,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item<T = Untyped> {
    Positional(Vec<Value>),
    Mapping(IndexMap<String, Value>),
    Object(T),
}

impl<T> Item<T> {
    pub fn shape(&self) -> ItemShape {
        match self {
            Item::Positional(_) => ItemShape::Positional,
            Item::Mapping(_) => ItemShape::Mapping,
            Item::Object(_) => ItemShape::Object,
        }
    }

    pub fn as_positional(&self) -> Option<&[Value]> {
        match self {
            Item::Positional(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Item::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<T> {
        match self {
            Item::Object(record) => Some(record),
            _ => None,
        }
    }
}

/// What the write path binds for one item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValues {
    Positional(Vec<Value>),
    Named(IndexMap<String, Value>),
}

/// Converts rows to items and items to bindable values for one configured shape.
pub struct ShapeAdapter<T: Record = Untyped> {
    shape: ItemShape,
    schema: OnceLock<Arc<RecordSchema<T>>>,
}

impl<T: Record> ShapeAdapter<T> {
    pub fn new(shape: ItemShape) -> Self {
        Self {
            shape,
            schema: OnceLock::new(),
        }
    }

    pub fn shape(&self) -> ItemShape {
        self.shape
    }

    pub fn schema(&self) -> &Arc<RecordSchema<T>> {
        self.schema.get_or_init(RecordSchema::of)
    }

    /// In object mode every mapped name must be a field of the record.
    pub fn check_mapping(&self, mapping: &[String]) -> Result<()> {
        if self.shape != ItemShape::Object {
            return Ok(());
        }
        let schema = self.schema();
        if let Some(missing) = mapping.iter().find(|name| schema.field(name).is_none()) {
            return Err(Error::config(
                "column_mapping",
                format!("`{missing}` is not a field of {}", schema.type_name()),
            ));
        }
        Ok(())
    }

    /// Builds one item from `row`. `mapping` is parallel to `columns`.
    pub fn to_item(
        &self,
        row: &Row,
        columns: &[ColumnSpec],
        mapping: &[String],
        codecs: &CodecRegistry,
        validate: bool,
    ) -> Result<Item<T>> {
        match self.shape {
            ItemShape::Positional => Ok(Item::Positional(
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| codecs.decode(row.get(i), &column.typ, None))
                    .collect::<Result<_>>()?,
            )),
            ItemShape::Mapping => Ok(Item::Mapping(
                mapping
                    .iter()
                    .zip(columns)
                    .enumerate()
                    .map(|(i, (name, column))| {
                        Ok((name.clone(), codecs.decode(row.get(i), &column.typ, None)?))
                    })
                    .collect::<Result<_>>()?,
            )),
            ItemShape::Object => {
                let schema = self.schema();
                let mut record = T::default();
                for (i, (name, column)) in mapping.iter().zip(columns).enumerate() {
                    let field = schema.field(name).ok_or_else(|| {
                        Error::config(
                            "column_mapping",
                            format!("`{name}` is not a field of {}", schema.type_name()),
                        )
                    })?;
                    let value = codecs.decode(row.get(i), &column.typ, Some(field.host_type()))?;
                    if !value.is_null() {
                        field.set(&mut record, value)?;
                    }
                }
                if validate {
                    record.validate().map_err(Error::Validation)?;
                }
                Ok(Item::Object(record))
            }
        }
    }

    /// The values to bind for `item`, which must match the configured shape.
    pub fn from_item(&self, item: Item<T>) -> Result<ItemValues> {
        match (self.shape, item) {
            (ItemShape::Positional, Item::Positional(values)) => Ok(ItemValues::Positional(values)),
            (ItemShape::Mapping, Item::Mapping(map)) => Ok(ItemValues::Named(map)),
            (ItemShape::Object, Item::Object(record)) => {
                Ok(ItemValues::Named(self.schema().to_map(&record)))
            }
            (expected, item) => Err(Error::conversion(format!(
                "expected a {expected:?} item, got {:?}",
                item.shape()
            ))),
        }
    }
}

impl<T: Record> std::fmt::Debug for ShapeAdapter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeAdapter")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}
