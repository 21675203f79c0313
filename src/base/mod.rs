pub mod numeric;
pub mod value;
pub mod wire;

pub use numeric::{CqlDuration, Decimal, Varint};
pub use value::{Composite, HostType, Opaque, OpaqueType, Value};
pub use wire::{ColumnSpec, WireType, WireValue};
