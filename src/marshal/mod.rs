//! Response marshalling.
//!
//! Declarative projection of source object graphs into ordered JSON: a
//! [`Schema`] names the output fields, the engine walks the source through
//! the [`Entity`] accessor trait, coercing scalars, expanding nested
//! sub-schemas and relationships, bounding depth, and guarding against
//! reference cycles.

mod engine;
mod fields;
mod source;

pub use engine::{MarshalOptions, marshal, marshal_all};
pub use fields::{Cardinality, Field, FieldKind, FormatFn, ScalarKind, Schema};
pub use source::{Entity, EntityRef, MapEntity, Resolved};
