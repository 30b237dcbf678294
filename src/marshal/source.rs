//! Source value access for marshalling.
//!
//! Instead of probing source objects at runtime for dict-like or
//! attribute-like access, marshalling works against one narrow capability: a
//! value accessor that, for a field name, returns a value or reports it
//! absent. Structured records implement [`Entity`] directly; free-form JSON
//! mappings go through the [`MapEntity`] adapter.

use serde_json::Value;
use std::rc::Rc;

/// What a source resolved for a requested field name.
pub enum Resolved {
    /// The source has no value under this name.
    Absent,
    /// A plain value (scalar, or an array of scalars).
    Value(Value),
    /// A single sub-object.
    One(EntityRef),
    /// An iterable of sub-objects.
    Many(Vec<EntityRef>),
}

/// A marshalling source: resolves field names to values or sub-entities.
pub trait Entity {
    fn get(&self, name: &str) -> Resolved;
}

/// Shared handle to a source entity.
///
/// Reference counting lets object graphs share and cycle; the engine uses
/// the pointer identity of each handle to detect cycles along one recursion
/// path.
pub type EntityRef = Rc<dyn Entity>;

/// Stable identity of an entity handle, for cycle detection.
pub(crate) fn identity(entity: &EntityRef) -> usize {
    Rc::as_ptr(entity) as *const () as usize
}

/// Adapter for free-form mapping sources (JSON objects).
///
/// Nested objects resolve as child entities and arrays of objects as
/// iterables, so one JSON document can drive nested and relationship fields.
pub struct MapEntity {
    map: serde_json::Map<String, Value>,
}

impl MapEntity {
    pub fn new(map: serde_json::Map<String, Value>) -> Self {
        Self { map }
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::new(map)),
            _ => None,
        }
    }

    /// Convenience constructor returning a shared handle.
    pub fn shared(value: Value) -> Option<EntityRef> {
        Self::from_value(value).map(|e| Rc::new(e) as EntityRef)
    }
}

impl Entity for MapEntity {
    fn get(&self, name: &str) -> Resolved {
        match self.map.get(name) {
            None => Resolved::Absent,
            Some(Value::Object(map)) => {
                Resolved::One(Rc::new(MapEntity::new(map.clone())))
            }
            Some(Value::Array(items)) if items.iter().all(|v| v.is_object()) && !items.is_empty() => {
                Resolved::Many(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::Object(map) => {
                                Rc::new(MapEntity::new(map.clone())) as EntityRef
                            }
                            _ => unreachable!(),
                        })
                        .collect(),
                )
            }
            Some(value) => Resolved::Value(value.clone()),
        }
    }
}
