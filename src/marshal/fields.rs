//! Field specifications for response marshalling.
//!
//! A [`Schema`] declares, in insertion order, how each output field is
//! projected from a source entity: scalar coercion, nested sub-schemas,
//! relationships with cardinality, or lists. Schemas are plain data built
//! once and shared; all per-call state lives in the engine.

use crate::error::{FloodgateError, Result};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// Custom formatting function applied to a raw scalar value.
pub type FormatFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// Relationship multiplicity, governing scalar vs. iterable handling of the
/// resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl Cardinality {
    /// Whether the resolved value is treated as an iterable of entities.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }
}

/// Scalar output types with their coercion rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Integer,
    Float,
    Boolean,
    /// Pass the raw value through unchanged.
    Raw,
}

#[derive(Clone)]
pub enum FieldKind {
    Scalar(ScalarKind),
    Nested(Schema),
    Relationship {
        schema: Schema,
        cardinality: Cardinality,
    },
    List(Box<Field>),
}

/// One output field: what to resolve from the source and how to render it.
#[derive(Clone)]
pub struct Field {
    pub(crate) kind: FieldKind,
    /// Source attribute to read instead of the output field name.
    pub(crate) attribute: Option<String>,
    /// Substituted when the source has no value for this field.
    pub(crate) default: Option<Value>,
    pub(crate) format: Option<FormatFn>,
    /// Lazy fields are excluded from default output. There is currently no
    /// mechanism to request them explicitly.
    pub(crate) lazy: bool,
}

impl Field {
    fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            attribute: None,
            default: None,
            format: None,
            lazy: false,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldKind::Scalar(ScalarKind::String))
    }

    pub fn integer() -> Self {
        Self::new(FieldKind::Scalar(ScalarKind::Integer))
    }

    pub fn float() -> Self {
        Self::new(FieldKind::Scalar(ScalarKind::Float))
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Scalar(ScalarKind::Boolean))
    }

    pub fn raw() -> Self {
        Self::new(FieldKind::Scalar(ScalarKind::Raw))
    }

    /// Embed a child schema applied to a sub-object.
    pub fn nested(schema: Schema) -> Self {
        Self::new(FieldKind::Nested(schema))
    }

    /// Like [`nested`](Self::nested) but with declared cardinality.
    pub fn relationship(schema: Schema, cardinality: Cardinality) -> Self {
        Self::new(FieldKind::Relationship { schema, cardinality })
    }

    /// Apply `element` to each member of an iterable source value.
    pub fn list(element: Field) -> Self {
        Self::new(FieldKind::List(Box::new(element)))
    }

    /// Read the value from a differently named source attribute.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attribute = Some(name.into());
        self
    }

    /// Value to emit when the source attribute is absent.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Custom formatting applied instead of the standard scalar coercion.
    pub fn format(mut self, f: FormatFn) -> Self {
        self.format = Some(f);
        self
    }

    /// Exclude this field from default output.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            FieldKind::Scalar(kind) => format!("Scalar({:?})", kind),
            FieldKind::Nested(_) => "Nested".to_string(),
            FieldKind::Relationship { cardinality, .. } => {
                format!("Relationship({:?})", cardinality)
            }
            FieldKind::List(_) => "List".to_string(),
        };
        f.debug_struct("Field")
            .field("kind", &kind)
            .field("attribute", &self.attribute)
            .field("lazy", &self.lazy)
            .finish()
    }
}

/// An insertion-ordered mapping of output field name to [`Field`].
///
/// Field names are unique; declaring a name twice replaces the earlier
/// definition. Output key order mirrors declaration order.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: IndexMap<String, Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Field)> {
        self.fields.iter()
    }
}

/// Coerce a raw value to the scalar kind, or report it as incompatible.
pub(crate) fn coerce(kind: ScalarKind, value: &Value) -> std::result::Result<Value, ()> {
    match kind {
        ScalarKind::Raw => Ok(value.clone()),
        ScalarKind::String => match value {
            Value::Null => Ok(Value::Null),
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            Value::Array(_) | Value::Object(_) => Err(()),
        },
        ScalarKind::Integer => match value {
            Value::Null => Ok(Value::Null),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::from(i))
                } else if let Some(f) = n.as_f64() {
                    // Fractional values truncate toward zero.
                    Ok(Value::from(f.trunc() as i64))
                } else {
                    Err(())
                }
            }
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| ()),
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            Value::Array(_) | Value::Object(_) => Err(()),
        },
        ScalarKind::Float => match value {
            Value::Null => Ok(Value::Null),
            Value::Number(n) => n.as_f64().map(Value::from).ok_or(()),
            Value::String(s) => s.parse::<f64>().map(Value::from).map_err(|_| ()),
            Value::Bool(b) => Ok(Value::from(if *b { 1.0 } else { 0.0 })),
            Value::Array(_) | Value::Object(_) => Err(()),
        },
        ScalarKind::Boolean => match value {
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
            Value::String(s) => Ok(Value::Bool(!s.is_empty())),
            Value::Array(_) | Value::Object(_) => Err(()),
        },
    }
}

/// Render a scalar field's raw value: custom formatter when present,
/// standard coercion otherwise. Failures carry the field name and value.
pub(crate) fn render_scalar(field_name: &str, field: &Field, raw: &Value) -> Result<Value> {
    if let Some(format) = &field.format {
        return format(raw);
    }
    let FieldKind::Scalar(kind) = field.kind else {
        return Err(FloodgateError::internal("render_scalar on non-scalar field"));
    };
    coerce(kind, raw).map_err(|_| FloodgateError::marshalling(field_name, raw.clone()))
}
